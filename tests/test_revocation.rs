//! Revocation collection over real certificate chains.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use pades_oxide::config::SigningConfig;
use pades_oxide::revocation::{
    CertificateState, ChainRole, Exemption, IssuerResolver, RevocationCollector, RevocationEvidenceStore, TrustStore,
};
use pades_oxide::signatures::report::ClientKind;
use pades_oxide::signatures::{
    default_provider, Advisory, ProfileOrchestrator, SignOptions, SignatureProfile, SignerIdentity, SigningReport,
};
use pades_oxide::{Error, Result};

fn lonely_signer() -> SignerIdentity {
    SignerIdentity::new(&fixture("signer-rsa.cer"), &[]).unwrap()
}

#[test]
fn test_unreachable_ocsp_falls_back_to_crl() {
    let (identity, signer) = rsa();
    let signed = ProfileOrchestrator::new(default_provider(), SigningConfig::default())
        .with_tsa(local_tsa())
        .with_ocsp_client(unreachable_ocsp())
        .with_crl_client(fixture_crl())
        .sign_with_profile(&one_page(), &identity, &signer, &SignOptions::default(), SignatureProfile::LT)
        .unwrap();
    let failures: Vec<_> = signed
        .report
        .advisories()
        .iter()
        .filter(|a| matches!(a, Advisory::ClientFailed { client: ClientKind::Ocsp, .. }))
        .collect();
    assert!(!failures.is_empty());
    assert!(failures[0].to_string().contains("connection refused"));
}

#[test]
fn test_issuer_retrieved_through_aia() {
    let fetched = Arc::new(AtomicUsize::new(0));
    let counter = fetched.clone();
    let resolver = IssuerResolver::new().with_retriever(Arc::new(move |uri: &str| -> Result<Vec<u8>> {
        assert_eq!(uri, "http://aia.pades-oxide.test/root.cer");
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(fixture("root.cer"))
    }));
    let mut collector = RevocationCollector::new(default_provider())
        .with_resolver(resolver)
        .with_ocsp_client(fixture_ocsp());
    let mut store = RevocationEvidenceStore::new();
    let mut report = SigningReport::new();
    let outcome = collector
        .collect_for_signer(&lonely_signer(), &mut store, &mut report)
        .unwrap();

    assert_eq!(fetched.load(Ordering::SeqCst), 1, "retrieved issuers are remembered");
    let root = cert("root.cer");
    assert_eq!(outcome.state_of(&root), CertificateState::Exempt(Exemption::TrustAnchor));
    assert_eq!(outcome.state_of(&cert("signer-rsa.cer")), CertificateState::RevocationFetched);
    assert!(store.certificate_index(&fixture("root.cer")).is_some());
    assert!(report.is_empty());
}

#[test]
fn test_trust_store_supplies_missing_root() {
    let trust = Arc::new(TrustStore::new().with_der(&fixture("root.cer")).unwrap());
    let mut collector = RevocationCollector::new(default_provider())
        .with_resolver(IssuerResolver::new().with_trust_store(trust))
        .with_crl_client(fixture_crl());
    let mut store = RevocationEvidenceStore::new();
    let mut report = SigningReport::new();
    collector
        .collect_for_signer(&lonely_signer(), &mut store, &mut report)
        .unwrap();
    assert_eq!(store.counts(), (2, 1, 0));
    assert_eq!(store.crls_for(&fixture("signer-rsa.cer")), vec![fixture("root.crl").as_slice()]);
}

#[test]
fn test_unresolvable_signing_issuer() {
    let (_, signer) = rsa();
    let err = ProfileOrchestrator::new(default_provider(), SigningConfig::default())
        .with_tsa(local_tsa())
        .with_ocsp_client(fixture_ocsp())
        .sign_with_profile(&one_page(), &lonely_signer(), &signer, &SignOptions::default(), SignatureProfile::LT)
        .unwrap_err();
    assert!(matches!(err, Error::UnresolvedIssuer { ref subject } if subject.contains("Signer RSA")));
}

#[test]
fn test_timestamp_chain_collected_as_secondary() {
    let tsa = cert("tsa.cer");
    let mut collector = RevocationCollector::new(default_provider()).with_crl_client(fixture_crl());
    let mut store = RevocationEvidenceStore::new();
    let mut report = SigningReport::new();
    let outcome = collector
        .collect(&tsa, &[cert("root.cer")], ChainRole::Secondary, &mut store, &mut report)
        .unwrap();
    assert_eq!(outcome.state_of(&tsa), CertificateState::RevocationFetched);
    assert_eq!(outcome.states().len(), 2);
}

#[test]
fn test_repeated_collection_does_not_duplicate() {
    let mut collector = RevocationCollector::new(default_provider())
        .with_ocsp_client(fixture_ocsp())
        .with_crl_client(fixture_crl());
    let mut store = RevocationEvidenceStore::new();
    let mut report = SigningReport::new();
    let (identity, _) = rsa();
    collector.collect_for_signer(&identity, &mut store, &mut report).unwrap();
    let first = store.counts();
    collector.collect_for_signer(&identity, &mut store, &mut report).unwrap();
    assert_eq!(store.counts(), first);
    assert_eq!(first, (2, 0, 1));
}
