//! Prepare in one place, sign elsewhere, complete later.

mod common;

use std::sync::Arc;

use common::*;
use pades_oxide::config::SigningConfig;
use pades_oxide::document::PdfDocument;
use pades_oxide::signatures::{
    default_provider, CmsContainer, CompletionInput, DigestAlgorithm, ExternalSigner, PrepareExtras,
    PrivateKeySigner, PssParameters, SignOptions, SignatureAlgorithm, SignatureContainerBuilder, SignatureStandard,
    SignatureVerifier, SigningCredentials, TwoPhaseCoordinator, VerificationStatus,
};
use pades_oxide::Error;

fn coordinator() -> TwoPhaseCoordinator {
    TwoPhaseCoordinator::new(default_provider(), SigningConfig::default())
}

fn verify_single(bytes: Vec<u8>) -> pades_oxide::signatures::VerificationResult {
    let doc = PdfDocument::from_bytes(bytes).unwrap();
    let mut results = SignatureVerifier::new(default_provider()).verify_all(&doc).unwrap();
    assert_eq!(results.len(), 1);
    results.remove(0)
}

#[test]
fn test_complete_across_process_boundary() {
    let (identity, signer) = rsa();
    let prepared = coordinator().prepare(&one_page(), &identity, &SignOptions::default()).unwrap();

    // Everything the second phase needs travels as bytes.
    let dir = tempfile::tempdir().unwrap();
    let doc_path = dir.path().join("prepared.pdf");
    std::fs::write(&doc_path, prepared.bytes()).unwrap();
    let skeleton_der = prepared.container().to_der().unwrap();
    let to_sign = prepared.data_to_be_signed().unwrap();
    let field = prepared.field_name().to_string();
    let digest = prepared.digest_algorithm();
    drop(prepared);

    let value = signer.sign(&to_sign, DigestAlgorithm::Sha256, None).unwrap();

    let skeleton = CmsContainer::from_der(&skeleton_der).unwrap();
    assert!(!skeleton.is_complete());
    let signed = coordinator()
        .complete(
            std::fs::read(&doc_path).unwrap(),
            &field,
            digest,
            CompletionInput::RawSignature {
                skeleton,
                value,
                pss: None,
            },
        )
        .unwrap();
    let result = verify_single(signed);
    assert_eq!(result.status, VerificationStatus::Valid, "{:?}", result.messages);
}

#[test]
fn test_hash_to_sign_is_digest_of_signed_attributes() {
    let (identity, _) = signer("signer-p256");
    let options = SignOptions::default().with_digest(DigestAlgorithm::Sha384);
    let prepared = coordinator().prepare(&one_page(), &identity, &options).unwrap();
    assert_eq!(prepared.digest_algorithm(), DigestAlgorithm::Sha384);
    assert_eq!(prepared.document_digest().len(), 48);
    let expected = default_provider()
        .digest(DigestAlgorithm::Sha384, &prepared.data_to_be_signed().unwrap())
        .unwrap();
    assert_eq!(prepared.hash_to_sign(default_provider().as_ref()).unwrap(), expected);
}

#[test]
fn test_complete_with_external_container() {
    let (identity, _) = rsa();
    let prepared = coordinator().prepare(&one_page(), &identity, &SignOptions::default()).unwrap();

    // A remote service returns a finished CMS over the document digest.
    let (remote_identity, remote_signer) = signer("signer-p256");
    let builder = SignatureContainerBuilder::new(default_provider());
    let container = builder
        .begin_with_digest(
            &remote_identity,
            DigestAlgorithm::Sha256,
            SignatureStandard::Cades,
            prepared.document_digest(),
        )
        .unwrap();
    let container = builder.complete_with_signer(container, &remote_signer).unwrap();

    let signed = coordinator()
        .complete(
            prepared.bytes().to_vec(),
            prepared.field_name(),
            prepared.digest_algorithm(),
            CompletionInput::Container(container),
        )
        .unwrap();
    let result = verify_single(signed);
    assert!(result.status.is_valid());
    assert!(result.signer_subject.unwrap().contains("P-256"));
}

#[test]
fn test_incomplete_container_is_rejected() {
    let (identity, _) = rsa();
    let prepared = coordinator().prepare(&one_page(), &identity, &SignOptions::default()).unwrap();
    let skeleton = prepared.container().clone();
    let err = coordinator()
        .complete(
            prepared.bytes().to_vec(),
            prepared.field_name(),
            prepared.digest_algorithm(),
            CompletionInput::Container(skeleton),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Crypto(_)));
}

#[test]
fn test_unknown_field() {
    let (identity, signer) = rsa();
    let prepared = coordinator().prepare(&one_page(), &identity, &SignOptions::default()).unwrap();
    let value = signer
        .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, None)
        .unwrap();
    let err = coordinator()
        .complete(
            prepared.bytes().to_vec(),
            "NoSuchField",
            prepared.digest_algorithm(),
            CompletionInput::RawSignature {
                skeleton: prepared.container().clone(),
                value,
                pss: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::FieldNotFound(ref name) if name == "NoSuchField"));
}

#[test]
fn test_bytes_appended_after_prepare() {
    let (identity, signer) = rsa();
    let prepared = coordinator().prepare(&one_page(), &identity, &SignOptions::default()).unwrap();
    let value = signer
        .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, None)
        .unwrap();
    let mut bytes = prepared.bytes().to_vec();
    bytes.extend_from_slice(b"\n% trailing edit\n");
    let err = coordinator()
        .complete(
            bytes,
            prepared.field_name(),
            prepared.digest_algorithm(),
            CompletionInput::RawSignature {
                skeleton: prepared.container().clone(),
                value,
                pss: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::FieldNotCoveringDocument { .. }));
}

#[test]
fn test_placeholder_of_exact_container_size() {
    let (identity, signer) = rsa();
    let time = chrono::DateTime::from_timestamp(1_714_564_800, 0).unwrap();
    let options = SignOptions::default().with_signing_time(time);
    let c = coordinator();

    // RSA PKCS#1 v1.5 with a fixed signing time gives the same container length every run.
    let (signed, _) = c
        .sign(&one_page(), &identity, &signer, &options, &PrepareExtras::default())
        .unwrap();
    let sig = &PdfDocument::from_bytes(signed).unwrap().signatures().unwrap()[0];
    let actual = CmsContainer::from_der(&sig.contents).unwrap().to_der().unwrap().len();

    let exact = options.clone().with_placeholder_size(actual);
    let (signed, _) = c
        .sign(&one_page(), &identity, &signer, &exact, &PrepareExtras::default())
        .unwrap();
    let result = verify_single(signed);
    assert!(result.status.is_valid(), "{:?}", result.messages);

    let short = options.with_placeholder_size(actual - 1);
    match c.sign(&one_page(), &identity, &signer, &short, &PrepareExtras::default()) {
        Err(Error::ContainerTooLarge { reserved, actual: written }) => {
            assert_eq!(reserved, actual - 1);
            assert_eq!(written, actual);
        },
        Err(Error::PlaceholderTooSmall { requested, estimated }) => {
            assert_eq!(requested, actual - 1);
            assert!(estimated > requested);
        },
        other => panic!("unexpected {:?}", other.map(|(_, field)| field)),
    }
}

#[test]
fn test_pss_raw_signature() {
    let (identity, _) = rsa();
    let pss = PssParameters::for_digest(DigestAlgorithm::Sha256);
    let options = SignOptions::default()
        .with_signature_algorithm(SignatureAlgorithm::RsaPss)
        .with_pss_parameters(pss);
    let prepared = coordinator().prepare(&one_page(), &identity, &options).unwrap();
    let signer = PrivateKeySigner::new(
        SigningCredentials::new(fixture("signer-rsa.key.der"), fixture("signer-rsa.cer")),
        SignatureAlgorithm::RsaPss,
    );
    let value = signer
        .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, Some(&pss))
        .unwrap();
    let signed = coordinator().complete_prepared(prepared, value, Some(pss)).unwrap();
    assert!(verify_single(signed).status.is_valid());
}

#[test]
fn test_timestamp_added_in_second_phase() {
    let tsa = local_tsa();
    let c = coordinator().with_tsa(tsa.clone());
    let (identity, signer) = rsa();
    let prepared = c.prepare(&one_page(), &identity, &SignOptions::default()).unwrap();
    assert_eq!(tsa.issued(), 0);
    let value = signer
        .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, None)
        .unwrap();
    let signed = c.complete_prepared(prepared, value, None).unwrap();
    assert_eq!(tsa.issued(), 1);
    let result = verify_single(signed);
    assert!(result.status.is_valid(), "{:?}", result.messages);
    assert!(result.has_timestamp);
}

#[test]
fn test_prepare_buffers_in_temp_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = SigningConfig::default().with_temp_dir(dir.path()).unwrap();
    let c = TwoPhaseCoordinator::new(default_provider(), config);
    let (identity, signer) = rsa();
    let prepared = c.prepare(&one_page(), &identity, &SignOptions::default()).unwrap();
    let value = signer
        .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, None)
        .unwrap();
    let signed = c.complete_prepared(prepared, value, None).unwrap();
    assert!(verify_single(signed).status.is_valid());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "buffers are removed");
}

#[test]
fn test_missing_temp_dir_is_rejected_eagerly() {
    let err = SigningConfig::default()
        .with_temp_dir("/nonexistent/pades-oxide-buffers")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_coordinator_shared_across_threads() {
    let c = Arc::new(coordinator());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let c = Arc::clone(&c);
            std::thread::spawn(move || {
                let (identity, signer) = rsa();
                let prepared = c.prepare(&one_page(), &identity, &SignOptions::default()).unwrap();
                let value = signer
                    .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, None)
                    .unwrap();
                c.complete_prepared(prepared, value, None).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert!(verify_single(handle.join().unwrap()).status.is_valid());
    }
}
