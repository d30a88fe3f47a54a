//! End-to-end signing at level B with every supported key type.

mod common;

use chrono::{TimeZone, Utc};
use common::*;
use pades_oxide::config::SigningConfig;
use pades_oxide::document::{text_string, PdfDocument};
use pades_oxide::signatures::algorithms::oids;
use pades_oxide::signatures::{
    default_provider, CertificationLevel, CmsContainer, DigestAlgorithm, PrivateKeySigner, ProfileOrchestrator,
    PssParameters, SignOptions, SignatureAlgorithm, SignatureProfile, SignatureStandard, SignatureVerifier,
    SigningCredentials, VerificationStatus, WriteMode,
};
use pades_oxide::Error;

fn orchestrator() -> ProfileOrchestrator {
    ProfileOrchestrator::new(default_provider(), SigningConfig::default())
}

fn sign_b(doc: &PdfDocument, name: &str, options: &SignOptions) -> pades_oxide::Result<Vec<u8>> {
    let (identity, signer) = signer(name);
    orchestrator()
        .sign_with_profile(doc, &identity, &signer, options, SignatureProfile::B)
        .map(|signed| signed.bytes)
}

fn assert_all_valid(bytes: Vec<u8>) -> PdfDocument {
    let doc = PdfDocument::from_bytes(bytes).expect("signed output parses");
    let results = SignatureVerifier::new(default_provider()).verify_all(&doc).unwrap();
    assert!(!results.is_empty());
    for result in results {
        assert_eq!(result.status, VerificationStatus::Valid, "{}: {:?}", result.field_name, result.messages);
    }
    doc
}

#[test]
fn test_rsa_sha256_byte_range_spans_file() {
    let original = one_page();
    let bytes = sign_b(&original, "signer-rsa", &SignOptions::default()).unwrap();
    assert!(bytes.starts_with(original.data()), "earlier revision must be untouched");

    let doc = assert_all_valid(bytes);
    let sig = &doc.signatures().unwrap()[0];
    let range = sig.byte_range;
    assert_eq!(range.offset1, 0);
    assert_eq!(range.offset2 + range.length2, doc.len());
    let contents_hex_len = range.offset2 - range.length1;
    assert_eq!(range.length1 + range.length2, doc.len() - contents_hex_len);
    assert_eq!(doc.data()[range.length1], b'<');
    assert_eq!(doc.data()[range.offset2 - 1], b'>');
}

#[test]
fn test_p256_signature() {
    let bytes = sign_b(&one_page(), "signer-p256", &SignOptions::default().with_digest(DigestAlgorithm::Sha384)).unwrap();
    let doc = assert_all_valid(bytes);
    let container = CmsContainer::from_der(&doc.signatures().unwrap()[0].contents).unwrap();
    assert_eq!(container.signature_algorithm(), SignatureAlgorithm::Ecdsa);
    assert_eq!(container.digest_algorithm(), DigestAlgorithm::Sha384);
}

#[test]
fn test_ed25519_requires_sha512() {
    let err = sign_b(&one_page(), "signer-ed25519", &SignOptions::default().with_digest(DigestAlgorithm::Sha1))
        .unwrap_err();
    match err {
        Error::DigestForbidden { required, .. } => assert_eq!(required, "SHA-512"),
        other => panic!("expected DigestForbidden, got {:?}", other),
    }

    let bytes = sign_b(&one_page(), "signer-ed25519", &SignOptions::default().with_digest(DigestAlgorithm::Sha512))
        .unwrap();
    let doc = assert_all_valid(bytes);
    let extensions = doc.extensions().unwrap().expect("EdDSA declares an ISO extension");
    assert!(extensions.contains_key("ISO_"));
}

#[test]
fn test_sha3_declares_extension() {
    let bytes = sign_b(&one_page(), "signer-rsa", &SignOptions::default().with_digest(DigestAlgorithm::Sha3_256)).unwrap();
    let doc = assert_all_valid(bytes);
    assert!(doc.extensions().unwrap().unwrap().contains_key("ISO_"));
}

#[test]
fn test_rsa_pss() {
    let options = SignOptions::default()
        .with_signature_algorithm(SignatureAlgorithm::RsaPss)
        .with_pss_parameters(PssParameters::for_digest(DigestAlgorithm::Sha256));
    let (identity, _) = rsa();
    let signer = PrivateKeySigner::new(
        SigningCredentials::new(fixture("signer-rsa.key.der"), fixture("signer-rsa.cer")),
        SignatureAlgorithm::RsaPss,
    );
    let signed = orchestrator()
        .sign_with_profile(&one_page(), &identity, &signer, &options, SignatureProfile::B)
        .unwrap();
    let doc = assert_all_valid(signed.bytes);
    let container = CmsContainer::from_der(&doc.signatures().unwrap()[0].contents).unwrap();
    assert_eq!(container.pss_parameters(), Some(&PssParameters::for_digest(DigestAlgorithm::Sha256)));
}

#[test]
fn test_xref_stream_document() {
    let original = xref_stream();
    let bytes = sign_b(&original, "signer-rsa", &SignOptions::default()).unwrap();
    let appended = &bytes[original.len()..];
    assert_eq!(count(appended, b"/Type /XRef"), 1);
    assert_all_valid(bytes);
}

#[test]
fn test_metadata_in_signature_dictionary() {
    let options = SignOptions::default()
        .with_field_name("Approval")
        .with_reason("Approved")
        .with_location("Zürich")
        .with_contact_info("legal@example.com")
        .with_name("Test Signer");
    let doc = assert_all_valid(sign_b(&one_page(), "signer-rsa", &options).unwrap());
    let sig = &doc.signatures().unwrap()[0];
    assert_eq!(sig.field_name, "Approval");
    let text = |key: &str| text_string(sig.dict.get(key).and_then(|o| o.as_string()).unwrap());
    assert_eq!(text("Reason"), "Approved");
    assert_eq!(text("Location"), "Zürich");
    assert_eq!(text("ContactInfo"), "legal@example.com");
    assert!(sig.dict.contains_key("M"));
    assert!(sig.dict.contains_key("Prop_Build"));
}

#[test]
fn test_second_signature_keeps_first_valid() {
    let first = sign_b(&one_page(), "signer-rsa", &SignOptions::default()).unwrap();
    let second = sign_b(&PdfDocument::from_bytes(first).unwrap(), "signer-p256", &SignOptions::default()).unwrap();
    let doc = assert_all_valid(second);
    let signatures = doc.signatures().unwrap();
    assert_eq!(signatures.len(), 2);
    assert_eq!(signatures[0].field_name, "Signature1");
    assert_eq!(signatures[1].field_name, "Signature2");
    assert!(!signatures[0].byte_range.covers_whole(doc.len()));
    assert!(signatures[1].byte_range.covers_whole(doc.len()));
}

#[test]
fn test_cms_standard_carries_signing_time() {
    let options = SignOptions::default().with_standard(SignatureStandard::Cms);
    let doc = assert_all_valid(sign_b(&one_page(), "signer-rsa", &options).unwrap());
    let sig = &doc.signatures().unwrap()[0];
    assert_eq!(sig.dict.get("SubFilter").and_then(|o| o.as_name()), Some("adbe.pkcs7.detached"));
    let container = CmsContainer::from_der(&sig.contents).unwrap();
    assert!(container.signed_attributes().iter().any(|a| a.oid == oids::SIGNING_TIME));
    assert!(!container.signed_attributes().iter().any(|a| a.oid == oids::SIGNING_CERTIFICATE_V2));
}

#[test]
fn test_certification_then_approval() {
    let certified = sign_b(
        &one_page(),
        "signer-rsa",
        &SignOptions::default().with_certification(CertificationLevel::FormFilling),
    )
    .unwrap();
    let certified = PdfDocument::from_bytes(certified).unwrap();
    assert_eq!(certified.docmdp_permission().unwrap(), Some(2));

    let again = sign_b(
        &certified,
        "signer-p256",
        &SignOptions::default().with_certification(CertificationLevel::FormFilling),
    );
    assert!(matches!(again, Err(Error::CertifyingSignedDocument)));

    let approval = sign_b(&certified, "signer-p256", &SignOptions::default()).unwrap();
    assert_all_valid(approval);
}

#[test]
fn test_no_changes_certification_is_final() {
    let locked = sign_b(
        &one_page(),
        "signer-rsa",
        &SignOptions::default().with_certification(CertificationLevel::NoChangesAllowed),
    )
    .unwrap();
    let locked = PdfDocument::from_bytes(locked).unwrap();
    let err = sign_b(&locked, "signer-p256", &SignOptions::default()).unwrap_err();
    assert!(matches!(err, Error::CertificationForbidsChanges));
    assert!(err.is_document_state());
}

#[test]
fn test_full_rewrite_of_unsigned_document() {
    let options = SignOptions::default().with_write_mode(WriteMode::FullRewrite);
    let bytes = sign_b(&one_page(), "signer-rsa", &options).unwrap();
    let doc = assert_all_valid(bytes);
    assert!(doc.signatures().unwrap()[0].byte_range.covers_whole(doc.len()));

    let signed = PdfDocument::from_bytes(sign_b(&one_page(), "signer-rsa", &SignOptions::default()).unwrap()).unwrap();
    let err = sign_b(&signed, "signer-p256", &options).unwrap_err();
    assert!(matches!(err, Error::FullRewriteNotAllowed));
}

#[test]
fn test_signing_is_deterministic_for_fixed_time() {
    let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let options = SignOptions::default().with_signing_time(time);
    let a = sign_b(&one_page(), "signer-rsa", &options).unwrap();
    let b = sign_b(&one_page(), "signer-rsa", &options).unwrap();
    assert_eq!(a, b);
}
