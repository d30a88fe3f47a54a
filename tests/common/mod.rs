//! Shared fixtures for the integration tests: test PKI, mock revocation
//! clients and a local RFC 3161 authority.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use der::Encode;
use pades_oxide::document::PdfDocument;
use pades_oxide::revocation::{CrlClient, OcspClient};
use pades_oxide::signatures::algorithms::oids;
use pades_oxide::signatures::timestamp::TstInfo;
use pades_oxide::signatures::{
    default_provider, CertificateInfo, DigestAlgorithm, PrivateKeySigner, SignatureAlgorithm,
    SignatureContainerBuilder, SignerIdentity, SigningCredentials, TsaClient,
};
use pades_oxide::{Error, Result};

pub fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name))
        .unwrap_or_else(|e| panic!("fixture {}: {}", name, e))
}

pub fn cert(name: &str) -> CertificateInfo {
    CertificateInfo::parse(&fixture(name)).expect("fixture certificate")
}

pub fn one_page() -> PdfDocument {
    PdfDocument::from_bytes(fixture("one_page.pdf")).expect("one_page.pdf")
}

pub fn xref_stream() -> PdfDocument {
    PdfDocument::from_bytes(fixture("xref_stream.pdf")).expect("xref_stream.pdf")
}

/// Signing identity and key for `signer-rsa`, `signer-p256`, `signer-ed25519` or `revoked`.
pub fn signer(name: &str) -> (SignerIdentity, PrivateKeySigner) {
    let identity =
        SignerIdentity::new(&fixture(&format!("{}.cer", name)), &[fixture("root.cer")]).expect("signer identity");
    let algorithm = identity.signature_algorithm(None).expect("key algorithm");
    let signer = PrivateKeySigner::new(
        SigningCredentials::new(fixture(&format!("{}.key.der", name)), fixture(&format!("{}.cer", name))),
        algorithm,
    );
    (identity, signer)
}

pub fn rsa() -> (SignerIdentity, PrivateKeySigner) {
    signer("signer-rsa")
}

/// RFC 3161 authority signing tokens with the `tsa` fixture key.
pub struct LocalTsa {
    identity: SignerIdentity,
    signer: PrivateKeySigner,
    digest: DigestAlgorithm,
    serial: AtomicU64,
    pub issued: AtomicUsize,
}

impl LocalTsa {
    pub fn new() -> Self {
        Self::with_digest(DigestAlgorithm::Sha256)
    }

    pub fn with_digest(digest: DigestAlgorithm) -> Self {
        Self {
            identity: SignerIdentity::new(&fixture("tsa.cer"), &[fixture("root.cer")]).expect("tsa identity"),
            signer: PrivateKeySigner::new(
                SigningCredentials::new(fixture("tsa.key.der"), fixture("tsa.cer")),
                SignatureAlgorithm::RsaPkcs1,
            ),
            digest,
            serial: AtomicU64::new(1),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

impl TsaClient for LocalTsa {
    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    fn timestamp(&self, imprint: &[u8]) -> Result<Vec<u8>> {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let info = TstInfo::new(oids::ID_DATA, self.digest, imprint, serial, Utc::now(), None)?;
        let builder = SignatureContainerBuilder::new(default_provider());
        let token = builder.begin_encapsulated(&self.identity, DigestAlgorithm::Sha256, oids::TST_INFO, info.to_der()?)?;
        let token = builder.complete_with_signer(token, &self.signer)?.to_der()?;
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(token)
    }
}

pub fn local_tsa() -> Arc<LocalTsa> {
    Arc::new(LocalTsa::new())
}

/// Responds with the committed OCSP fixture matching the certificate.
pub fn fixture_ocsp() -> Arc<dyn OcspClient> {
    Arc::new(|c: &CertificateInfo, _: &CertificateInfo| -> Result<Option<Vec<u8>>> {
        Ok(match c.subject() {
            s if s.contains("Revoked") => Some(fixture("revoked.ocsp")),
            s if s.contains("Signer RSA") => Some(fixture("signer-rsa.ocsp")),
            s if s.contains("Timestamp") => Some(fixture("tsa.ocsp")),
            _ => None,
        })
    })
}

/// Serves the root CRL for everything.
pub fn fixture_crl() -> Arc<dyn CrlClient> {
    Arc::new(|_: &CertificateInfo| -> Result<Vec<Vec<u8>>> { Ok(vec![fixture("root.crl")]) })
}

/// Every fetch fails as if the responder were down.
pub fn unreachable_ocsp() -> Arc<dyn OcspClient> {
    Arc::new(|c: &CertificateInfo, _: &CertificateInfo| -> Result<Option<Vec<u8>>> {
        Err(Error::Network {
            url: c.ocsp_urls().first().cloned().unwrap_or_default(),
            reason: "connection refused".to_string(),
        })
    })
}

/// Count occurrences of `needle` in `haystack`.
pub fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}
