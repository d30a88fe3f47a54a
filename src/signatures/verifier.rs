//! PDF signature verification.
//!
//! Checks integrity and cryptographic validity of embedded signatures and
//! document timestamps. Trust evaluation (path validation against anchors,
//! revocation status) is out of reach here; the embedded evidence is left
//! to a validator.

use std::io::Cursor;
use std::sync::Arc;

use der::Encode;

use super::container::CmsContainer;
use super::identity::CertificateInfo;
use super::provider::CryptoProvider;
use super::timestamp::TimestampToken;
use super::types::{DigestAlgorithm, SignatureKind, VerificationResult, VerificationStatus};
use crate::document::{EmbeddedSignature, PdfDocument};
use crate::error::{Error, Result};

/// Verifier for PDF digital signatures.
pub struct SignatureVerifier {
    provider: Arc<dyn CryptoProvider>,
}

impl SignatureVerifier {
    /// Verifier checking signatures with `provider`.
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    /// Verify every signature and document timestamp, oldest first.
    pub fn verify_all(&self, doc: &PdfDocument) -> Result<Vec<VerificationResult>> {
        doc.signatures()?
            .iter()
            .map(|signature| self.verify(doc, signature))
            .collect()
    }

    /// Verify one signature.
    pub fn verify(&self, doc: &PdfDocument, signature: &EmbeddedSignature) -> Result<VerificationResult> {
        let mut result = VerificationResult {
            field_name: signature.field_name.clone(),
            kind: signature.kind,
            status: VerificationStatus::Valid,
            signer_subject: None,
            covers_whole_document: signature.byte_range.covers_whole(doc.len()),
            has_timestamp: false,
            messages: Vec::new(),
        };

        if let Err(e) = signature.byte_range.validate(doc.len()) {
            return Ok(invalid(result, format!("ByteRange validation failed: {}", e)));
        }

        let container = match signature.kind {
            SignatureKind::Signature => match CmsContainer::from_der(&signature.contents) {
                Ok(container) => container,
                Err(e) => return Ok(invalid(result, format!("unreadable signature container: {}", e))),
            },
            SignatureKind::DocumentTimestamp => {
                let token = match TimestampToken::parse(&signature.contents) {
                    Ok(token) => token,
                    Err(e) => return Ok(invalid(result, format!("unreadable timestamp token: {}", e))),
                };
                let (algorithm, imprint) = token.imprint()?;
                let digest = self.range_digest(doc, signature, algorithm)?;
                if digest != imprint {
                    return Ok(invalid(result, "document timestamp imprint does not match the document".to_string()));
                }
                result.has_timestamp = true;
                token.container().clone()
            },
        };

        if let Some(cert) = container.signer_certificate() {
            if let Ok(info) = cert.to_der().map_err(Error::from).and_then(|der| CertificateInfo::parse(&der)) {
                result.signer_subject = Some(info.subject().to_string());
            }
        }

        if signature.kind == SignatureKind::Signature {
            let digest = self.range_digest(doc, signature, container.digest_algorithm())?;
            match container.message_digest() {
                Ok(claimed) if claimed == digest => {},
                Ok(_) => return Ok(invalid(result, "document modified after signing".to_string())),
                Err(e) => return Ok(invalid(result, format!("no message digest: {}", e))),
            }
            if let Some(value) = container.signature() {
                for token in container.timestamp_tokens()? {
                    result.has_timestamp = true;
                    let checked = TimestampToken::parse(&token).and_then(|t| {
                        let (algorithm, _) = t.imprint()?;
                        t.check_imprint(algorithm, &self.provider.digest(algorithm, value)?)
                    });
                    if let Err(e) = checked {
                        return Ok(invalid(result, format!("signature timestamp does not match: {}", e)));
                    }
                }
            }
        }

        match container.verify_signature(self.provider.as_ref()) {
            Ok(true) => {},
            Ok(false) => return Ok(invalid(result, "signature value does not verify".to_string())),
            Err(e) => {
                result.status = VerificationStatus::Unknown;
                result.messages.push(format!("cannot check signature value: {}", e));
            },
        }
        if !result.covers_whole_document {
            result
                .messages
                .push("signature does not cover later revisions".to_string());
        }
        log::debug!("verified '{}': {:?}", result.field_name, result.status);
        Ok(result)
    }

    fn range_digest(&self, doc: &PdfDocument, signature: &EmbeddedSignature, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
        let mut reader = signature.byte_range.reader(Cursor::new(doc.data()));
        self.provider.digest_reader(algorithm, &mut reader)
    }
}

fn invalid(mut result: VerificationResult, message: String) -> VerificationResult {
    log::warn!("signature '{}' is invalid: {}", result.field_name, message);
    result.status = VerificationStatus::Invalid;
    result.messages.push(message);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SigningConfig;
    use crate::signatures::identity::SignerIdentity;
    use crate::signatures::provider::{default_provider, PrivateKeySigner, SigningCredentials};
    use crate::signatures::two_phase::{PrepareExtras, TwoPhaseCoordinator};
    use crate::signatures::types::{SignOptions, SignatureAlgorithm};

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    fn signed() -> Vec<u8> {
        let identity = SignerIdentity::new(&fixture("signer-p256.cer"), &[fixture("root.cer")]).unwrap();
        let signer = PrivateKeySigner::new(
            SigningCredentials::new(fixture("signer-p256.key.der"), fixture("signer-p256.cer")),
            SignatureAlgorithm::Ecdsa,
        );
        let doc = PdfDocument::from_bytes(fixture("one_page.pdf")).unwrap();
        TwoPhaseCoordinator::new(default_provider(), SigningConfig::default())
            .sign(&doc, &identity, &signer, &SignOptions::default(), &PrepareExtras::default())
            .unwrap()
            .0
    }

    #[test]
    fn test_valid_signature() {
        let doc = PdfDocument::from_bytes(signed()).unwrap();
        let results = SignatureVerifier::new(default_provider()).verify_all(&doc).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].status.is_valid(), "{:?}", results[0].messages);
        assert!(results[0].covers_whole_document);
        assert!(!results[0].has_timestamp);
        assert!(results[0].signer_subject.as_deref().unwrap().contains("P-256"));
    }

    #[test]
    fn test_tampered_document() {
        let mut bytes = signed();
        let pos = bytes.windows(5).position(|w| w == b"24 Tf").unwrap();
        bytes[pos + 1] = b'5';
        let doc = PdfDocument::from_bytes(bytes).unwrap();
        let results = SignatureVerifier::new(default_provider()).verify_all(&doc).unwrap();
        assert_eq!(results[0].status, VerificationStatus::Invalid);
        assert!(results[0].messages[0].contains("modified"));
    }

    #[test]
    fn test_appended_bytes_are_reported() {
        let mut bytes = signed();
        bytes.extend_from_slice(b"\n% appended\n");
        let doc = PdfDocument::from_bytes(bytes).unwrap();
        let results = SignatureVerifier::new(default_provider()).verify_all(&doc).unwrap();
        assert!(results[0].status.is_valid());
        assert!(!results[0].covers_whole_document);
    }
}
