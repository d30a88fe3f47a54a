//! Two-phase signing.
//!
//! Phase 1 ([`TwoPhaseCoordinator::prepare`]) writes the signature revision
//! with an empty placeholder and returns the bytes to sign. Phase 2
//! ([`TwoPhaseCoordinator::complete`]) takes the prepared bytes back together
//! with a raw signature value or a finished container and writes the
//! container into the placeholder. Nothing is kept between the phases other
//! than what [`PreparedSignature`] carries, so they may run in different
//! processes.
//!
//! ```ignore
//! let coordinator = TwoPhaseCoordinator::new(default_provider(), SigningConfig::default());
//! let prepared = coordinator.prepare(&doc, &identity, &SignOptions::default())?;
//! let value = remote_hsm.sign(&prepared.data_to_be_signed()?)?;
//! let signed = coordinator.complete_prepared(prepared, value, None)?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::algorithms::{check_pairing, check_pss, extensions_for};
use super::container::{CmsContainer, SignatureContainerBuilder};
use super::document_writer::{ByteRangeDocumentWriter, PlaceholderRequest, PreparedRevision};
use super::identity::SignerIdentity;
use super::provider::{CryptoProvider, ExternalSigner};
use super::timestamp::{TimestampToken, TsaClient};
use super::types::{DigestAlgorithm, PssParameters, SignOptions, SignatureAlgorithm, SignatureStandard};
use crate::config::SigningConfig;
use crate::document::PdfDocument;
use crate::error::{Error, Result};

/// Output of phase 1.
#[derive(Debug, Clone)]
pub struct PreparedSignature {
    bytes: Vec<u8>,
    field_name: String,
    digest_algorithm: DigestAlgorithm,
    document_digest: Vec<u8>,
    container: CmsContainer,
    reserved: usize,
}

impl PreparedSignature {
    /// Document with the empty placeholder.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Field to complete.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Digest algorithm fixed in phase 1.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Digest of the signed byte ranges.
    pub fn document_digest(&self) -> &[u8] {
        &self.document_digest
    }

    /// Bytes reserved for the container.
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Container skeleton without signature value.
    pub fn container(&self) -> &CmsContainer {
        &self.container
    }

    /// DER signed attributes: the message the signature value is computed over.
    pub fn data_to_be_signed(&self) -> Result<Vec<u8>> {
        self.container.data_to_be_signed()
    }

    /// Digest of [`Self::data_to_be_signed`], for signers taking a prehash.
    /// EdDSA signers need the full message instead.
    pub fn hash_to_sign(&self, provider: &dyn CryptoProvider) -> Result<Vec<u8>> {
        provider.digest(self.digest_algorithm, &self.data_to_be_signed()?)
    }

    /// Split into document bytes, field name and container skeleton.
    pub fn into_parts(self) -> (Vec<u8>, String, CmsContainer) {
        (self.bytes, self.field_name, self.container)
    }
}

/// What phase 2 embeds.
#[derive(Debug, Clone)]
pub enum CompletionInput {
    /// A raw signature value for the phase-1 skeleton
    RawSignature {
        /// Skeleton returned by phase 1
        skeleton: CmsContainer,
        /// Signature over the skeleton's signed attributes
        value: Vec<u8>,
        /// RSASSA-PSS parameters, when not fixed in phase 1
        pss: Option<PssParameters>,
    },
    /// A complete container built elsewhere
    Container(CmsContainer),
}

/// Phase-1 inputs beyond [`SignOptions`].
#[derive(Debug, Clone, Default)]
pub struct PrepareExtras {
    /// CRLs and OCSP responses for `adbe-revocationInfoArchival` (CMS standard)
    pub revocation_archival: Option<(Vec<Vec<u8>>, Vec<Vec<u8>>)>,
}

/// Splits signing into prepare and complete.
pub struct TwoPhaseCoordinator {
    provider: Arc<dyn CryptoProvider>,
    config: SigningConfig,
    tsa: Option<Arc<dyn TsaClient>>,
}

impl std::fmt::Debug for TwoPhaseCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoPhaseCoordinator")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("tsa", &self.tsa.is_some())
            .finish()
    }
}

impl TwoPhaseCoordinator {
    /// Coordinator hashing and verifying through `provider`.
    pub fn new(provider: Arc<dyn CryptoProvider>, config: SigningConfig) -> Self {
        Self {
            provider,
            config,
            tsa: None,
        }
    }

    /// Timestamp the signature value in phase 2 (level T). The placeholder
    /// is sized for the token in phase 1.
    pub fn with_tsa(mut self, tsa: Arc<dyn TsaClient>) -> Self {
        self.tsa = Some(tsa);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    fn builder(&self, options: &SignOptions, signing_time: DateTime<Utc>, extras: &PrepareExtras) -> SignatureContainerBuilder {
        let mut builder = SignatureContainerBuilder::new(self.provider.clone()).with_signing_time(signing_time);
        if let Some(alg) = options.signature_algorithm {
            builder = builder.with_signature_algorithm(alg);
        }
        if let Some(pss) = &options.pss_parameters {
            builder = builder.with_pss_parameters(pss.clone());
        }
        if let Some((crls, ocsps)) = &extras.revocation_archival {
            if options.standard == SignatureStandard::Cms {
                builder = builder.with_revocation_archival(crls.clone(), ocsps.clone());
            }
        }
        builder
    }

    /// Check the algorithm pairing of `options` for `identity`. No I/O.
    pub fn check_algorithms(&self, identity: &SignerIdentity, options: &SignOptions) -> Result<SignatureAlgorithm> {
        let algorithm = identity.signature_algorithm(options.signature_algorithm)?;
        check_pairing(algorithm, options.digest_algorithm)?;
        if let (SignatureAlgorithm::RsaPss, Some(pss)) = (algorithm, &options.pss_parameters) {
            check_pss(options.digest_algorithm, pss)?;
        }
        Ok(algorithm)
    }

    fn reservation(&self, identity: &SignerIdentity, options: &SignOptions, builder: &SignatureContainerBuilder) -> Result<usize> {
        let extra = self.tsa.as_ref().map(|t| t.token_size_estimate()).unwrap_or(0);
        let estimate = builder.estimate_size(identity, options.digest_algorithm, options.standard, extra)?;
        let requested = match options.placeholder_size {
            Some(size) => size,
            None if self.config.estimate_placeholder => estimate.estimate,
            None => self.config.default_placeholder_size,
        };
        if requested < estimate.lower_bound {
            return Err(Error::PlaceholderTooSmall {
                requested,
                estimated: estimate.lower_bound,
            });
        }
        log::debug!(
            "placeholder: {} bytes (lower bound {}, estimate {})",
            requested,
            estimate.lower_bound,
            estimate.estimate
        );
        Ok(requested)
    }

    /// Phase 1.
    pub fn prepare(&self, doc: &PdfDocument, identity: &SignerIdentity, options: &SignOptions) -> Result<PreparedSignature> {
        self.prepare_with(doc, identity, options, &PrepareExtras::default())
    }

    /// Phase 1 with revocation data to archive in the signed attributes.
    pub fn prepare_with(
        &self,
        doc: &PdfDocument,
        identity: &SignerIdentity,
        options: &SignOptions,
        extras: &PrepareExtras,
    ) -> Result<PreparedSignature> {
        let algorithm = self.check_algorithms(identity, options)?;
        let signing_time = options.effective_signing_time();
        let builder = self.builder(options, signing_time, extras);
        let reserved = self.reservation(identity, options, &builder)?;

        let request = PlaceholderRequest::signature(options, signing_time, reserved)
            .with_extensions(extensions_for(Some(algorithm), options.digest_algorithm));
        let mut revision = ByteRangeDocumentWriter::new(self.config.clone()).prepare(doc, &request)?;
        let document_digest = revision.digest(self.provider.as_ref(), options.digest_algorithm)?;
        let container =
            builder.begin_with_digest(identity, options.digest_algorithm, options.standard, &document_digest)?;

        let field_name = revision.field_name().to_string();
        log::info!(
            "prepared signature '{}' ({} with {}, {} bytes reserved)",
            field_name,
            algorithm,
            options.digest_algorithm,
            reserved
        );
        Ok(PreparedSignature {
            bytes: revision.into_bytes()?,
            field_name,
            digest_algorithm: options.digest_algorithm,
            document_digest,
            container,
            reserved,
        })
    }

    /// Phase 2: embed into the prepared document.
    ///
    /// The field must be the newest signature, must cover the whole file and
    /// its placeholder must still be empty. `digest_algorithm` is the one
    /// fixed in phase 1; a container naming any other algorithm is refused
    /// before the ranges are hashed. The container's message digest must
    /// equal the digest of the signed ranges.
    pub fn complete(
        &self,
        prepared_bytes: Vec<u8>,
        field_name: &str,
        digest_algorithm: DigestAlgorithm,
        input: CompletionInput,
    ) -> Result<Vec<u8>> {
        let mut revision = PreparedRevision::reopen(prepared_bytes, field_name)?;
        let builder = SignatureContainerBuilder::new(self.provider.clone());
        let mut container = match input {
            CompletionInput::RawSignature { skeleton, value, pss } => {
                check_digest_agreement(digest_algorithm, &skeleton)?;
                builder.complete_with_raw_signature(skeleton, value, pss.as_ref())?
            },
            CompletionInput::Container(container) => {
                check_digest_agreement(digest_algorithm, &container)?;
                if !container.is_complete() {
                    return Err(Error::Crypto("container carries no signature value".to_string()));
                }
                container
            },
        };

        let actual = revision.digest(self.provider.as_ref(), digest_algorithm)?;
        let claimed = container.message_digest()?;
        if claimed != actual {
            return Err(Error::DigestMismatch {
                expected: format!("{} {}", digest_algorithm, hex::encode(&actual)),
                actual: format!("{} {}", digest_algorithm, hex::encode(&claimed)),
            });
        }
        match container.verify_signature(self.provider.as_ref()) {
            Ok(true) => {},
            Ok(false) => {
                return Err(Error::Crypto(format!(
                    "signature value for '{}' does not verify against the signer certificate",
                    field_name
                )))
            },
            Err(e) => log::warn!("cannot check signature value for '{}': {}", field_name, e),
        }

        if let Some(tsa) = &self.tsa {
            if container.timestamp_tokens()?.is_empty() {
                let token = timestamp_signature(self.provider.as_ref(), tsa.as_ref(), &container)?;
                container.add_timestamp_token(&token)?;
            }
        }

        revision.fill(&container.to_der()?)?;
        revision.into_bytes()
    }

    /// Phase 2 for a [`PreparedSignature`] still at hand.
    pub fn complete_prepared(
        &self,
        prepared: PreparedSignature,
        value: Vec<u8>,
        pss: Option<PssParameters>,
    ) -> Result<Vec<u8>> {
        let digest_algorithm = prepared.digest_algorithm;
        let (bytes, field_name, skeleton) = prepared.into_parts();
        self.complete(bytes, &field_name, digest_algorithm, CompletionInput::RawSignature { skeleton, value, pss })
    }

    /// Both phases with a local signer. Produces the same bytes as
    /// [`Self::prepare`] followed by [`Self::complete`] with the same value.
    pub fn sign(
        &self,
        doc: &PdfDocument,
        identity: &SignerIdentity,
        signer: &dyn ExternalSigner,
        options: &SignOptions,
        extras: &PrepareExtras,
    ) -> Result<(Vec<u8>, String)> {
        let prepared = self.prepare_with(doc, identity, options, extras)?;
        let digest_algorithm = prepared.digest_algorithm;
        let builder = SignatureContainerBuilder::new(self.provider.clone());
        let (bytes, field_name, skeleton) = prepared.into_parts();
        let container = builder.complete_with_signer(skeleton, signer)?;
        let signed = self.complete(bytes, &field_name, digest_algorithm, CompletionInput::Container(container))?;
        Ok((signed, field_name))
    }
}

fn check_digest_agreement(expected: DigestAlgorithm, container: &CmsContainer) -> Result<()> {
    let actual = container.digest_algorithm();
    if actual != expected {
        return Err(Error::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Obtain a token over the digest of the container's signature value.
pub(crate) fn timestamp_signature(
    provider: &dyn CryptoProvider,
    tsa: &dyn TsaClient,
    container: &CmsContainer,
) -> Result<Vec<u8>> {
    let value = container.signature().ok_or(Error::NoSignatureToExtend)?;
    let digest = tsa.digest_algorithm();
    let imprint = provider.digest(digest, value)?;
    let token = tsa.timestamp(&imprint)?;
    let parsed = TimestampToken::parse(&token)?;
    parsed.check_imprint(digest, &imprint)?;
    log::info!("signature timestamped at {}", parsed.time());
    Ok(parsed.der().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::provider::{default_provider, PrivateKeySigner, SigningCredentials};
    use chrono::TimeZone;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    fn identity() -> SignerIdentity {
        SignerIdentity::new(&fixture("signer-rsa.cer"), &[fixture("root.cer")]).unwrap()
    }

    fn signer() -> PrivateKeySigner {
        PrivateKeySigner::new(
            SigningCredentials::new(fixture("signer-rsa.key.der"), fixture("signer-rsa.cer")),
            SignatureAlgorithm::RsaPkcs1,
        )
    }

    fn options() -> SignOptions {
        SignOptions::default().with_signing_time(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn coordinator() -> TwoPhaseCoordinator {
        TwoPhaseCoordinator::new(default_provider(), SigningConfig::default())
    }

    fn doc() -> PdfDocument {
        PdfDocument::from_bytes(fixture("one_page.pdf")).unwrap()
    }

    #[test]
    fn test_prepare_then_complete_with_raw_value() {
        let c = coordinator();
        let prepared = c.prepare(&doc(), &identity(), &options()).unwrap();
        assert_eq!(prepared.field_name(), "Signature1");
        let value = signer()
            .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, None)
            .unwrap();
        let signed = c.complete_prepared(prepared, value, None).unwrap();
        let sig = &PdfDocument::from_bytes(signed).unwrap().signatures().unwrap()[0];
        let container = CmsContainer::from_der(&sig.contents).unwrap();
        assert!(container.verify_signature(default_provider().as_ref()).unwrap());
    }

    #[test]
    fn test_two_phase_matches_single_phase() {
        let c = coordinator();
        let (single, _) = c
            .sign(&doc(), &identity(), &signer(), &options(), &PrepareExtras::default())
            .unwrap();
        let prepared = c.prepare(&doc(), &identity(), &options()).unwrap();
        let value = signer()
            .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, None)
            .unwrap();
        assert_eq!(c.complete_prepared(prepared, value, None).unwrap(), single);
    }

    #[test]
    fn test_completed_session_is_closed() {
        let c = coordinator();
        let prepared = c.prepare(&doc(), &identity(), &options()).unwrap();
        let skeleton = prepared.container().clone();
        let value = signer()
            .sign(&prepared.data_to_be_signed().unwrap(), DigestAlgorithm::Sha256, None)
            .unwrap();
        let signed = c.complete_prepared(prepared, value.clone(), None).unwrap();
        let again = c.complete(
            signed,
            "Signature1",
            DigestAlgorithm::Sha256,
            CompletionInput::RawSignature {
                skeleton,
                value,
                pss: None,
            },
        );
        assert!(matches!(again, Err(Error::SessionClosed)));
    }

    #[test]
    fn test_container_for_other_content_is_rejected() {
        let c = coordinator();
        let prepared = c.prepare(&doc(), &identity(), &options()).unwrap();
        let builder = SignatureContainerBuilder::new(default_provider());
        let foreign = builder
            .begin_with_digest(&identity(), DigestAlgorithm::Sha256, SignatureStandard::Cades, &[7u8; 32])
            .unwrap();
        let foreign = builder.complete_with_signer(foreign, &signer()).unwrap();
        let result = c.complete(
            prepared.bytes().to_vec(),
            "Signature1",
            prepared.digest_algorithm(),
            CompletionInput::Container(foreign),
        );
        assert!(matches!(result, Err(Error::DigestMismatch { .. })));
    }

    #[test]
    fn test_container_with_other_digest_is_rejected() {
        let c = coordinator();
        let prepared = c.prepare(&doc(), &identity(), &options().with_placeholder_size(8192)).unwrap();
        assert_eq!(prepared.digest_algorithm(), DigestAlgorithm::Sha256);

        // A well-formed SHA-512 container over the very same ranges.
        let provider = default_provider();
        let ranges_sha512 = PreparedRevision::reopen(prepared.bytes().to_vec(), "Signature1")
            .unwrap()
            .digest(provider.as_ref(), DigestAlgorithm::Sha512)
            .unwrap();
        let builder = SignatureContainerBuilder::new(provider);
        let sha512 = builder
            .begin_with_digest(&identity(), DigestAlgorithm::Sha512, SignatureStandard::Cades, &ranges_sha512)
            .unwrap();
        let sha512 = builder.complete_with_signer(sha512, &signer()).unwrap();
        assert_eq!(sha512.message_digest().unwrap(), ranges_sha512);

        let result = c.complete(
            prepared.bytes().to_vec(),
            prepared.field_name(),
            prepared.digest_algorithm(),
            CompletionInput::Container(sha512),
        );
        match result {
            Err(Error::DigestMismatch { expected, actual }) => {
                assert_eq!(expected, "SHA-256");
                assert_eq!(actual, "SHA-512");
            },
            other => panic!("unexpected {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_skeleton_with_other_digest_is_rejected() {
        let c = coordinator();
        let prepared = c.prepare(&doc(), &identity(), &options()).unwrap();
        let skeleton = prepared.container().clone();
        let result = c.complete(
            prepared.bytes().to_vec(),
            prepared.field_name(),
            DigestAlgorithm::Sha384,
            CompletionInput::RawSignature {
                skeleton,
                value: vec![0x42; 256],
                pss: None,
            },
        );
        assert!(matches!(result, Err(Error::DigestMismatch { .. })));
    }

    #[test]
    fn test_placeholder_below_lower_bound() {
        let result = coordinator().prepare(&doc(), &identity(), &options().with_placeholder_size(100));
        match result {
            Err(Error::PlaceholderTooSmall { requested, estimated }) => {
                assert_eq!(requested, 100);
                assert!(estimated > 100);
            },
            other => panic!("unexpected {:?}", other.map(|p| p.field_name().to_string())),
        }
    }

    #[test]
    fn test_bad_signature_value_is_rejected() {
        let c = coordinator();
        let prepared = c.prepare(&doc(), &identity(), &options()).unwrap();
        assert!(matches!(c.complete_prepared(prepared, vec![0x42; 256], None), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_ed25519_with_sha1_fails_before_io() {
        let identity = SignerIdentity::new(&fixture("signer-ed25519.cer"), &[fixture("root.cer")]).unwrap();
        let result = coordinator().prepare(&doc(), &identity, &options().with_digest(DigestAlgorithm::Sha1));
        match result {
            Err(Error::DigestForbidden { required, .. }) => assert_eq!(required, "SHA-512"),
            other => panic!("unexpected {:?}", other.map(|p| p.field_name().to_string())),
        }
    }
}
