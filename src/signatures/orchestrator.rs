//! PAdES baseline levels.
//!
//! ```text
//! B    sign (TwoPhaseCoordinator::sign)
//! T    B + signature timestamp as unsigned attribute
//! LT   T + DSS revision with revocation data for the signer and TSA chains
//! LTA  LT + document timestamp revision
//! ```
//!
//! Every level is checked up front: a missing timestamp client or a bad
//! digest/algorithm pairing fails before any document or network work.
//! No level is ever silently downgraded.

use std::sync::Arc;

use chrono::Utc;
use der::Encode;

use super::algorithms::{extensions_for, ESIC_LEVEL_5};
use super::container::CmsContainer;
use super::document_writer::{ensure_changes_allowed, ByteRangeDocumentWriter, PlaceholderRequest};
use super::dss::{vri_key, ValidationDictionary};
use super::identity::{CertificateInfo, SignerIdentity};
use super::provider::{CryptoProvider, ExternalSigner};
use super::report::{Advisory, SigningReport};
use super::timestamp::{TimestampToken, TsaClient};
use super::two_phase::{PrepareExtras, TwoPhaseCoordinator};
use super::types::{CertificationLevel, DigestAlgorithm, SignOptions, SignatureKind, SignatureProfile, SignatureStandard};
use crate::config::SigningConfig;
use crate::document::{EmbeddedSignature, PdfDocument};
use crate::error::{Error, Result};
use crate::revocation::{
    ChainRole, CollectionOutcome, CrlClient, IssuerResolver, OcspClient, RevocationCollector, RevocationEvidenceStore,
};

/// Output of an orchestrated operation.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    /// The complete document
    pub bytes: Vec<u8>,
    /// Field of the signature or document timestamp added, if any
    pub field_name: Option<String>,
    /// Non-fatal conditions met on the way
    pub report: SigningReport,
}

/// Runs signing, extension and prolongation at a chosen level.
pub struct ProfileOrchestrator {
    provider: Arc<dyn CryptoProvider>,
    config: SigningConfig,
    tsa: Option<Arc<dyn TsaClient>>,
    collector: RevocationCollector,
}

impl std::fmt::Debug for ProfileOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileOrchestrator")
            .field("provider", &self.provider.name())
            .field("tsa", &self.tsa.is_some())
            .field("collector", &self.collector)
            .finish()
    }
}

impl ProfileOrchestrator {
    /// Orchestrator without any network collaborator.
    pub fn new(provider: Arc<dyn CryptoProvider>, config: SigningConfig) -> Self {
        let collector = RevocationCollector::new(provider.clone()).with_policy(config.revocation);
        Self {
            provider,
            config,
            tsa: None,
            collector,
        }
    }

    /// Time-stamping authority for T and LTA.
    pub fn with_tsa(mut self, tsa: Arc<dyn TsaClient>) -> Self {
        self.tsa = Some(tsa);
        self
    }

    /// OCSP client for LT.
    pub fn with_ocsp_client(mut self, client: Arc<dyn OcspClient>) -> Self {
        self.collector = self.collector.with_ocsp_client(client);
        self
    }

    /// CRL client for LT.
    pub fn with_crl_client(mut self, client: Arc<dyn CrlClient>) -> Self {
        self.collector = self.collector.with_crl_client(client);
        self
    }

    /// Issuer resolution (known certificates, trust store, AIA retrieval).
    pub fn with_resolver(mut self, resolver: IssuerResolver) -> Self {
        self.collector = self.collector.with_resolver(resolver);
        self
    }

    /// The revocation collector.
    pub fn collector_mut(&mut self) -> &mut RevocationCollector {
        &mut self.collector
    }

    /// A coordinator sharing this orchestrator's provider and configuration,
    /// timestamping when a TSA is set.
    pub fn coordinator(&self) -> TwoPhaseCoordinator {
        let coordinator = TwoPhaseCoordinator::new(self.provider.clone(), self.config.clone());
        match &self.tsa {
            Some(tsa) => coordinator.with_tsa(tsa.clone()),
            None => coordinator,
        }
    }

    /// Sign `doc` at `profile`.
    pub fn sign_with_profile(
        &mut self,
        doc: &PdfDocument,
        identity: &SignerIdentity,
        signer: &dyn ExternalSigner,
        options: &SignOptions,
        profile: SignatureProfile,
    ) -> Result<SignedDocument> {
        let mut options = options.clone();
        options.signature_algorithm.get_or_insert(signer.signature_algorithm());
        let options = &options;
        let mut coordinator = TwoPhaseCoordinator::new(self.provider.clone(), self.config.clone());
        let algorithm = coordinator.check_algorithms(identity, options)?;
        if signer.signature_algorithm() != algorithm {
            return Err(Error::KeyAlgorithmMismatch {
                certificate: algorithm.name().to_string(),
                requested: signer.signature_algorithm().name().to_string(),
            });
        }
        if profile.requires_timestamp() {
            let tsa = self.tsa.clone().ok_or(Error::TimestampClientRequired)?;
            coordinator = coordinator.with_tsa(tsa);
        }
        ensure_changes_allowed(doc)?;
        if profile.requires_revocation() && options.certification == CertificationLevel::NoChangesAllowed {
            return Err(Error::CertificationForbidsChanges);
        }
        log::info!("signing at level {} as {}", profile, identity.certificate().subject());

        let mut report = SigningReport::new();
        if options.digest_algorithm == DigestAlgorithm::Sha1 {
            report.push(Advisory::DeprecatedDigest {
                digest: options.digest_algorithm.name().to_string(),
            });
        }

        let archival = options.embed_revocation_archival && options.standard == SignatureStandard::Cms;
        let mut store = RevocationEvidenceStore::new();
        let mut outcome = CollectionOutcome::default();
        if profile.requires_revocation() || archival {
            outcome = self.collector.collect_for_signer(identity, &mut store, &mut report)?;
        }
        let extras = PrepareExtras {
            revocation_archival: archival.then(|| {
                (
                    store.crls().map(|(der, _)| der.to_vec()).collect(),
                    store.ocsps().map(|(der, _)| der.to_vec()).collect(),
                )
            }),
        };

        let (bytes, field_name) = coordinator.sign(doc, identity, signer, options, &extras)?;
        if !profile.requires_revocation() {
            return Ok(SignedDocument {
                bytes,
                field_name: Some(field_name),
                report,
            });
        }

        let signed = PdfDocument::from_bytes(bytes)?;
        let signature = signed
            .signatures()?
            .into_iter()
            .find(|s| s.field_name == field_name)
            .ok_or_else(|| Error::FieldNotFound(field_name.clone()))?;
        let container = CmsContainer::from_der(&signature.contents)?;
        let mut certificates = outcome_certificates(&outcome);
        certificates.extend(self.collect_timestamp_chains(&container, &mut store, &mut report)?);

        let mut dss = ValidationDictionary::read(&signed)?;
        dss.merge_store(&store);
        dss.add_vri(&vri_key(self.provider.as_ref(), &signature)?, &certificates, &store, Utc::now());
        let mut bytes = dss.write_revision(&signed)?;

        if profile == SignatureProfile::LTA {
            bytes = self.document_timestamp(&PdfDocument::from_bytes(bytes)?)?.0;
        }
        Ok(SignedDocument {
            bytes,
            field_name: Some(field_name),
            report,
        })
    }

    /// Re-enter at LT or LTA on an already signed document: gather fresh
    /// evidence for every signature and document timestamp, merge it into
    /// the DSS and, for LTA, add a document timestamp over the result.
    pub fn prolong_signatures(&mut self, doc: &PdfDocument, profile: SignatureProfile) -> Result<SignedDocument> {
        if !profile.requires_revocation() {
            return Err(Error::Unsupported(format!("prolongation to level {}", profile)));
        }
        if profile == SignatureProfile::LTA && self.tsa.is_none() {
            return Err(Error::TimestampClientRequired);
        }
        let signatures = doc.signatures()?;
        if signatures.is_empty() {
            return Err(Error::NoSignaturesToProlong);
        }
        if profile == SignatureProfile::LTA && !signatures.iter().any(has_timestamp) {
            return Err(Error::NoTimestampToArchive);
        }
        ensure_changes_allowed(doc)?;

        let mut report = SigningReport::new();
        let mut store = RevocationEvidenceStore::new();
        let mut vri = Vec::new();
        for signature in &signatures {
            match self.collect_for_signature(signature, &mut store, &mut report)? {
                Some(certificates) => vri.push((vri_key(self.provider.as_ref(), signature)?, certificates)),
                None => log::warn!("skipping unreadable signature '{}'", signature.field_name),
            }
        }
        if vri.is_empty() {
            return Err(Error::NoSignaturesToProlong);
        }

        let mut dss = ValidationDictionary::read(doc)?;
        dss.merge_store(&store);
        let now = Utc::now();
        for (key, certificates) in &vri {
            dss.add_vri(key, certificates, &store, now);
        }
        let mut bytes = dss.write_revision(doc)?;
        log::info!("prolonged {} signature(s) to level {}", vri.len(), profile);

        let mut field_name = None;
        if profile == SignatureProfile::LTA {
            let (stamped, name) = self.document_timestamp(&PdfDocument::from_bytes(bytes)?)?;
            bytes = stamped;
            field_name = Some(name);
        }
        Ok(SignedDocument {
            bytes,
            field_name,
            report,
        })
    }

    /// Append a document timestamp (`/Type /DocTimeStamp`).
    pub fn add_document_timestamp(&self, doc: &PdfDocument) -> Result<SignedDocument> {
        let (bytes, field_name) = self.document_timestamp(doc)?;
        Ok(SignedDocument {
            bytes,
            field_name: Some(field_name),
            report: SigningReport::new(),
        })
    }

    fn document_timestamp(&self, doc: &PdfDocument) -> Result<(Vec<u8>, String)> {
        let tsa = self.tsa.as_ref().ok_or(Error::TimestampClientRequired)?;
        let algorithm = tsa.digest_algorithm();
        let mut extensions = vec![ESIC_LEVEL_5];
        extensions.extend(extensions_for(None, algorithm));
        let request =
            PlaceholderRequest::document_timestamp(None, tsa.token_size_estimate()).with_extensions(extensions);

        let mut revision = ByteRangeDocumentWriter::new(self.config.clone()).prepare(doc, &request)?;
        let digest = revision.digest(self.provider.as_ref(), algorithm)?;
        let token = tsa.timestamp(&digest)?;
        let parsed = TimestampToken::parse(&token)?;
        parsed.check_imprint(algorithm, &digest)?;
        revision.fill(parsed.der())?;
        let field_name = revision.field_name().to_string();
        log::info!("document timestamp '{}' at {}", field_name, parsed.time());
        Ok((revision.into_bytes()?, field_name))
    }

    /// Collect for one embedded signature. Returns the certificates its VRI
    /// entry lists, or `None` if the signature cannot be read.
    fn collect_for_signature(
        &mut self,
        signature: &EmbeddedSignature,
        store: &mut RevocationEvidenceStore,
        report: &mut SigningReport,
    ) -> Result<Option<Vec<Vec<u8>>>> {
        let (container, role) = match signature.kind {
            SignatureKind::Signature => match CmsContainer::from_der(&signature.contents) {
                Ok(container) => (container, ChainRole::Signing),
                Err(_) => return Ok(None),
            },
            SignatureKind::DocumentTimestamp => match TimestampToken::parse(&signature.contents) {
                Ok(token) => (token.container().clone(), ChainRole::Secondary),
                Err(_) => return Ok(None),
            },
        };
        let Some((leaf, supplied)) = signer_and_chain(&container)? else {
            return Ok(None);
        };
        let outcome = self.collector.collect(&leaf, &supplied, role, store, report)?;
        let mut certificates = outcome_certificates(&outcome);
        certificates.extend(self.collect_timestamp_chains(&container, store, report)?);
        Ok(Some(certificates))
    }

    /// Collect for the TSA of every signature timestamp in `container`.
    fn collect_timestamp_chains(
        &mut self,
        container: &CmsContainer,
        store: &mut RevocationEvidenceStore,
        report: &mut SigningReport,
    ) -> Result<Vec<Vec<u8>>> {
        let mut certificates = Vec::new();
        for token in container.timestamp_tokens()? {
            let token = TimestampToken::parse(&token)?;
            let Some((leaf, supplied)) = signer_and_chain(token.container())? else {
                log::warn!("timestamp token without TSA certificate, skipping its chain");
                continue;
            };
            let outcome = self
                .collector
                .collect(&leaf, &supplied, ChainRole::Secondary, store, report)?;
            certificates.extend(outcome_certificates(&outcome));
        }
        Ok(certificates)
    }
}

fn outcome_certificates(outcome: &CollectionOutcome) -> Vec<Vec<u8>> {
    outcome.states().iter().map(|(cert, _)| cert.der().to_vec()).collect()
}

/// Signer certificate and the other embedded certificates of a container.
fn signer_and_chain(container: &CmsContainer) -> Result<Option<(CertificateInfo, Vec<CertificateInfo>)>> {
    let Some(signer) = container.signer_certificate() else {
        return Ok(None);
    };
    let leaf = CertificateInfo::parse(&signer.to_der()?)?;
    let mut supplied = Vec::new();
    for cert in container.certificates() {
        let info = CertificateInfo::parse(&cert.to_der()?)?;
        if info != leaf {
            supplied.push(info);
        }
    }
    Ok(Some((leaf, supplied)))
}

fn has_timestamp(signature: &EmbeddedSignature) -> bool {
    match signature.kind {
        SignatureKind::DocumentTimestamp => true,
        SignatureKind::Signature => CmsContainer::from_der(&signature.contents)
            .and_then(|c| c.timestamp_tokens())
            .is_ok_and(|tokens| !tokens.is_empty()),
    }
}
