//! Issuer resolution and chain building.
//!
//! An issuer is looked up, in order, among certificates the caller already
//! supplied, the trusted store, and finally through a retrieval callback
//! keyed by the certificate's CA-issuers URIs.

use std::sync::Arc;

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::{Decode, Encode};

use crate::error::{Error, Result};
use crate::signatures::identity::CertificateInfo;
use crate::signatures::provider::pem_blocks;

/// Fetches the bytes behind a CA-issuers URI.
pub trait IssuerCertificateRetriever: Send + Sync {
    /// Raw response body for `uri`.
    fn retrieve(&self, uri: &str) -> Result<Vec<u8>>;
}

impl<F> IssuerCertificateRetriever for F
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    fn retrieve(&self, uri: &str) -> Result<Vec<u8>> {
        self(uri)
    }
}

/// Certificates from an AIA response: a DER certificate, a PKCS#7
/// certs-only bundle, or PEM.
pub fn parse_certificates(data: &[u8]) -> Result<Vec<CertificateInfo>> {
    if data.starts_with(b"-----BEGIN") {
        return pem_blocks(data)?
            .into_iter()
            .filter(|(label, _)| label == "CERTIFICATE")
            .map(|(_, der)| CertificateInfo::parse(&der))
            .collect();
    }
    if let Ok(cert) = CertificateInfo::parse(data) {
        return Ok(vec![cert]);
    }
    let info = ContentInfo::from_der(data)
        .map_err(|e| Error::Certificate(format!("neither a certificate nor PKCS#7: {}", e)))?;
    let signed: SignedData = info.content.decode_as()?;
    let mut certs = Vec::new();
    for choice in signed.certificates.iter().flat_map(|set| set.0.iter()) {
        if let CertificateChoices::Certificate(cert) = choice {
            certs.push(CertificateInfo::parse(&cert.to_der()?)?);
        }
    }
    Ok(certs)
}

/// Trusted certificates, shared read-mostly across signing operations.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    certificates: Vec<CertificateInfo>,
}

impl TrustStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a DER certificate.
    pub fn add_der(&mut self, der: &[u8]) -> Result<()> {
        let cert = CertificateInfo::parse(der)?;
        if !self.certificates.contains(&cert) {
            self.certificates.push(cert);
        }
        Ok(())
    }

    /// Add every certificate in a PEM bundle.
    pub fn add_pem(&mut self, pem: &[u8]) -> Result<usize> {
        let mut added = 0;
        for (label, der) in pem_blocks(pem)? {
            if label == "CERTIFICATE" {
                self.add_der(&der)?;
                added += 1;
            }
        }
        Ok(added)
    }

    /// Builder form of [`TrustStore::add_der`].
    pub fn with_der(mut self, der: &[u8]) -> Result<Self> {
        self.add_der(der)?;
        Ok(self)
    }

    /// Whether `cert` is trusted.
    pub fn contains(&self, cert: &CertificateInfo) -> bool {
        self.certificates.contains(cert)
    }

    /// Trusted issuer of `cert`.
    pub fn find_issuer(&self, cert: &CertificateInfo) -> Option<&CertificateInfo> {
        self.certificates.iter().find(|c| cert.is_issued_by(c))
    }

    /// Number of trusted certificates.
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// True if nothing is trusted.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// Where an issuer was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerSource {
    /// Among certificates supplied with the signer or the evidence
    Known,
    /// In the trust store
    Trusted,
    /// Retrieved from this URI
    Retrieved(String),
}

/// Outcome of one resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Issuer found
    Found(CertificateInfo, IssuerSource),
    /// Certificate is self-issued; chain ends here
    SelfIssued,
    /// No source produced the issuer
    Unresolvable {
        /// Retrieval failures encountered on the way
        failures: Vec<String>,
    },
}

/// A chain built from a leaf.
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    /// Leaf first, each element followed by its issuer
    pub certificates: Vec<CertificateInfo>,
    /// Last certificate whose issuer could not be found, if any
    pub unresolved: Option<CertificateInfo>,
    /// Retrieval failures encountered while building
    pub failures: Vec<String>,
}

impl ResolvedChain {
    /// Issuer of `cert` within the chain.
    pub fn issuer_of(&self, cert: &CertificateInfo) -> Option<&CertificateInfo> {
        let pos = self.certificates.iter().position(|c| c == cert)?;
        self.certificates.get(pos + 1).filter(|next| cert.is_issued_by(next))
    }
}

const MAX_CHAIN_LENGTH: usize = 16;

/// Resolves issuers from known certificates, a trust store and AIA retrieval.
#[derive(Clone, Default)]
pub struct IssuerResolver {
    known: Vec<CertificateInfo>,
    trust: Arc<TrustStore>,
    retriever: Option<Arc<dyn IssuerCertificateRetriever>>,
}

impl std::fmt::Debug for IssuerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerResolver")
            .field("known", &self.known.len())
            .field("trusted", &self.trust.len())
            .field("retriever", &self.retriever.is_some())
            .finish()
    }
}

impl IssuerResolver {
    /// Resolver with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a shared trust store.
    pub fn with_trust_store(mut self, trust: Arc<TrustStore>) -> Self {
        self.trust = trust;
        self
    }

    /// Retrieve missing issuers through `retriever`.
    pub fn with_retriever(mut self, retriever: Arc<dyn IssuerCertificateRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Add certificates known up front.
    pub fn with_known(mut self, certs: impl IntoIterator<Item = CertificateInfo>) -> Self {
        for cert in certs {
            self.add_known(cert);
        }
        self
    }

    /// Add one known certificate.
    pub fn add_known(&mut self, cert: CertificateInfo) {
        if !self.known.contains(&cert) {
            self.known.push(cert);
        }
    }

    /// The trust store.
    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    /// Resolve the issuer of `cert`. Retrieved issuers are remembered.
    pub fn resolve(&mut self, cert: &CertificateInfo) -> Resolution {
        if cert.is_self_issued() && cert.is_issued_by(cert) {
            return Resolution::SelfIssued;
        }
        if let Some(issuer) = self.known.iter().find(|c| *c != cert && cert.is_issued_by(c)) {
            return Resolution::Found(issuer.clone(), IssuerSource::Known);
        }
        if let Some(issuer) = self.trust.find_issuer(cert) {
            return Resolution::Found(issuer.clone(), IssuerSource::Trusted);
        }
        let mut failures = Vec::new();
        if let Some(retriever) = &self.retriever {
            for uri in cert.ca_issuer_urls() {
                let found = retriever
                    .retrieve(uri)
                    .and_then(|bytes| parse_certificates(&bytes))
                    .map(|certs| certs.into_iter().find(|c| cert.is_issued_by(c)));
                match found {
                    Ok(Some(issuer)) => {
                        log::debug!("Retrieved issuer {} from {}", issuer.subject(), uri);
                        self.add_known(issuer.clone());
                        return Resolution::Found(issuer, IssuerSource::Retrieved(uri.clone()));
                    },
                    Ok(None) => failures.push(format!("{}: no issuer of {} in response", uri, cert.subject())),
                    Err(e) => failures.push(format!("{}: {}", uri, e)),
                }
            }
        }
        Resolution::Unresolvable { failures }
    }

    /// Walk issuers from `leaf` until a self-issued or trusted certificate,
    /// or until an issuer cannot be found.
    pub fn build_chain(&mut self, leaf: &CertificateInfo) -> ResolvedChain {
        let mut chain = ResolvedChain {
            certificates: vec![leaf.clone()],
            unresolved: None,
            failures: Vec::new(),
        };
        let mut current = leaf.clone();
        while chain.certificates.len() < MAX_CHAIN_LENGTH {
            if self.trust.contains(&current) && current != *leaf {
                break;
            }
            match self.resolve(&current) {
                Resolution::Found(issuer, source) => {
                    log::debug!("Issuer of {} is {} ({:?})", current.subject(), issuer.subject(), source);
                    if chain.certificates.contains(&issuer) {
                        break;
                    }
                    chain.certificates.push(issuer.clone());
                    current = issuer;
                },
                Resolution::SelfIssued => break,
                Resolution::Unresolvable { failures } => {
                    chain.failures.extend(failures);
                    chain.unresolved = Some(current);
                    break;
                },
            }
        }
        chain
    }
}
