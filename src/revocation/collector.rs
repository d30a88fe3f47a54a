//! Revocation evidence collection.
//!
//! Each certificate moves through `Unresolved -> IssuerFound ->
//! RevocationFetched | RevocationUnavailable`, or ends early as
//! `Unresolvable` or `Exempt`. Only the signing certificate is fatal by
//! default; other chain members produce advisories unless the policy is
//! strict.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;

use super::crl::{CrlClient, CrlInfo};
use super::issuer::{IssuerResolver, Resolution};
use super::ocsp::{CertStatus, OcspClient, OcspResponse};
use super::store::RevocationEvidenceStore;
use crate::config::{RevocationPolicy, RevocationPreference};
use crate::error::{Error, Result};
use crate::signatures::identity::{CertificateInfo, SignerIdentity};
use crate::signatures::provider::CryptoProvider;
use crate::signatures::report::{Advisory, ClientKind, EvidenceSource, SigningReport};

/// Why a certificate needs no revocation evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exemption {
    /// Self-issued trust anchor
    TrustAnchor,
    /// Carries id-pkix-ocsp-nocheck
    OcspNoCheck,
    /// Carries ext-etsi-valassured-ST-certs
    ValidityAssured,
}

/// Where a certificate ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateState {
    /// Not processed yet
    Unresolved,
    /// Issuer known, revocation not yet fetched
    IssuerFound,
    /// At least one usable CRL or OCSP response stored
    RevocationFetched,
    /// No usable evidence from any configured client
    RevocationUnavailable,
    /// Issuer could not be resolved; this branch was skipped
    Unresolvable,
    /// No evidence needed
    Exempt(Exemption),
}

/// Whether a chain member is the signing certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainRole {
    /// The certificate that produced the signature
    Signing,
    /// Any other certificate (issuers, TSA chain, OCSP responders)
    Secondary,
}

/// Per-certificate results of one collection run.
#[derive(Debug, Clone, Default)]
pub struct CollectionOutcome {
    states: Vec<(CertificateInfo, CertificateState)>,
}

impl CollectionOutcome {
    fn set(&mut self, cert: &CertificateInfo, state: CertificateState) {
        match self.states.iter_mut().find(|(c, _)| c == cert) {
            Some(entry) => entry.1 = state,
            None => self.states.push((cert.clone(), state)),
        }
    }

    /// Final state of `cert`.
    pub fn state_of(&self, cert: &CertificateInfo) -> CertificateState {
        self.states
            .iter()
            .find(|(c, _)| c == cert)
            .map_or(CertificateState::Unresolved, |(_, s)| *s)
    }

    /// All processed certificates and their states.
    pub fn states(&self) -> &[(CertificateInfo, CertificateState)] {
        &self.states
    }

    /// Append another run's states.
    pub fn extend(&mut self, other: CollectionOutcome) {
        for (cert, state) in other.states {
            self.set(&cert, state);
        }
    }
}

/// Drives CRL/OCSP clients over certificate chains.
pub struct RevocationCollector {
    provider: Arc<dyn CryptoProvider>,
    resolver: IssuerResolver,
    ocsp: Option<Arc<dyn OcspClient>>,
    crl: Option<Arc<dyn CrlClient>>,
    policy: RevocationPolicy,
}

impl std::fmt::Debug for RevocationCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationCollector")
            .field("provider", &self.provider.name())
            .field("resolver", &self.resolver)
            .field("ocsp", &self.ocsp.is_some())
            .field("crl", &self.crl.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

impl RevocationCollector {
    /// Collector without clients.
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            provider,
            resolver: IssuerResolver::new(),
            ocsp: None,
            crl: None,
            policy: RevocationPolicy::default(),
        }
    }

    /// Use `resolver` for issuer lookup.
    pub fn with_resolver(mut self, resolver: IssuerResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Query OCSP through `client`.
    pub fn with_ocsp_client(mut self, client: Arc<dyn OcspClient>) -> Self {
        self.ocsp = Some(client);
        self
    }

    /// Query CRLs through `client`.
    pub fn with_crl_client(mut self, client: Arc<dyn CrlClient>) -> Self {
        self.crl = Some(client);
        self
    }

    /// Set the collection policy.
    pub fn with_policy(mut self, policy: RevocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The issuer resolver.
    pub fn resolver_mut(&mut self) -> &mut IssuerResolver {
        &mut self.resolver
    }

    /// Whether any revocation client is configured.
    pub fn has_clients(&self) -> bool {
        self.ocsp.is_some() || self.crl.is_some()
    }

    /// Collect evidence for a signer's full chain.
    pub fn collect_for_signer(
        &mut self,
        identity: &SignerIdentity,
        store: &mut RevocationEvidenceStore,
        report: &mut SigningReport,
    ) -> Result<CollectionOutcome> {
        self.collect(identity.certificate(), identity.chain(), ChainRole::Signing, store, report)
    }

    /// Collect evidence for `leaf` and every issuer above it. `supplied`
    /// certificates are tried first when resolving issuers.
    pub fn collect(
        &mut self,
        leaf: &CertificateInfo,
        supplied: &[CertificateInfo],
        role: ChainRole,
        store: &mut RevocationEvidenceStore,
        report: &mut SigningReport,
    ) -> Result<CollectionOutcome> {
        for cert in supplied {
            self.resolver.add_known(cert.clone());
        }
        let mut outcome = CollectionOutcome::default();
        let mut queue = VecDeque::from([(leaf.clone(), role)]);
        let mut visited = HashSet::new();

        while let Some((cert, role)) = queue.pop_front() {
            if !visited.insert(cert.der().to_vec()) {
                continue;
            }
            store.add_certificate(cert.der());
            outcome.set(&cert, CertificateState::Unresolved);

            let issuer = match self.resolver.resolve(&cert) {
                Resolution::Found(issuer, source) => {
                    log::debug!("Issuer of {} found ({:?})", cert.subject(), source);
                    outcome.set(&cert, CertificateState::IssuerFound);
                    queue.push_back((issuer.clone(), ChainRole::Secondary));
                    issuer
                },
                Resolution::SelfIssued => {
                    outcome.set(&cert, CertificateState::Exempt(Exemption::TrustAnchor));
                    continue;
                },
                Resolution::Unresolvable { failures } => {
                    for reason in failures {
                        report.push(Advisory::ClientFailed {
                            client: ClientKind::IssuerRetrieval,
                            subject: cert.subject().to_string(),
                            reason,
                        });
                    }
                    outcome.set(&cert, CertificateState::Unresolvable);
                    if role == ChainRole::Signing || self.policy.strict_chain {
                        return Err(Error::UnresolvedIssuer {
                            subject: cert.subject().to_string(),
                        });
                    }
                    report.push(Advisory::IssuerUnresolvable {
                        subject: cert.subject().to_string(),
                    });
                    continue;
                },
            };

            if cert.validity_assured() {
                report.push(Advisory::ValidityAssured {
                    subject: cert.subject().to_string(),
                });
                outcome.set(&cert, CertificateState::Exempt(Exemption::ValidityAssured));
                continue;
            }
            if cert.ocsp_no_check() {
                log::info!("{} carries ocsp-nocheck, skipping revocation", cert.subject());
                outcome.set(&cert, CertificateState::Exempt(Exemption::OcspNoCheck));
                continue;
            }

            if self.fetch(&cert, &issuer, store, report, &mut queue) {
                outcome.set(&cert, CertificateState::RevocationFetched);
                continue;
            }

            outcome.set(&cert, CertificateState::RevocationUnavailable);
            if role == ChainRole::Signing || self.policy.strict_chain {
                return Err(Error::NoRevocationData {
                    subject: cert.subject().to_string(),
                });
            }
            report.push(Advisory::RevocationUnavailable {
                subject: cert.subject().to_string(),
            });
        }
        Ok(outcome)
    }

    fn fetch(
        &self,
        cert: &CertificateInfo,
        issuer: &CertificateInfo,
        store: &mut RevocationEvidenceStore,
        report: &mut SigningReport,
        queue: &mut VecDeque<(CertificateInfo, ChainRole)>,
    ) -> bool {
        let mut found = false;
        if let Some(client) = &self.ocsp {
            let outcome = client
                .fetch(cert, issuer)
                .and_then(|der| der.map(|der| self.accept_ocsp(der, cert, issuer)).transpose());
            match outcome {
                Ok(Some((der, status, responder))) => {
                    if let CertStatus::Revoked(when) = status {
                        log::debug!("OCSP: {} revoked at {}", cert.subject(), when);
                        report.push(Advisory::CertificateRevoked {
                            subject: cert.subject().to_string(),
                            source: EvidenceSource::Ocsp,
                        });
                    }
                    store.add_ocsp(cert, der, Some(responder.subject().to_string()));
                    if responder != *issuer {
                        store.add_certificate(responder.der());
                        queue.push_back((responder, ChainRole::Secondary));
                    }
                    found = true;
                },
                Ok(None) => log::debug!("OCSP: no response for {}", cert.subject()),
                Err(e) => report.push(Advisory::ClientFailed {
                    client: ClientKind::Ocsp,
                    subject: cert.subject().to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        if found && self.policy.preference == RevocationPreference::OcspThenCrl {
            return true;
        }
        if let Some(client) = &self.crl {
            match client.fetch(cert) {
                Ok(crls) => {
                    for der in crls {
                        match self.accept_crl(&der, cert, issuer) {
                            Ok(info) => {
                                if info.revocation_of(cert).is_some() {
                                    report.push(Advisory::CertificateRevoked {
                                        subject: cert.subject().to_string(),
                                        source: EvidenceSource::Crl,
                                    });
                                }
                                store.add_crl(cert, info.der().to_vec(), Utc::now());
                                found = true;
                            },
                            Err(e) => report.push(Advisory::ClientFailed {
                                client: ClientKind::Crl,
                                subject: cert.subject().to_string(),
                                reason: e.to_string(),
                            }),
                        }
                    }
                },
                Err(e) => report.push(Advisory::ClientFailed {
                    client: ClientKind::Crl,
                    subject: cert.subject().to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        found
    }

    fn accept_ocsp(
        &self,
        der: Vec<u8>,
        cert: &CertificateInfo,
        issuer: &CertificateInfo,
    ) -> Result<(Vec<u8>, CertStatus, CertificateInfo)> {
        let response = OcspResponse::parse(&der)?;
        let responder = response.verify(self.provider.as_ref(), issuer)?;
        match response.status_for(self.provider.as_ref(), cert, issuer)? {
            Some(CertStatus::Unknown) => Err(Error::Revocation(format!(
                "OCSP responder does not know {}",
                cert.subject()
            ))),
            Some(status) => Ok((der, status, responder)),
            None => Err(Error::Revocation(format!(
                "OCSP response does not cover {}",
                cert.subject()
            ))),
        }
    }

    fn accept_crl(&self, der: &[u8], cert: &CertificateInfo, issuer: &CertificateInfo) -> Result<CrlInfo> {
        let info = CrlInfo::parse(der)?;
        if !info.is_issued_by(issuer) {
            return Err(Error::Revocation(format!(
                "CRL is not issued by {} (issuer of {})",
                issuer.subject(),
                cert.subject()
            )));
        }
        info.verify(self.provider.as_ref(), issuer)?;
        Ok(info)
    }
}
