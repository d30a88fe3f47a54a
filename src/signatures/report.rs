//! Advisory channel.
//!
//! Conditions worth surfacing that must not stop signing: exempted or
//! unavailable revocation checks, revoked certificates, failed clients.
//! Each advisory is logged when recorded and returned to the caller in a
//! [`SigningReport`].

use std::fmt;

use serde::Serialize;

/// Which revocation source produced a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// OCSP response
    Ocsp,
    /// Certificate revocation list
    Crl,
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceSource::Ocsp => write!(f, "OCSP"),
            EvidenceSource::Crl => write!(f, "CRL"),
        }
    }
}

/// Collaborator a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// OCSP client
    Ocsp,
    /// CRL client
    Crl,
    /// Issuer certificate retrieval
    IssuerRetrieval,
    /// Timestamp authority
    Timestamp,
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientKind::Ocsp => "OCSP client",
            ClientKind::Crl => "CRL client",
            ClientKind::IssuerRetrieval => "issuer retrieval",
            ClientKind::Timestamp => "TSA client",
        };
        f.write_str(name)
    }
}

/// A non-fatal condition observed during an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// Revocation checks skipped for a validity-assured certificate
    ValidityAssured {
        /// Certificate subject
        subject: String,
    },
    /// No evidence for a chain member that is not the signing certificate
    RevocationUnavailable {
        /// Certificate subject
        subject: String,
    },
    /// Evidence says the certificate is revoked; it is embedded anyway
    CertificateRevoked {
        /// Certificate subject
        subject: String,
        /// Where the revocation was reported
        source: EvidenceSource,
    },
    /// Chain building stopped at this certificate
    IssuerUnresolvable {
        /// Certificate subject
        subject: String,
    },
    /// A collaborator call failed and its result was skipped
    ClientFailed {
        /// Failing collaborator
        client: ClientKind,
        /// Certificate being processed
        subject: String,
        /// Failure description
        reason: String,
    },
    /// The signature uses a digest validators increasingly reject
    DeprecatedDigest {
        /// Digest name
        digest: String,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::ValidityAssured { subject } => {
                write!(f, "revocation check skipped for validity-assured certificate {}", subject)
            },
            Advisory::RevocationUnavailable { subject } => {
                write!(f, "no revocation data for {}", subject)
            },
            Advisory::CertificateRevoked { subject, source } => {
                write!(f, "{} reports {} as revoked", source, subject)
            },
            Advisory::IssuerUnresolvable { subject } => write!(f, "cannot resolve issuer of {}", subject),
            Advisory::ClientFailed {
                client,
                subject,
                reason,
            } => write!(f, "{} failed for {}: {}", client, subject, reason),
            Advisory::DeprecatedDigest { digest } => write!(f, "digest {} is deprecated", digest),
        }
    }
}

impl Advisory {
    /// Whether this advisory should be logged at warning level.
    pub fn is_warning(&self) -> bool {
        !matches!(self, Advisory::ValidityAssured { .. })
    }
}

/// Advisories gathered by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SigningReport {
    advisories: Vec<Advisory>,
}

impl SigningReport {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log an advisory. Exact repeats are dropped.
    pub fn push(&mut self, advisory: Advisory) {
        if self.advisories.contains(&advisory) {
            return;
        }
        if advisory.is_warning() {
            log::warn!("{}", advisory);
        } else {
            log::info!("{}", advisory);
        }
        self.advisories.push(advisory);
    }

    /// Append another report.
    pub fn extend(&mut self, other: SigningReport) {
        for advisory in other.advisories {
            self.push(advisory);
        }
    }

    /// All advisories in recording order.
    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.advisories.is_empty()
    }

    /// Subjects reported revoked.
    pub fn revoked_subjects(&self) -> Vec<&str> {
        self.advisories
            .iter()
            .filter_map(|a| match a {
                Advisory::CertificateRevoked { subject, .. } => Some(subject.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_deduplicates() {
        let mut report = SigningReport::new();
        let advisory = Advisory::RevocationUnavailable {
            subject: "CN=Root".to_string(),
        };
        report.push(advisory.clone());
        report.push(advisory);
        assert_eq!(report.advisories().len(), 1);
    }

    #[test]
    fn test_revoked_subjects() {
        let mut report = SigningReport::new();
        report.push(Advisory::CertificateRevoked {
            subject: "CN=A".to_string(),
            source: EvidenceSource::Crl,
        });
        report.push(Advisory::DeprecatedDigest {
            digest: "SHA-1".to_string(),
        });
        assert_eq!(report.revoked_subjects(), vec!["CN=A"]);
        assert!(report.advisories()[0].to_string().contains("CRL"));
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let mut report = SigningReport::new();
        report.push(Advisory::ValidityAssured {
            subject: "CN=Short".to_string(),
        });
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"kind\":\"validity_assured\""));
    }
}
