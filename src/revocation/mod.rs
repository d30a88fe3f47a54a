//! Revocation evidence: OCSP and CRL codecs, issuer resolution, the
//! evidence store and the collector driving them.

pub mod collector;
pub mod crl;
pub mod issuer;
pub mod ocsp;
pub mod store;

pub use collector::{CertificateState, ChainRole, CollectionOutcome, Exemption, RevocationCollector};
pub use crl::{CrlClient, CrlInfo};
pub use issuer::{IssuerCertificateRetriever, IssuerResolver, IssuerSource, Resolution, ResolvedChain, TrustStore};
pub use ocsp::{CertStatus, OcspClient, OcspRequest, OcspResponse};
pub use store::{CrlEvidence, OcspEvidence, RevocationEvidenceStore};

use chrono::{DateTime, TimeZone, Utc};
use der::asn1::GeneralizedTime;

fn unix_seconds(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn generalized_time(time: &GeneralizedTime) -> DateTime<Utc> {
    unix_seconds(time.to_unix_duration().as_secs())
}

pub(crate) fn x509_time(time: &x509_cert::time::Time) -> DateTime<Utc> {
    unix_seconds(time.to_unix_duration().as_secs())
}
