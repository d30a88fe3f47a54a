//! Deduplicated revocation evidence.
//!
//! Three insertion-ordered pools (certificates, CRLs, OCSP responses) keyed
//! by their DER bytes, plus a per-certificate index into the pools. Adding
//! identical bytes twice is a no-op, so merging passes is idempotent.

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};

use crate::signatures::identity::CertificateInfo;

/// Metadata kept for a CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlEvidence {
    /// When the CRL was fetched, `None` for CRLs read back from a document
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Metadata kept for an OCSP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspEvidence {
    /// Subject of the responder that signed it, when known
    pub responder: Option<String>,
}

/// Evidence attached to one certificate, as pool indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateEvidence {
    /// Indices into [`RevocationEvidenceStore::crls`]
    pub crls: IndexSet<usize>,
    /// Indices into [`RevocationEvidenceStore::ocsps`]
    pub ocsps: IndexSet<usize>,
}

impl CertificateEvidence {
    /// True if no evidence is attached.
    pub fn is_empty(&self) -> bool {
        self.crls.is_empty() && self.ocsps.is_empty()
    }
}

/// Certificates, CRLs and OCSP responses gathered for validation.
#[derive(Debug, Clone, Default)]
pub struct RevocationEvidenceStore {
    certificates: IndexSet<Vec<u8>>,
    crls: IndexMap<Vec<u8>, CrlEvidence>,
    ocsps: IndexMap<Vec<u8>, OcspEvidence>,
    entries: IndexMap<Vec<u8>, CertificateEvidence>,
}

impl RevocationEvidenceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed pools from a document's existing validation data.
    pub fn from_existing(certificates: &[Vec<u8>], crls: &[Vec<u8>], ocsps: &[Vec<u8>]) -> Self {
        let mut store = Self::new();
        for der in certificates {
            store.add_certificate(der);
        }
        for der in crls {
            store.crls.entry(der.clone()).or_insert(CrlEvidence { fetched_at: None });
        }
        for der in ocsps {
            store
                .ocsps
                .entry(der.clone())
                .or_insert(OcspEvidence { responder: None });
        }
        store
    }

    /// Add a certificate. Returns true if it was new.
    pub fn add_certificate(&mut self, der: &[u8]) -> bool {
        if self.certificates.contains(der) {
            return false;
        }
        self.certificates.insert(der.to_vec())
    }

    /// Attach a CRL to `certificate`. Returns true if the CRL bytes were new.
    pub fn add_crl(&mut self, certificate: &CertificateInfo, der: Vec<u8>, fetched_at: DateTime<Utc>) -> bool {
        let (index, added) = match self.crls.get_index_of(&der) {
            Some(index) => (index, false),
            None => {
                let (index, _) = self.crls.insert_full(
                    der,
                    CrlEvidence {
                        fetched_at: Some(fetched_at),
                    },
                );
                (index, true)
            },
        };
        self.entry(certificate).crls.insert(index);
        added
    }

    /// Attach an OCSP response to `certificate`. Returns true if the
    /// response bytes were new.
    pub fn add_ocsp(&mut self, certificate: &CertificateInfo, der: Vec<u8>, responder: Option<String>) -> bool {
        let (index, added) = match self.ocsps.get_index_of(&der) {
            Some(index) => (index, false),
            None => {
                let (index, _) = self.ocsps.insert_full(der, OcspEvidence { responder });
                (index, true)
            },
        };
        self.entry(certificate).ocsps.insert(index);
        added
    }

    fn entry(&mut self, certificate: &CertificateInfo) -> &mut CertificateEvidence {
        self.add_certificate(certificate.der());
        self.entries.entry(certificate.der().to_vec()).or_default()
    }

    /// All certificates in insertion order.
    pub fn certificates(&self) -> impl Iterator<Item = &[u8]> {
        self.certificates.iter().map(Vec::as_slice)
    }

    /// All CRLs in insertion order.
    pub fn crls(&self) -> impl Iterator<Item = (&[u8], &CrlEvidence)> {
        self.crls.iter().map(|(der, meta)| (der.as_slice(), meta))
    }

    /// All OCSP responses in insertion order.
    pub fn ocsps(&self) -> impl Iterator<Item = (&[u8], &OcspEvidence)> {
        self.ocsps.iter().map(|(der, meta)| (der.as_slice(), meta))
    }

    /// Pool index of a certificate.
    pub fn certificate_index(&self, der: &[u8]) -> Option<usize> {
        self.certificates.get_index_of(der)
    }

    /// Pool index of a CRL.
    pub fn crl_index(&self, der: &[u8]) -> Option<usize> {
        self.crls.get_index_of(der)
    }

    /// Pool index of an OCSP response.
    pub fn ocsp_index(&self, der: &[u8]) -> Option<usize> {
        self.ocsps.get_index_of(der)
    }

    /// Evidence attached to a certificate.
    pub fn evidence_for(&self, certificate_der: &[u8]) -> Option<&CertificateEvidence> {
        self.entries.get(certificate_der)
    }

    /// Whether any CRL or OCSP response is attached to the certificate.
    pub fn has_evidence(&self, certificate_der: &[u8]) -> bool {
        self.evidence_for(certificate_der).is_some_and(|e| !e.is_empty())
    }

    /// DER CRLs attached to a certificate.
    pub fn crls_for(&self, certificate_der: &[u8]) -> Vec<&[u8]> {
        self.evidence_for(certificate_der)
            .map(|e| {
                e.crls
                    .iter()
                    .filter_map(|i| self.crls.get_index(*i).map(|(der, _)| der.as_slice()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// DER OCSP responses attached to a certificate.
    pub fn ocsps_for(&self, certificate_der: &[u8]) -> Vec<&[u8]> {
        self.evidence_for(certificate_der)
            .map(|e| {
                e.ocsps
                    .iter()
                    .filter_map(|i| self.ocsps.get_index(*i).map(|(der, _)| der.as_slice()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Union `other` into `self`, remapping its per-certificate indices.
    pub fn merge(&mut self, other: &RevocationEvidenceStore) {
        for der in &other.certificates {
            self.add_certificate(der);
        }
        let crl_map: Vec<usize> = other
            .crls
            .iter()
            .map(|(der, meta)| match self.crls.get_index_of(der) {
                Some(index) => index,
                None => self.crls.insert_full(der.clone(), meta.clone()).0,
            })
            .collect();
        let ocsp_map: Vec<usize> = other
            .ocsps
            .iter()
            .map(|(der, meta)| match self.ocsps.get_index_of(der) {
                Some(index) => index,
                None => self.ocsps.insert_full(der.clone(), meta.clone()).0,
            })
            .collect();
        for (cert, evidence) in &other.entries {
            let entry = self.entries.entry(cert.clone()).or_default();
            entry.crls.extend(evidence.crls.iter().map(|i| crl_map[*i]));
            entry.ocsps.extend(evidence.ocsps.iter().map(|i| ocsp_map[*i]));
        }
    }

    /// Pool sizes: certificates, CRLs, OCSP responses.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.certificates.len(), self.crls.len(), self.ocsps.len())
    }

    /// True if all pools are empty.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.crls.is_empty() && self.ocsps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    fn signer() -> CertificateInfo {
        CertificateInfo::parse(&fixture("signer-rsa.cer")).unwrap()
    }

    #[test]
    fn test_identical_evidence_is_not_duplicated() {
        let mut store = RevocationEvidenceStore::new();
        let cert = signer();
        let crl = fixture("root.crl");
        assert!(store.add_crl(&cert, crl.clone(), Utc::now()));
        assert!(!store.add_crl(&cert, crl, Utc::now()));
        assert!(store.add_ocsp(&cert, fixture("signer-rsa.ocsp"), None));
        assert_eq!(store.counts(), (1, 1, 1));
        assert_eq!(store.crls_for(cert.der()).len(), 1);
        assert!(store.has_evidence(cert.der()));
    }

    #[test]
    fn test_merge_is_idempotent_and_remaps() {
        let cert = signer();
        let tsa = CertificateInfo::parse(&fixture("tsa.cer")).unwrap();

        let mut first = RevocationEvidenceStore::new();
        first.add_ocsp(&cert, fixture("signer-rsa.ocsp"), None);

        let mut second = RevocationEvidenceStore::new();
        second.add_ocsp(&tsa, fixture("tsa.ocsp"), None);
        second.add_ocsp(&cert, fixture("signer-rsa.ocsp"), None);

        first.merge(&second);
        first.merge(&second);
        assert_eq!(first.counts(), (2, 0, 2));
        assert_eq!(first.ocsps_for(tsa.der()), vec![fixture("tsa.ocsp").as_slice()]);
        assert_eq!(first.ocsps_for(cert.der()).len(), 1);
    }

    #[test]
    fn test_seeded_pools_absorb_refetched_evidence() {
        let cert = signer();
        let crl = fixture("root.crl");
        let mut store = RevocationEvidenceStore::from_existing(&[cert.der().to_vec()], &[crl.clone()], &[]);
        assert!(!store.add_crl(&cert, crl, Utc::now()));
        assert_eq!(store.counts(), (1, 1, 0));
        assert!(store.crls().next().unwrap().1.fetched_at.is_none());
    }
}
