//! Certificate revocation lists.

use chrono::{DateTime, Utc};
use der::{Decode, Encode};
use x509_cert::crl::CertificateList;

use super::x509_time;
use crate::error::{Error, Result};
use crate::signatures::algorithms::parse_outer_signature_algorithm;
use crate::signatures::identity::CertificateInfo;
use crate::signatures::provider::CryptoProvider;

/// Fetches the CRLs covering a certificate.
pub trait CrlClient: Send + Sync {
    /// DER CRLs from the certificate's distribution points. An empty list
    /// means no CRL is available.
    fn fetch(&self, certificate: &CertificateInfo) -> Result<Vec<Vec<u8>>>;
}

impl<F> CrlClient for F
where
    F: Fn(&CertificateInfo) -> Result<Vec<Vec<u8>>> + Send + Sync,
{
    fn fetch(&self, certificate: &CertificateInfo) -> Result<Vec<Vec<u8>>> {
        self(certificate)
    }
}

/// A parsed CRL.
#[derive(Debug, Clone)]
pub struct CrlInfo {
    der: Vec<u8>,
    list: CertificateList,
    issuer_raw: Vec<u8>,
}

impl CrlInfo {
    /// Parse a DER CRL. PEM input is accepted too.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let der = if data.starts_with(b"-----BEGIN") {
            let (_, der) = der::pem::decode_vec(data).map_err(|e| Error::Revocation(format!("invalid CRL PEM: {}", e)))?;
            der
        } else {
            data.to_vec()
        };
        let list = CertificateList::from_der(&der).map_err(|e| Error::Revocation(format!("invalid CRL: {}", e)))?;
        let issuer_raw = list.tbs_cert_list.issuer.to_der()?;
        Ok(Self { der, list, issuer_raw })
    }

    /// DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// DER issuer name.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    /// `thisUpdate`.
    pub fn this_update(&self) -> DateTime<Utc> {
        x509_time(&self.list.tbs_cert_list.this_update)
    }

    /// `nextUpdate`.
    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.list.tbs_cert_list.next_update.as_ref().map(x509_time)
    }

    /// Number of revoked entries.
    pub fn revoked_count(&self) -> usize {
        self.list
            .tbs_cert_list
            .revoked_certificates
            .as_ref()
            .map_or(0, Vec::len)
    }

    /// Whether the CRL was issued by `issuer`'s name.
    pub fn is_issued_by(&self, issuer: &CertificateInfo) -> bool {
        self.issuer_raw == issuer.subject_raw()
    }

    /// Revocation date of `certificate`, if listed.
    pub fn revocation_of(&self, certificate: &CertificateInfo) -> Option<DateTime<Utc>> {
        self.list
            .tbs_cert_list
            .revoked_certificates
            .as_ref()?
            .iter()
            .find(|entry| entry.serial_number.as_bytes() == certificate.serial())
            .map(|entry| x509_time(&entry.revocation_date))
    }

    /// Check the CRL signature with `issuer`'s key.
    pub fn verify(&self, provider: &dyn CryptoProvider, issuer: &CertificateInfo) -> Result<()> {
        let (algorithm, digest, pss) = parse_outer_signature_algorithm(&self.list.signature_algorithm)?;
        let tbs = self.list.tbs_cert_list.to_der()?;
        let signature = self.list.signature.raw_bytes();
        if provider.verify(issuer.public_key_info(), algorithm, digest, pss.as_ref(), &tbs, signature)? {
            Ok(())
        } else {
            Err(Error::Revocation(format!(
                "CRL signature does not verify with {}",
                issuer.subject()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::provider::RustCryptoProvider;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    #[test]
    fn test_revoked_serial_is_listed() {
        let crl = CrlInfo::parse(&fixture("root.crl")).unwrap();
        let revoked = CertificateInfo::parse(&fixture("revoked.cer")).unwrap();
        let good = CertificateInfo::parse(&fixture("signer-rsa.cer")).unwrap();
        assert_eq!(crl.revoked_count(), 1);
        assert!(crl.revocation_of(&revoked).is_some());
        assert!(crl.revocation_of(&good).is_none());
        assert!(crl.next_update().unwrap() > crl.this_update());
    }

    #[test]
    fn test_signature_and_issuer() {
        let provider = RustCryptoProvider;
        let crl = CrlInfo::parse(&fixture("root.crl")).unwrap();
        let root = CertificateInfo::parse(&fixture("root.cer")).unwrap();
        let tsa = CertificateInfo::parse(&fixture("tsa.cer")).unwrap();
        assert!(crl.is_issued_by(&root));
        assert!(!crl.is_issued_by(&tsa));
        crl.verify(&provider, &root).unwrap();
        assert!(crl.verify(&provider, &tsa).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(CrlInfo::parse(b"not a crl"), Err(Error::Revocation(_))));
    }
}
