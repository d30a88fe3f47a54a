//! Certificate inspection and signer identity.
//!
//! [`CertificateInfo`] extracts, once, everything signing and revocation
//! collection need from a DER certificate: names, serial, key, access
//! locations and the few extensions that change behavior (ocsp-nocheck,
//! validity-assured short-term certificates).

use chrono::{DateTime, TimeZone, Utc};
use der::Decode;
use x509_parser::prelude::*;

use super::algorithms::{self, oids};
use super::types::SignatureAlgorithm;
use crate::error::{Error, Result};

/// Owned view of a parsed X.509 certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    serial: Vec<u8>,
    spki: Vec<u8>,
    key_bits: Vec<u8>,
    key_algorithm: Option<SignatureAlgorithm>,
    subject_key_id: Option<Vec<u8>>,
    authority_key_id: Option<Vec<u8>>,
    ocsp_urls: Vec<String>,
    ca_issuer_urls: Vec<String>,
    crl_urls: Vec<String>,
    ocsp_no_check: bool,
    validity_assured: bool,
    is_ca: bool,
    time_stamping: bool,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl PartialEq for CertificateInfo {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for CertificateInfo {}

fn timestamp(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl CertificateInfo {
    /// Parse a DER certificate.
    pub fn parse(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("invalid certificate: {}", e)))?;

        let key_oid = algorithms::oid_from_str(&cert.public_key().algorithm.algorithm.to_id_string())?;
        let mut info = Self {
            der: der.to_vec(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            serial: cert.raw_serial().to_vec(),
            spki: cert.public_key().raw.to_vec(),
            key_bits: cert.public_key().subject_public_key.data.to_vec(),
            key_algorithm: algorithms::key_algorithm(&key_oid),
            subject_key_id: None,
            authority_key_id: None,
            ocsp_urls: Vec::new(),
            ca_issuer_urls: Vec::new(),
            crl_urls: Vec::new(),
            ocsp_no_check: false,
            validity_assured: false,
            is_ca: false,
            time_stamping: false,
            not_before: timestamp(cert.validity().not_before.timestamp()),
            not_after: timestamp(cert.validity().not_after.timestamp()),
        };

        for ext in cert.extensions() {
            let oid = ext.oid.to_id_string();
            if oid == oids::OCSP_NOCHECK {
                info.ocsp_no_check = true;
            } else if oid == oids::VALASSURED_ST_CERTS {
                info.validity_assured = true;
            }
            match ext.parsed_extension() {
                ParsedExtension::AuthorityInfoAccess(aia) => {
                    for desc in &aia.accessdescs {
                        let GeneralName::URI(uri) = &desc.access_location else {
                            continue;
                        };
                        let method = desc.access_method.to_id_string();
                        if method == oids::AD_OCSP {
                            info.ocsp_urls.push(uri.to_string());
                        } else if method == oids::AD_CA_ISSUERS {
                            info.ca_issuer_urls.push(uri.to_string());
                        }
                    }
                },
                ParsedExtension::CRLDistributionPoints(points) => {
                    for point in &points.points {
                        if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                            for name in names {
                                if let GeneralName::URI(uri) = name {
                                    info.crl_urls.push(uri.to_string());
                                }
                            }
                        }
                    }
                },
                ParsedExtension::SubjectKeyIdentifier(id) => {
                    info.subject_key_id = Some(id.0.to_vec());
                },
                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    info.authority_key_id = aki.key_identifier.as_ref().map(|id| id.0.to_vec());
                },
                ParsedExtension::BasicConstraints(bc) => {
                    info.is_ca = bc.ca;
                },
                ParsedExtension::ExtendedKeyUsage(eku) => {
                    info.time_stamping = eku.time_stamping;
                },
                _ => {},
            }
        }
        Ok(info)
    }

    /// DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject as a display string.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer as a display string.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// DER-encoded subject Name.
    pub fn subject_raw(&self) -> &[u8] {
        &self.subject_raw
    }

    /// DER-encoded issuer Name.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    /// Serial number content bytes, as encoded.
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// Serial as upper-case hex.
    pub fn serial_hex(&self) -> String {
        hex::encode_upper(&self.serial)
    }

    /// Contents of the subjectPublicKey BIT STRING.
    pub fn public_key_bits(&self) -> &[u8] {
        &self.key_bits
    }

    /// DER SubjectPublicKeyInfo.
    pub fn public_key_info(&self) -> &[u8] {
        &self.spki
    }

    /// Key family, when recognized.
    pub fn key_algorithm(&self) -> Option<SignatureAlgorithm> {
        self.key_algorithm
    }

    /// OCSP responder URLs from Authority Information Access.
    pub fn ocsp_urls(&self) -> &[String] {
        &self.ocsp_urls
    }

    /// CA issuer URLs from Authority Information Access.
    pub fn ca_issuer_urls(&self) -> &[String] {
        &self.ca_issuer_urls
    }

    /// CRL distribution point URLs.
    pub fn crl_urls(&self) -> &[String] {
        &self.crl_urls
    }

    /// Carries id-pkix-ocsp-nocheck.
    pub fn ocsp_no_check(&self) -> bool {
        self.ocsp_no_check
    }

    /// Carries the ETSI validity-assured short-term certificate extension.
    pub fn validity_assured(&self) -> bool {
        self.validity_assured
    }

    /// Basic constraints CA flag.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Extended key usage includes timeStamping.
    pub fn is_time_stamping(&self) -> bool {
        self.time_stamping
    }

    /// Subject and issuer names are equal.
    pub fn is_self_issued(&self) -> bool {
        self.subject_raw == self.issuer_raw
    }

    /// Start of validity.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of validity.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether `candidate` names and identifies the key that issued this certificate.
    pub fn is_issued_by(&self, candidate: &CertificateInfo) -> bool {
        if self.issuer_raw != candidate.subject_raw {
            return false;
        }
        match (&self.authority_key_id, &candidate.subject_key_id) {
            (Some(aki), Some(ski)) => aki == ski,
            _ => true,
        }
    }

    /// Re-parse as an `x509-cert` certificate for CMS structures.
    pub fn to_x509_cert(&self) -> Result<x509_cert::Certificate> {
        Ok(x509_cert::Certificate::from_der(&self.der)?)
    }
}

/// The signing certificate and its chain, leaf first.
#[derive(Debug, Clone)]
pub struct SignerIdentity {
    certificate: CertificateInfo,
    chain: Vec<CertificateInfo>,
}

impl SignerIdentity {
    /// Build from a leaf and any number of chain certificates. The chain is
    /// ordered by walking issuers from the leaf; certificates that do not
    /// belong to the path are kept at the end.
    pub fn new(certificate_der: &[u8], chain_der: &[Vec<u8>]) -> Result<Self> {
        let certificate = CertificateInfo::parse(certificate_der)?;
        let mut pool = chain_der
            .iter()
            .map(|der| CertificateInfo::parse(der))
            .collect::<Result<Vec<_>>>()?;
        pool.retain(|c| *c != certificate);

        let mut chain = Vec::with_capacity(pool.len());
        let mut current = certificate.clone();
        while !current.is_self_issued() {
            let Some(pos) = pool.iter().position(|c| current.is_issued_by(c)) else {
                break;
            };
            let issuer = pool.remove(pos);
            chain.push(issuer.clone());
            current = issuer;
        }
        if !pool.is_empty() {
            log::debug!("{} certificate(s) outside the signer's path kept in chain", pool.len());
            chain.extend(pool);
        }
        Ok(Self { certificate, chain })
    }

    /// Signing certificate.
    pub fn certificate(&self) -> &CertificateInfo {
        &self.certificate
    }

    /// Issuer chain, excluding the signing certificate.
    pub fn chain(&self) -> &[CertificateInfo] {
        &self.chain
    }

    /// Signing certificate followed by its chain.
    pub fn all(&self) -> impl Iterator<Item = &CertificateInfo> {
        std::iter::once(&self.certificate).chain(self.chain.iter())
    }

    /// Resolve the mechanism to sign with: the requested one, or the key's default.
    pub fn signature_algorithm(&self, requested: Option<SignatureAlgorithm>) -> Result<SignatureAlgorithm> {
        let key = self.certificate.key_algorithm().ok_or_else(|| {
            Error::UnsupportedAlgorithm(format!("public key of {}", self.certificate.subject()))
        })?;
        match requested {
            Some(alg) if alg.compatible_with_key(key) => Ok(alg),
            Some(alg) => Err(Error::KeyAlgorithmMismatch {
                certificate: key.name().to_string(),
                requested: alg.name().to_string(),
            }),
            None => Ok(key),
        }
    }
}
