//! CMS attribute builders.
//!
//! Signed attributes carry the message digest and bind the signer; the
//! unsigned signature-timestamp attribute is added after signing. ESS and
//! Adobe revocation structures have no `cms` type and are declared here.

use chrono::{DateTime, Datelike, Utc};
use der::asn1::{Any, GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Decode, Encode, Sequence};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;

use super::algorithms::{digest_algorithm_identifier, oids};
use super::provider::CryptoProvider;
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    let values = SetOfVec::try_from(vec![value])?;
    Ok(Attribute { oid, values })
}

/// First value of the attribute with `oid`.
pub fn find<'a>(attrs: &'a [Attribute], oid: &ObjectIdentifier) -> Option<&'a Any> {
    attrs.iter().find(|a| a.oid == *oid).and_then(|a| a.values.iter().next())
}

/// content-type.
pub fn content_type(content: ObjectIdentifier) -> Result<Attribute> {
    attribute(oids::CONTENT_TYPE, Any::encode_from(&content)?)
}

/// message-digest.
pub fn message_digest(digest: &[u8]) -> Result<Attribute> {
    attribute(oids::MESSAGE_DIGEST, Any::encode_from(&OctetString::new(digest.to_vec())?)?)
}

/// Read back a message-digest value.
pub fn decode_message_digest(value: &Any) -> Result<Vec<u8>> {
    let octets: OctetString = value.decode_as()?;
    Ok(octets.into_bytes())
}

/// Encode a time as UTCTime before 2050, GeneralizedTime from then on.
pub fn encode_time(time: DateTime<Utc>) -> Result<Time> {
    let secs = u64::try_from(time.timestamp())
        .map_err(|_| Error::InvalidConfig(format!("signing time {} predates 1970", time)))?;
    let dt = der::DateTime::from_unix_duration(std::time::Duration::from_secs(secs))?;
    if time.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_date_time(dt)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(dt)))
    }
}

/// signing-time.
pub fn signing_time(time: DateTime<Utc>) -> Result<Attribute> {
    attribute(oids::SIGNING_TIME, Any::encode_from(&encode_time(time)?)?)
}

/// ```text
/// IssuerSerial ::= SEQUENCE { issuer GeneralNames, serialNumber CertificateSerialNumber }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct IssuerSerial {
    /// Issuer of the certificate
    pub issuer: Vec<GeneralName>,
    /// Certificate serial
    pub serial_number: SerialNumber,
}

/// ESSCertIDv2 (RFC 5035). The hash algorithm is omitted for SHA-256.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct EssCertIdV2 {
    /// Absent means SHA-256
    pub hash_algorithm: Option<AlgorithmIdentifierOwned>,
    /// Hash of the whole certificate
    pub cert_hash: OctetString,
    /// Issuer and serial of the certificate
    pub issuer_serial: Option<IssuerSerial>,
}

/// SigningCertificateV2, without policies.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SigningCertificateV2 {
    /// Signer certificate first
    pub certs: Vec<EssCertIdV2>,
}

/// Digest used for the ESS certificate hash: the signature digest unless
/// it is SHA-1 or an XOF.
pub fn ess_digest(digest: DigestAlgorithm) -> DigestAlgorithm {
    match digest {
        DigestAlgorithm::Sha1 | DigestAlgorithm::Shake256 => DigestAlgorithm::Sha256,
        other => other,
    }
}

/// signing-certificate-v2 binding `certificate` into the signed attributes.
pub fn signing_certificate_v2(
    provider: &dyn CryptoProvider,
    certificate: &x509_cert::Certificate,
    digest: DigestAlgorithm,
) -> Result<Attribute> {
    let digest = ess_digest(digest);
    let hash = provider.digest(digest, &certificate.to_der()?)?;
    let id = EssCertIdV2 {
        hash_algorithm: (digest != DigestAlgorithm::Sha256).then(|| digest_algorithm_identifier(digest)),
        cert_hash: OctetString::new(hash)?,
        issuer_serial: Some(IssuerSerial {
            issuer: vec![GeneralName::DirectoryName(certificate.tbs_certificate.issuer.clone())],
            serial_number: certificate.tbs_certificate.serial_number.clone(),
        }),
    };
    let value = SigningCertificateV2 { certs: vec![id] };
    attribute(oids::SIGNING_CERTIFICATE_V2, Any::encode_from(&value)?)
}

/// Adobe `RevocationInfoArchival`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct RevocationInfoArchival {
    /// CertificateLists
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub crl: Option<Vec<Any>>,
    /// OCSPResponses
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub ocsp: Option<Vec<Any>>,
    /// Other formats, never produced
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    pub other: Option<Vec<Any>>,
}

/// adbe-revocationInfoArchival with DER CRLs and OCSP responses.
pub fn revocation_info_archival(crls: &[Vec<u8>], ocsps: &[Vec<u8>]) -> Result<Attribute> {
    let to_any = |items: &[Vec<u8>]| -> Result<Option<Vec<Any>>> {
        if items.is_empty() {
            return Ok(None);
        }
        items
            .iter()
            .map(|der| Any::from_der(der).map_err(Error::from))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    };
    let value = RevocationInfoArchival {
        crl: to_any(crls)?,
        ocsp: to_any(ocsps)?,
        other: None,
    };
    attribute(oids::ADBE_REVOCATION_INFO_ARCHIVAL, Any::encode_from(&value)?)
}

/// signature-time-stamp-token (unsigned).
pub fn signature_timestamp_token(token_der: &[u8]) -> Result<Attribute> {
    attribute(oids::SIGNATURE_TIMESTAMP_TOKEN, Any::from_der(token_der)?)
}

/// DER of the signed attributes as a SET, the bytes a signer signs.
pub fn signed_attributes_der(attrs: &SetOfVec<Attribute>) -> Result<Vec<u8>> {
    Ok(attrs.to_der()?)
}
