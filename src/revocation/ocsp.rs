//! OCSP (RFC 6960) requests and responses.
//!
//! Only what evidence collection needs: building a single-certificate
//! request, reading a response's status for a certificate, and checking the
//! responder signature against the issuer or a delegated responder.

use chrono::{DateTime, Utc};
use der::asn1::{Any, BitString, GeneralizedTime, ObjectIdentifier, OctetString};
use der::{Decode, Encode, Enumerated, Sequence, SliceReader, Tag, Tagged};
use rand::RngCore;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::{Extension, Extensions};
use x509_cert::serial_number::SerialNumber;

use super::generalized_time;
use crate::error::{Error, Result};
use crate::signatures::algorithms::{oids, parse_outer_signature_algorithm};
use crate::signatures::identity::CertificateInfo;
use crate::signatures::provider::CryptoProvider;
use crate::signatures::types::DigestAlgorithm;

/// Fetches an OCSP response for a certificate.
pub trait OcspClient: Send + Sync {
    /// DER `OCSPResponse` for `certificate`, or `None` when the responder
    /// has nothing to say.
    fn fetch(&self, certificate: &CertificateInfo, issuer: &CertificateInfo) -> Result<Option<Vec<u8>>>;
}

impl<F> OcspClient for F
where
    F: Fn(&CertificateInfo, &CertificateInfo) -> Result<Option<Vec<u8>>> + Send + Sync,
{
    fn fetch(&self, certificate: &CertificateInfo, issuer: &CertificateInfo) -> Result<Option<Vec<u8>>> {
        self(certificate, issuer)
    }
}

/// ```text
/// CertID ::= SEQUENCE {
///     hashAlgorithm   AlgorithmIdentifier,
///     issuerNameHash  OCTET STRING,
///     issuerKeyHash   OCTET STRING,
///     serialNumber    CertificateSerialNumber }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertId {
    /// Hash used for the name and key hashes
    pub hash_algorithm: AlgorithmIdentifierOwned,
    /// Hash of the issuer's DER subject name
    pub issuer_name_hash: OctetString,
    /// Hash of the issuer's public key bits
    pub issuer_key_hash: OctetString,
    /// Serial of the certificate in question
    pub serial_number: SerialNumber,
}

impl CertId {
    /// CertID of `certificate` under `digest`.
    pub fn new(
        provider: &dyn CryptoProvider,
        digest: DigestAlgorithm,
        certificate: &CertificateInfo,
        issuer: &CertificateInfo,
    ) -> Result<Self> {
        Ok(Self {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: digest.oid(),
                parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
            },
            issuer_name_hash: OctetString::new(provider.digest(digest, issuer.subject_raw())?)?,
            issuer_key_hash: OctetString::new(provider.digest(digest, issuer.public_key_bits())?)?,
            serial_number: SerialNumber::new(certificate.serial())
                .map_err(|e| Error::Certificate(format!("serial of {}: {}", certificate.subject(), e)))?,
        })
    }

    /// Whether this CertID designates `certificate` issued by `issuer`.
    pub fn matches(
        &self,
        provider: &dyn CryptoProvider,
        certificate: &CertificateInfo,
        issuer: &CertificateInfo,
    ) -> Result<bool> {
        let Some(digest) = DigestAlgorithm::from_oid(&self.hash_algorithm.oid) else {
            return Ok(false);
        };
        if self.serial_number.as_bytes() != certificate.serial() {
            return Ok(false);
        }
        Ok(
            self.issuer_name_hash.as_bytes() == provider.digest(digest, issuer.subject_raw())?.as_slice()
                && self.issuer_key_hash.as_bytes() == provider.digest(digest, issuer.public_key_bits())?.as_slice(),
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct Request {
    req_cert: CertId,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    single_request_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct TbsRequest {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    version: Option<u8>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    requestor_name: Option<GeneralName>,
    request_list: Vec<Request>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    request_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct OcspRequestDer {
    tbs_request: TbsRequest,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    optional_signature: Option<Any>,
}

/// An unsigned single-certificate OCSP request with a nonce.
#[derive(Debug, Clone)]
pub struct OcspRequest {
    nonce: Vec<u8>,
    der: Vec<u8>,
}

impl OcspRequest {
    /// Request the status of `certificate`, identified with SHA-1 as
    /// responders universally support.
    pub fn new(provider: &dyn CryptoProvider, certificate: &CertificateInfo, issuer: &CertificateInfo) -> Result<Self> {
        let cert_id = CertId::new(provider, DigestAlgorithm::Sha1, certificate, issuer)?;
        let mut nonce = vec![0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let nonce_ext = Extension {
            extn_id: oids::OCSP_NONCE,
            critical: false,
            extn_value: OctetString::new(OctetString::new(nonce.clone())?.to_der()?)?,
        };
        let request = OcspRequestDer {
            tbs_request: TbsRequest {
                version: None,
                requestor_name: None,
                request_list: vec![Request {
                    req_cert: cert_id,
                    single_request_extensions: None,
                }],
                request_extensions: Some(vec![nonce_ext]),
            },
            optional_signature: None,
        };
        Ok(Self {
            nonce,
            der: request.to_der()?,
        })
    }

    /// DER to POST as `application/ocsp-request`.
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// Nonce carried in the request extensions.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Reject a response that echoes a different nonce. Responders that
    /// omit the nonce are accepted.
    pub fn check_response(&self, response: &OcspResponse) -> Result<()> {
        match response.nonce() {
            Some(nonce) if nonce != self.nonce.as_slice() => {
                Err(Error::Revocation("OCSP response nonce does not match the request".to_string()))
            },
            _ => Ok(()),
        }
    }
}

/// OCSPResponseStatus.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[repr(u32)]
pub enum OcspResponseStatus {
    /// Response has valid confirmations
    Successful = 0,
    /// Illegal confirmation request
    MalformedRequest = 1,
    /// Internal error in issuer
    InternalError = 2,
    /// Try again later
    TryLater = 3,
    /// Must sign the request
    SigRequired = 5,
    /// Request unauthorized
    Unauthorized = 6,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct ResponseBytes {
    response_type: ObjectIdentifier,
    response: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct OcspResponseDer {
    response_status: OcspResponseStatus,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    response_bytes: Option<ResponseBytes>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct BasicOcspResponse {
    tbs_response_data: Any,
    signature_algorithm: AlgorithmIdentifierOwned,
    signature: BitString,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    certs: Option<Vec<Any>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct ResponseData {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    version: Option<u8>,
    responder_id: Any,
    produced_at: GeneralizedTime,
    responses: Vec<SingleResponseDer>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    response_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct SingleResponseDer {
    cert_id: CertId,
    cert_status: Any,
    this_update: GeneralizedTime,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    next_update: Option<GeneralizedTime>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    single_extensions: Option<Extensions>,
}

/// Status of one certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    /// Not revoked
    Good,
    /// Revoked at the given time
    Revoked(DateTime<Utc>),
    /// Responder does not know the certificate
    Unknown,
}

impl CertStatus {
    fn from_any(any: &Any) -> Result<Self> {
        let Tag::ContextSpecific { number, .. } = any.tag() else {
            return Err(Error::Revocation(format!("unexpected CertStatus tag {}", any.tag())));
        };
        match number.value() {
            0 => Ok(CertStatus::Good),
            1 => {
                let mut reader = SliceReader::new(any.value())?;
                let time = GeneralizedTime::decode(&mut reader)?;
                Ok(CertStatus::Revoked(generalized_time(&time)))
            },
            2 => Ok(CertStatus::Unknown),
            n => Err(Error::Revocation(format!("unexpected CertStatus [{}]", n))),
        }
    }
}

/// One entry of a response.
#[derive(Debug, Clone)]
pub struct SingleResponse {
    /// Certificate designation
    pub cert_id: CertId,
    /// Status
    pub status: CertStatus,
    /// Time the status was known correct
    pub this_update: DateTime<Utc>,
    /// Time newer information will be available
    pub next_update: Option<DateTime<Utc>>,
}

/// How the response names its signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// DER Name of the responder
    ByName(Vec<u8>),
    /// SHA-1 of the responder public key bits
    ByKey(Vec<u8>),
}

/// A parsed, successful OCSP response.
#[derive(Debug, Clone)]
pub struct OcspResponse {
    der: Vec<u8>,
    tbs_der: Vec<u8>,
    signature_algorithm: AlgorithmIdentifierOwned,
    signature: Vec<u8>,
    responder_id: ResponderId,
    produced_at: DateTime<Utc>,
    responses: Vec<SingleResponse>,
    nonce: Option<Vec<u8>>,
    certificates: Vec<Vec<u8>>,
}

impl OcspResponse {
    /// Parse a DER `OCSPResponse`. Non-successful statuses are errors.
    pub fn parse(der: &[u8]) -> Result<Self> {
        let outer = OcspResponseDer::from_der(der)?;
        if outer.response_status != OcspResponseStatus::Successful {
            return Err(Error::Revocation(format!(
                "OCSP responder returned {:?}",
                outer.response_status
            )));
        }
        let bytes = outer
            .response_bytes
            .ok_or_else(|| Error::Revocation("successful OCSP response without body".to_string()))?;
        if bytes.response_type != oids::OCSP_BASIC {
            return Err(Error::Revocation(format!(
                "unsupported OCSP response type {}",
                bytes.response_type
            )));
        }
        let basic = BasicOcspResponse::from_der(bytes.response.as_bytes())?;
        let tbs_der = basic.tbs_response_data.to_der()?;
        let data = ResponseData::from_der(&tbs_der)?;

        let responder_id = match data.responder_id.tag() {
            Tag::ContextSpecific { number, .. } if number.value() == 1 => {
                ResponderId::ByName(data.responder_id.value().to_vec())
            },
            Tag::ContextSpecific { number, .. } if number.value() == 2 => {
                let key_hash = OctetString::from_der(data.responder_id.value())?;
                ResponderId::ByKey(key_hash.into_bytes())
            },
            other => return Err(Error::Revocation(format!("unexpected ResponderID tag {}", other))),
        };

        let nonce = match &data.response_extensions {
            Some(exts) => exts
                .iter()
                .find(|e| e.extn_id == oids::OCSP_NONCE)
                .map(|e| {
                    OctetString::from_der(e.extn_value.as_bytes())
                        .map(OctetString::into_bytes)
                        .unwrap_or_else(|_| e.extn_value.as_bytes().to_vec())
                }),
            None => None,
        };

        let responses = data
            .responses
            .iter()
            .map(|r| {
                Ok(SingleResponse {
                    cert_id: r.cert_id.clone(),
                    status: CertStatus::from_any(&r.cert_status)?,
                    this_update: generalized_time(&r.this_update),
                    next_update: r.next_update.as_ref().map(generalized_time),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let certificates = basic
            .certs
            .unwrap_or_default()
            .iter()
            .map(|c| c.to_der().map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            der: der.to_vec(),
            tbs_der,
            signature_algorithm: basic.signature_algorithm,
            signature: basic.signature.raw_bytes().to_vec(),
            responder_id,
            produced_at: generalized_time(&data.produced_at),
            responses,
            nonce,
            certificates,
        })
    }

    /// Full response DER, as embedded in a DSS.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// `producedAt`.
    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    /// Responder designation.
    pub fn responder_id(&self) -> &ResponderId {
        &self.responder_id
    }

    /// All single responses.
    pub fn responses(&self) -> &[SingleResponse] {
        &self.responses
    }

    /// Nonce echoed by the responder.
    pub fn nonce(&self) -> Option<&[u8]> {
        self.nonce.as_deref()
    }

    /// DER certificates included by the responder.
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    /// Status of `certificate`, if the response covers it.
    pub fn status_for(
        &self,
        provider: &dyn CryptoProvider,
        certificate: &CertificateInfo,
        issuer: &CertificateInfo,
    ) -> Result<Option<CertStatus>> {
        for single in &self.responses {
            if single.cert_id.matches(provider, certificate, issuer)? {
                return Ok(Some(single.status));
            }
        }
        Ok(None)
    }

    fn names(&self, provider: &dyn CryptoProvider, candidate: &CertificateInfo) -> Result<bool> {
        Ok(match &self.responder_id {
            ResponderId::ByName(name) => name.as_slice() == candidate.subject_raw(),
            ResponderId::ByKey(hash) => {
                hash.as_slice() == provider.digest(DigestAlgorithm::Sha1, candidate.public_key_bits())?.as_slice()
            },
        })
    }

    /// Check the response signature. The signer must be `issuer` itself or
    /// a certificate in the response issued by `issuer`. Returns the signer.
    pub fn verify(&self, provider: &dyn CryptoProvider, issuer: &CertificateInfo) -> Result<CertificateInfo> {
        let (algorithm, digest, pss) = parse_outer_signature_algorithm(&self.signature_algorithm)?;
        let mut candidates = vec![issuer.clone()];
        for der in &self.certificates {
            match CertificateInfo::parse(der) {
                Ok(cert) if cert.is_issued_by(issuer) => candidates.push(cert),
                Ok(_) => {},
                Err(e) => log::debug!("Skipping unparsable OCSP responder certificate: {}", e),
            }
        }
        for candidate in candidates {
            if !self.names(provider, &candidate)? {
                continue;
            }
            if provider.verify(
                candidate.public_key_info(),
                algorithm,
                digest,
                pss.as_ref(),
                &self.tbs_der,
                &self.signature,
            )? {
                return Ok(candidate);
            }
        }
        Err(Error::Revocation(format!(
            "OCSP response for issuer {} is not signed by an authorized responder",
            issuer.subject()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::provider::RustCryptoProvider;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    fn cert(name: &str) -> CertificateInfo {
        CertificateInfo::parse(&fixture(name)).unwrap()
    }

    #[test]
    fn test_good_response() {
        let provider = RustCryptoProvider;
        let response = OcspResponse::parse(&fixture("signer-rsa.ocsp")).unwrap();
        let signer = cert("signer-rsa.cer");
        let root = cert("root.cer");
        assert_eq!(response.status_for(&provider, &signer, &root).unwrap(), Some(CertStatus::Good));
        assert_eq!(response.verify(&provider, &root).unwrap(), root);
        assert!(matches!(response.responder_id(), ResponderId::ByName(_)));
    }

    #[test]
    fn test_revoked_response() {
        let provider = RustCryptoProvider;
        let response = OcspResponse::parse(&fixture("revoked.ocsp")).unwrap();
        let revoked = cert("revoked.cer");
        let root = cert("root.cer");
        assert!(matches!(
            response.status_for(&provider, &revoked, &root).unwrap(),
            Some(CertStatus::Revoked(_))
        ));
    }

    #[test]
    fn test_response_for_other_certificate() {
        let provider = RustCryptoProvider;
        let response = OcspResponse::parse(&fixture("signer-rsa.ocsp")).unwrap();
        let other = cert("signer-p256.cer");
        let root = cert("root.cer");
        assert_eq!(response.status_for(&provider, &other, &root).unwrap(), None);
    }

    #[test]
    fn test_wrong_issuer_fails_verification() {
        let provider = RustCryptoProvider;
        let response = OcspResponse::parse(&fixture("signer-rsa.ocsp")).unwrap();
        let not_issuer = cert("tsa.cer");
        assert!(matches!(response.verify(&provider, &not_issuer), Err(Error::Revocation(_))));
    }

    #[test]
    fn test_request_carries_sha1_cert_id() {
        let provider = RustCryptoProvider;
        let signer = cert("signer-rsa.cer");
        let root = cert("root.cer");
        let request = OcspRequest::new(&provider, &signer, &root).unwrap();
        let decoded = OcspRequestDer::from_der(request.to_der()).unwrap();
        let cert_id = &decoded.tbs_request.request_list[0].req_cert;
        assert_eq!(cert_id.hash_algorithm.oid, oids::SHA1);
        assert!(cert_id.matches(&provider, &signer, &root).unwrap());
        assert_eq!(request.nonce().len(), 16);
    }

    #[test]
    fn test_unsuccessful_status_is_error() {
        let der = OcspResponseDer {
            response_status: OcspResponseStatus::TryLater,
            response_bytes: None,
        }
        .to_der()
        .unwrap();
        assert!(matches!(OcspResponse::parse(&der), Err(Error::Revocation(_))));
    }
}
