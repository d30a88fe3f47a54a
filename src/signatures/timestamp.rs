//! RFC 3161 timestamping.
//!
//! Request/response/TSTInfo structures, the [`TsaClient`] seam, and checks
//! applied to every returned token: status granted, message imprint equal
//! to what was sent, nonce echoed.

use chrono::{DateTime, TimeZone, Utc};
use der::asn1::{Any, BitString, GeneralizedTime, Int, ObjectIdentifier, OctetString};
use der::{Decode, Encode, Sequence};
use rand::RngCore;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::Extensions;

use super::algorithms::{digest_algorithm_identifier, oids};
use super::container::{trim_der, CmsContainer};
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};

/// Default reservation for a token when the client gives no estimate.
pub const DEFAULT_TOKEN_SIZE_ESTIMATE: usize = 4096;

/// ```text
/// MessageImprint ::= SEQUENCE { hashAlgorithm AlgorithmIdentifier, hashedMessage OCTET STRING }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct MessageImprint {
    /// Hash algorithm
    pub hash_algorithm: AlgorithmIdentifierOwned,
    /// Hash value
    pub hashed_message: OctetString,
}

/// TimeStampReq.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampReq {
    /// Always 1
    pub version: u8,
    /// What to timestamp
    pub message_imprint: MessageImprint,
    /// Requested policy
    pub req_policy: Option<ObjectIdentifier>,
    /// Anti-replay nonce
    pub nonce: Option<Int>,
    /// Ask for the TSA certificate in the token; `None` encodes the FALSE default
    pub cert_req: Option<bool>,
    /// Extensions
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Extensions>,
}

/// PKIStatusInfo.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiStatusInfo {
    /// 0 granted, 1 granted with modifications, others are failures
    pub status: u8,
    /// Free text
    pub status_string: Option<Vec<String>>,
    /// Failure bits
    pub fail_info: Option<BitString>,
}

/// TimeStampResp.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampResp {
    /// Status
    pub status: PkiStatusInfo,
    /// ContentInfo of the token
    pub time_stamp_token: Option<Any>,
}

/// Accuracy of `genTime`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Accuracy {
    /// Seconds
    pub seconds: Option<u64>,
    /// Milliseconds
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub millis: Option<u16>,
    /// Microseconds
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub micros: Option<u16>,
}

/// TSTInfo, the encapsulated content of a token.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TstInfo {
    /// Always 1
    pub version: u8,
    /// TSA policy
    pub policy: ObjectIdentifier,
    /// Imprint copied from the request
    pub message_imprint: MessageImprint,
    /// Unique per token
    pub serial_number: Int,
    /// Time of stamping
    pub gen_time: GeneralizedTime,
    /// Accuracy
    pub accuracy: Option<Accuracy>,
    /// `None` encodes the FALSE default
    pub ordering: Option<bool>,
    /// Nonce copied from the request
    pub nonce: Option<Int>,
    /// TSA name
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub tsa: Option<GeneralName>,
    /// Extensions
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Extensions>,
}

impl TstInfo {
    /// TSTInfo for `imprint`, stamped at `time`.
    pub fn new(
        policy: ObjectIdentifier,
        digest: DigestAlgorithm,
        imprint: &[u8],
        serial: u64,
        time: DateTime<Utc>,
        nonce: Option<Int>,
    ) -> Result<Self> {
        let secs = u64::try_from(time.timestamp())
            .map_err(|_| Error::Timestamp(format!("time {} predates 1970", time)))?;
        let gen_time = GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(secs))?;
        let serial = serial.to_be_bytes();
        let first = serial.iter().position(|b| *b != 0).unwrap_or(serial.len() - 1);
        let mut serial_bytes = serial[first..].to_vec();
        if serial_bytes[0] & 0x80 != 0 {
            serial_bytes.insert(0, 0);
        }
        Ok(Self {
            version: 1,
            policy,
            message_imprint: MessageImprint {
                hash_algorithm: digest_algorithm_identifier(digest),
                hashed_message: OctetString::new(imprint.to_vec())?,
            },
            serial_number: Int::new(&serial_bytes)?,
            gen_time,
            accuracy: None,
            ordering: None,
            nonce,
            tsa: None,
            extensions: None,
        })
    }

    /// `genTime` as a chrono timestamp.
    pub fn time(&self) -> DateTime<Utc> {
        let secs = self.gen_time.to_unix_duration().as_secs();
        Utc.timestamp_opt(secs as i64, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A request ready to send, remembering its nonce.
#[derive(Debug, Clone)]
pub struct TimestampRequest {
    digest: DigestAlgorithm,
    imprint: Vec<u8>,
    nonce: Vec<u8>,
    der: Vec<u8>,
}

impl TimestampRequest {
    /// Request for `imprint` with a random nonce and `certReq` set.
    pub fn new(digest: DigestAlgorithm, imprint: &[u8]) -> Result<Self> {
        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);
        nonce[0] = (nonce[0] & 0x7F) | 0x01;
        let req = TimeStampReq {
            version: 1,
            message_imprint: MessageImprint {
                hash_algorithm: digest_algorithm_identifier(digest),
                hashed_message: OctetString::new(imprint.to_vec())?,
            },
            req_policy: None,
            nonce: Some(Int::new(&nonce)?),
            cert_req: Some(true),
            extensions: None,
        };
        Ok(Self {
            digest,
            imprint: imprint.to_vec(),
            nonce: nonce.to_vec(),
            der: req.to_der()?,
        })
    }

    /// DER to POST as `application/timestamp-query`.
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// Extract and check the token from a `TimeStampResp`.
    pub fn parse_response(&self, response_der: &[u8]) -> Result<Vec<u8>> {
        let resp = TimeStampResp::from_der(response_der)?;
        if resp.status.status > 1 {
            let text = resp.status.status_string.unwrap_or_default().join("; ");
            return Err(Error::Timestamp(format!(
                "TSA refused request (status {}): {}",
                resp.status.status, text
            )));
        }
        let token = resp
            .time_stamp_token
            .ok_or_else(|| Error::Timestamp("granted response carries no token".to_string()))?
            .to_der()?;
        let parsed = TimestampToken::parse(&token)?;
        parsed.check_imprint(self.digest, &self.imprint)?;
        match &parsed.info.nonce {
            Some(nonce) if nonce.as_bytes() == self.nonce.as_slice() => {},
            Some(_) => return Err(Error::Timestamp("nonce mismatch".to_string())),
            None => return Err(Error::Timestamp("response omits the nonce".to_string())),
        }
        Ok(token)
    }
}

/// Build a `TimeStampResp` around a granted token.
pub fn granted_response(token_der: &[u8]) -> Result<Vec<u8>> {
    let resp = TimeStampResp {
        status: PkiStatusInfo {
            status: 0,
            status_string: None,
            fail_info: None,
        },
        time_stamp_token: Some(Any::from_der(token_der)?),
    };
    Ok(resp.to_der()?)
}

/// Decode the nonce of a `TimeStampReq`, for TSA implementations.
pub fn parse_request(request_der: &[u8]) -> Result<TimeStampReq> {
    Ok(TimeStampReq::from_der(request_der)?)
}

/// A parsed timestamp token.
#[derive(Debug, Clone)]
pub struct TimestampToken {
    der: Vec<u8>,
    container: CmsContainer,
    info: TstInfo,
}

impl TimestampToken {
    /// Parse a token (a SignedData ContentInfo over a TSTInfo).
    pub fn parse(der: &[u8]) -> Result<Self> {
        let der = trim_der(der)?;
        let container = CmsContainer::from_der(der)?;
        let (content_type, content) = container
            .encapsulated_content()
            .ok_or_else(|| Error::Timestamp("token has no encapsulated TSTInfo".to_string()))?;
        if *content_type != oids::TST_INFO {
            return Err(Error::Timestamp(format!("token content type {} is not TSTInfo", content_type)));
        }
        let info = TstInfo::from_der(content)?;
        Ok(Self {
            der: der.to_vec(),
            container,
            info,
        })
    }

    /// Token DER.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The SignedData carrying the TSTInfo.
    pub fn container(&self) -> &CmsContainer {
        &self.container
    }

    /// Decoded TSTInfo.
    pub fn info(&self) -> &TstInfo {
        &self.info
    }

    /// Time of stamping.
    pub fn time(&self) -> DateTime<Utc> {
        self.info.time()
    }

    /// Digest algorithm and value of the imprint.
    pub fn imprint(&self) -> Result<(DigestAlgorithm, &[u8])> {
        let oid = &self.info.message_imprint.hash_algorithm.oid;
        let digest = DigestAlgorithm::from_oid(oid)
            .ok_or_else(|| Error::Timestamp(format!("unknown imprint algorithm {}", oid)))?;
        Ok((digest, self.info.message_imprint.hashed_message.as_bytes()))
    }

    /// Fail unless the token stamps `imprint` under `digest`.
    pub fn check_imprint(&self, digest: DigestAlgorithm, imprint: &[u8]) -> Result<()> {
        let (token_digest, token_imprint) = self.imprint()?;
        if token_digest != digest || token_imprint != imprint {
            return Err(Error::Timestamp(format!(
                "token imprint {}:{} does not match {}:{}",
                token_digest,
                hex::encode(token_imprint),
                digest,
                hex::encode(imprint)
            )));
        }
        Ok(())
    }

    /// DER certificates carried in the token.
    pub fn certificates(&self) -> Result<Vec<Vec<u8>>> {
        self.container
            .certificates()
            .iter()
            .map(|c| c.to_der().map_err(Error::from))
            .collect()
    }
}

/// A time-stamping authority.
pub trait TsaClient: Send + Sync {
    /// Digest used for message imprints.
    fn digest_algorithm(&self) -> DigestAlgorithm;

    /// Bytes to reserve for one token.
    fn token_size_estimate(&self) -> usize {
        DEFAULT_TOKEN_SIZE_ESTIMATE
    }

    /// Obtain a token (DER ContentInfo) stamping `imprint`.
    fn timestamp(&self, imprint: &[u8]) -> Result<Vec<u8>>;
}
