//! CMS SignedData containers.
//!
//! A [`CmsContainer`] is the editable form of a detached (or, for
//! timestamp tokens, encapsulated) SignedData with a single signer. It
//! serializes at any stage: before completion the signature value is
//! empty, which is how placeholders are sized and how phase 1 hands the
//! container across the two-phase boundary.

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec};
use der::{Decode, Encode, Header, SliceReader};
use x509_cert::attr::Attribute;

use super::algorithms::{self, check_pairing, digest_algorithm_identifier, oids, signature_algorithm_identifier};
use super::attributes;
use super::identity::SignerIdentity;
use super::provider::{CryptoProvider, ExternalSigner};
use super::types::{DigestAlgorithm, PssParameters, SignatureAlgorithm, SignatureStandard};
use crate::error::{Error, Result};

/// Length of the leading DER element of `bytes`; trailing bytes (placeholder
/// zero padding) are ignored.
pub fn der_element_len(bytes: &[u8]) -> Result<usize> {
    let mut reader = SliceReader::new(bytes)?;
    let header = Header::decode(&mut reader)?;
    let total = (header.encoded_len()? + header.length)?;
    Ok(usize::try_from(total)?)
}

/// Strip placeholder padding after the leading DER element.
pub fn trim_der(bytes: &[u8]) -> Result<&[u8]> {
    let len = der_element_len(bytes)?;
    bytes
        .get(..len)
        .ok_or_else(|| Error::Decode(format!("DER element of {} bytes truncated to {}", len, bytes.len())))
}

/// SignedData with one signer, in editable form.
#[derive(Debug, Clone, PartialEq)]
pub struct CmsContainer {
    digest_algorithm: DigestAlgorithm,
    signature_algorithm: SignatureAlgorithm,
    pss: Option<PssParameters>,
    signer: IssuerAndSerialNumber,
    certificates: Vec<x509_cert::Certificate>,
    signed_attributes: SetOfVec<Attribute>,
    signature: Option<Vec<u8>>,
    unsigned_attributes: Vec<Attribute>,
    encapsulated: Option<(ObjectIdentifier, Vec<u8>)>,
}

impl CmsContainer {
    /// Digest algorithm fixed at creation.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Signature mechanism.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    /// PSS parameters, once known.
    pub fn pss_parameters(&self) -> Option<&PssParameters> {
        self.pss.as_ref()
    }

    /// Signature value, `None` until completed.
    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    /// Whether a signature value is present.
    pub fn is_complete(&self) -> bool {
        self.signature.is_some()
    }

    /// Embedded certificates.
    pub fn certificates(&self) -> &[x509_cert::Certificate] {
        &self.certificates
    }

    /// Encapsulated content type and bytes, for attached containers.
    pub fn encapsulated_content(&self) -> Option<(&ObjectIdentifier, &[u8])> {
        self.encapsulated.as_ref().map(|(oid, data)| (oid, data.as_slice()))
    }

    /// Signed attributes.
    pub fn signed_attributes(&self) -> &[Attribute] {
        self.signed_attributes.as_slice()
    }

    /// Unsigned attributes.
    pub fn unsigned_attributes(&self) -> &[Attribute] {
        &self.unsigned_attributes
    }

    /// The bytes the signer signs: DER of the signed attributes as a SET.
    pub fn data_to_be_signed(&self) -> Result<Vec<u8>> {
        attributes::signed_attributes_der(&self.signed_attributes)
    }

    /// message-digest signed attribute.
    pub fn message_digest(&self) -> Result<Vec<u8>> {
        let value = attributes::find(self.signed_attributes.as_slice(), &oids::MESSAGE_DIGEST)
            .ok_or_else(|| Error::Decode("container has no message-digest attribute".to_string()))?;
        attributes::decode_message_digest(value)
    }

    /// The certificate named by the signer identifier.
    pub fn signer_certificate(&self) -> Option<&x509_cert::Certificate> {
        self.certificates.iter().find(|c| {
            c.tbs_certificate.issuer == self.signer.issuer
                && c.tbs_certificate.serial_number == self.signer.serial_number
        })
    }

    /// Append an RFC 3161 token as the signature-time-stamp unsigned attribute.
    /// Signed bytes are untouched.
    pub fn add_timestamp_token(&mut self, token_der: &[u8]) -> Result<()> {
        if self.signature.is_none() {
            return Err(Error::NoSignatureToExtend);
        }
        self.unsigned_attributes.push(attributes::signature_timestamp_token(token_der)?);
        Ok(())
    }

    /// DER of each signature-time-stamp token.
    pub fn timestamp_tokens(&self) -> Result<Vec<Vec<u8>>> {
        self.unsigned_attributes
            .iter()
            .filter(|a| a.oid == oids::SIGNATURE_TIMESTAMP_TOKEN)
            .flat_map(|a| a.values.iter())
            .map(|v| v.to_der().map_err(Error::from))
            .collect()
    }

    fn signed_data(&self) -> Result<SignedData> {
        let signature_algorithm =
            signature_algorithm_identifier_lenient(self.signature_algorithm, self.digest_algorithm, self.pss.as_ref())?;
        let unsigned = if self.unsigned_attributes.is_empty() {
            None
        } else {
            Some(SetOfVec::try_from(self.unsigned_attributes.clone())?)
        };
        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(self.signer.clone()),
            digest_alg: digest_algorithm_identifier(self.digest_algorithm),
            signed_attrs: Some(self.signed_attributes.clone()),
            signature_algorithm,
            signature: OctetString::new(self.signature.clone().unwrap_or_default())?,
            unsigned_attrs: unsigned,
        };

        let certificates = self
            .certificates
            .iter()
            .cloned()
            .map(CertificateChoices::Certificate)
            .collect::<Vec<_>>();
        let (version, encap_content_info) = match &self.encapsulated {
            Some((oid, data)) => (
                CmsVersion::V3,
                EncapsulatedContentInfo {
                    econtent_type: *oid,
                    econtent: Some(Any::encode_from(&OctetString::new(data.clone())?)?),
                },
            ),
            None => (
                CmsVersion::V1,
                EncapsulatedContentInfo {
                    econtent_type: oids::ID_DATA,
                    econtent: None,
                },
            ),
        };
        Ok(SignedData {
            version,
            digest_algorithms: SetOfVec::try_from(vec![digest_algorithm_identifier(self.digest_algorithm)])?,
            encap_content_info,
            certificates: Some(CertificateSet(SetOfVec::try_from(certificates)?)),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
        })
    }

    /// ContentInfo DER. Works for incomplete containers too.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let content_info = ContentInfo {
            content_type: oids::ID_SIGNED_DATA,
            content: Any::encode_from(&self.signed_data()?)?,
        };
        Ok(content_info.to_der()?)
    }

    /// Parse a ContentInfo, tolerating placeholder padding after it.
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        let content_info = ContentInfo::from_der(trim_der(bytes)?)?;
        if content_info.content_type != oids::ID_SIGNED_DATA {
            return Err(Error::Decode(format!(
                "ContentInfo holds {}, expected signedData",
                content_info.content_type
            )));
        }
        let signed_data: SignedData = content_info.content.decode_as()?;
        let signer_info = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Decode("SignedData has no SignerInfo".to_string()))?;

        let SignerIdentifier::IssuerAndSerialNumber(signer) = &signer_info.sid else {
            return Err(Error::Unsupported("SubjectKeyIdentifier signer identifiers".to_string()));
        };
        let digest_algorithm = DigestAlgorithm::from_oid(&signer_info.digest_alg.oid).ok_or_else(|| {
            Error::UnsupportedAlgorithm(format!("digest algorithm {}", signer_info.digest_alg.oid))
        })?;
        let (signature_algorithm, pss) = algorithms::parse_signature_algorithm(&signer_info.signature_algorithm)
            .or_else(|e| match signer_info.signature_algorithm.oid {
                oid if oid == oids::RSASSA_PSS => Ok((SignatureAlgorithm::RsaPss, None)),
                _ => Err(e),
            })?;

        let certificates = signed_data
            .certificates
            .as_ref()
            .map(|set| {
                set.0
                    .iter()
                    .filter_map(|choice| match choice {
                        CertificateChoices::Certificate(cert) => Some(cert.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let encapsulated = match &signed_data.encap_content_info.econtent {
            Some(any) => {
                let octets: OctetString = any.decode_as()?;
                Some((signed_data.encap_content_info.econtent_type, octets.into_bytes()))
            },
            None => None,
        };
        let signature = signer_info.signature.as_bytes();

        Ok(Self {
            digest_algorithm,
            signature_algorithm,
            pss,
            signer: signer.clone(),
            certificates,
            signed_attributes: signer_info.signed_attrs.clone().unwrap_or_else(SetOfVec::new),
            signature: (!signature.is_empty()).then(|| signature.to_vec()),
            unsigned_attributes: signer_info
                .unsigned_attrs
                .as_ref()
                .map(|attrs| attrs.as_slice().to_vec())
                .unwrap_or_default(),
            encapsulated,
        })
    }

    /// Check the signature value over the signed attributes with the signer
    /// certificate's key.
    pub fn verify_signature(&self, provider: &dyn CryptoProvider) -> Result<bool> {
        let Some(signature) = &self.signature else {
            return Ok(false);
        };
        let cert = self
            .signer_certificate()
            .ok_or_else(|| Error::Certificate("signer certificate not embedded".to_string()))?;
        let spki = cert.tbs_certificate.subject_public_key_info.to_der()?;
        provider.verify(
            &spki,
            self.signature_algorithm,
            self.digest_algorithm,
            self.pss.as_ref(),
            &self.data_to_be_signed()?,
            signature,
        )
    }
}

/// PSS containers begun without parameters still serialize; the identifier
/// is completed when the parameters arrive.
fn signature_algorithm_identifier_lenient(
    signature: SignatureAlgorithm,
    digest: DigestAlgorithm,
    pss: Option<&PssParameters>,
) -> Result<spki::AlgorithmIdentifierOwned> {
    if signature == SignatureAlgorithm::RsaPss && pss.is_none() {
        return Ok(spki::AlgorithmIdentifierOwned {
            oid: oids::RSASSA_PSS,
            parameters: None,
        });
    }
    signature_algorithm_identifier(signature, digest, pss)
}

/// Builds and completes [`CmsContainer`]s.
pub struct SignatureContainerBuilder {
    provider: Arc<dyn CryptoProvider>,
    signing_time: Option<DateTime<Utc>>,
    signature_algorithm: Option<SignatureAlgorithm>,
    pss: Option<PssParameters>,
    revocation_archival: Option<(Vec<Vec<u8>>, Vec<Vec<u8>>)>,
}

/// Conservative upper bound on signature value lengths, by key.
fn signature_len_bounds(identity: &SignerIdentity, algorithm: SignatureAlgorithm) -> (usize, usize) {
    match algorithm {
        SignatureAlgorithm::RsaPkcs1 | SignatureAlgorithm::RsaPss => {
            use rsa::traits::PublicKeyParts;
            use spki::DecodePublicKey;
            match rsa::RsaPublicKey::from_public_key_der(identity.certificate().public_key_info()) {
                Ok(key) => (key.size(), key.size()),
                Err(_) => (0, 1024),
            }
        },
        SignatureAlgorithm::Ecdsa => {
            use spki::DecodePublicKey;
            if p256::ecdsa::VerifyingKey::from_public_key_der(identity.certificate().public_key_info()).is_ok() {
                (8, 72)
            } else {
                (8, 139)
            }
        },
        SignatureAlgorithm::Ed25519 => (64, 64),
        SignatureAlgorithm::Ed448 => (114, 114),
    }
}

/// Lower bound and working estimate of a serialized container, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimate {
    /// No container for these inputs can be smaller
    pub lower_bound: usize,
    /// Recommended reservation
    pub estimate: usize,
}

impl SignatureContainerBuilder {
    /// Builder signing through `provider`.
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            provider,
            signing_time: None,
            signature_algorithm: None,
            pss: None,
            revocation_archival: None,
        }
    }

    /// Fix the signing-time attribute value (CMS standard).
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// Sign with a specific mechanism instead of the key's default.
    pub fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = Some(algorithm);
        self
    }

    /// RSASSA-PSS parameters known up front.
    pub fn with_pss_parameters(mut self, params: PssParameters) -> Self {
        self.pss = Some(params);
        self
    }

    /// Embed revocation data as `adbe-revocationInfoArchival` (CMS standard).
    pub fn with_revocation_archival(mut self, crls: Vec<Vec<u8>>, ocsps: Vec<Vec<u8>>) -> Self {
        self.revocation_archival = Some((crls, ocsps));
        self
    }

    /// Provider used for hashing and signing.
    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    fn resolve_algorithm(&self, identity: &SignerIdentity, digest: DigestAlgorithm) -> Result<SignatureAlgorithm> {
        let algorithm = identity.signature_algorithm(self.signature_algorithm)?;
        check_pairing(algorithm, digest)?;
        if let Some(pss) = &self.pss {
            if algorithm == SignatureAlgorithm::RsaPss {
                algorithms::check_pss(digest, pss)?;
            }
        }
        Ok(algorithm)
    }

    /// Validate pairing, hash `content` and build an incomplete container.
    pub fn begin(
        &self,
        identity: &SignerIdentity,
        digest: DigestAlgorithm,
        standard: SignatureStandard,
        content: &mut dyn Read,
    ) -> Result<CmsContainer> {
        self.resolve_algorithm(identity, digest)?;
        let document_digest = self.provider.digest_reader(digest, content)?;
        log::debug!("computed {} document digest {}", digest, hex::encode(&document_digest));
        self.begin_with_digest(identity, digest, standard, &document_digest)
    }

    /// [`Self::begin`] for an already computed document digest.
    pub fn begin_with_digest(
        &self,
        identity: &SignerIdentity,
        digest: DigestAlgorithm,
        standard: SignatureStandard,
        document_digest: &[u8],
    ) -> Result<CmsContainer> {
        self.build(identity, digest, standard, document_digest, None)
    }

    /// Build an incomplete container carrying `content` (e.g. a TSTInfo).
    pub fn begin_encapsulated(
        &self,
        identity: &SignerIdentity,
        digest: DigestAlgorithm,
        content_type: ObjectIdentifier,
        content: Vec<u8>,
    ) -> Result<CmsContainer> {
        let document_digest = self.provider.digest(digest, &content)?;
        self.build(identity, digest, SignatureStandard::Cades, &document_digest, Some((content_type, content)))
    }

    fn build(
        &self,
        identity: &SignerIdentity,
        digest: DigestAlgorithm,
        standard: SignatureStandard,
        document_digest: &[u8],
        encapsulated: Option<(ObjectIdentifier, Vec<u8>)>,
    ) -> Result<CmsContainer> {
        let signature_algorithm = self.resolve_algorithm(identity, digest)?;
        if document_digest.len() != digest.output_len() {
            return Err(Error::DigestMismatch {
                expected: format!("{} ({} bytes)", digest, digest.output_len()),
                actual: format!("{} bytes", document_digest.len()),
            });
        }

        let signer_cert = identity.certificate().to_x509_cert()?;
        let mut certificates = vec![signer_cert.clone()];
        for cert in identity.chain() {
            certificates.push(cert.to_x509_cert()?);
        }

        let content_type = encapsulated.as_ref().map(|(oid, _)| *oid).unwrap_or(oids::ID_DATA);
        let mut attrs = vec![
            attributes::content_type(content_type)?,
            attributes::message_digest(document_digest)?,
        ];
        match standard {
            SignatureStandard::Cms => {
                let time = self.signing_time.unwrap_or_else(Utc::now);
                attrs.push(attributes::signing_time(time)?);
                if let Some((crls, ocsps)) = &self.revocation_archival {
                    if !crls.is_empty() || !ocsps.is_empty() {
                        attrs.push(attributes::revocation_info_archival(crls, ocsps)?);
                    }
                }
            },
            SignatureStandard::Cades => {
                attrs.push(attributes::signing_certificate_v2(self.provider.as_ref(), &signer_cert, digest)?);
            },
        }

        Ok(CmsContainer {
            digest_algorithm: digest,
            signature_algorithm,
            pss: (signature_algorithm == SignatureAlgorithm::RsaPss).then(|| self.pss.clone()).flatten(),
            signer: IssuerAndSerialNumber {
                issuer: signer_cert.tbs_certificate.issuer.clone(),
                serial_number: signer_cert.tbs_certificate.serial_number.clone(),
            },
            certificates,
            signed_attributes: SetOfVec::try_from(attrs)?,
            signature: None,
            unsigned_attributes: Vec::new(),
            encapsulated,
        })
    }

    /// Embed an externally produced signature value.
    pub fn complete_with_raw_signature(
        &self,
        mut container: CmsContainer,
        raw_signature: Vec<u8>,
        pss: Option<&PssParameters>,
    ) -> Result<CmsContainer> {
        if container.is_complete() {
            return Err(Error::ContainerAlreadyCompleted);
        }
        if container.signature_algorithm == SignatureAlgorithm::RsaPss {
            let params = pss
                .cloned()
                .or_else(|| container.pss.clone())
                .ok_or_else(|| Error::MissingAlgorithmParameters("RSASSA-PSS".to_string()))?;
            algorithms::check_pss(container.digest_algorithm, &params)?;
            container.pss = Some(params);
        }
        container.signature = Some(raw_signature);
        Ok(container)
    }

    /// Sign locally and embed: digest, sign, complete.
    pub fn complete_with_signer(&self, container: CmsContainer, signer: &dyn ExternalSigner) -> Result<CmsContainer> {
        if container.is_complete() {
            return Err(Error::ContainerAlreadyCompleted);
        }
        if signer.signature_algorithm() != container.signature_algorithm {
            return Err(Error::KeyAlgorithmMismatch {
                certificate: container.signature_algorithm.name().to_string(),
                requested: signer.signature_algorithm().name().to_string(),
            });
        }
        let pss = container.pss.clone();
        if container.signature_algorithm == SignatureAlgorithm::RsaPss && pss.is_none() {
            return Err(Error::MissingAlgorithmParameters("RSASSA-PSS".to_string()));
        }
        let raw = signer.sign(&container.data_to_be_signed()?, container.digest_algorithm, pss.as_ref())?;
        self.complete_with_raw_signature(container, raw, pss.as_ref())
    }

    /// Size of the container these inputs produce. `extra` covers unsigned
    /// additions such as a timestamp token.
    pub fn estimate_size(
        &self,
        identity: &SignerIdentity,
        digest: DigestAlgorithm,
        standard: SignatureStandard,
        extra: usize,
    ) -> Result<SizeEstimate> {
        let skeleton = self.begin_with_digest(identity, digest, standard, &vec![0u8; digest.output_len()])?;
        let mut skeleton = skeleton;
        if skeleton.signature_algorithm == SignatureAlgorithm::RsaPss && skeleton.pss.is_none() {
            skeleton.pss = Some(PssParameters::for_digest(digest));
        }
        let base = skeleton.to_der()?.len();
        let (min_sig, max_sig) = signature_len_bounds(identity, skeleton.signature_algorithm);
        let lower_bound = base + min_sig;
        // Length-of-length growth across the nested SEQUENCEs, plus the
        // unsigned-attribute wrapper when `extra` is used.
        let slack = 32 + if extra > 0 { 64 } else { 0 };
        Ok(SizeEstimate {
            lower_bound,
            estimate: base + max_sig + extra + slack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::provider::{default_provider, PrivateKeySigner, SigningCredentials};
    use std::io::Cursor;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    fn rsa_identity() -> SignerIdentity {
        SignerIdentity::new(&fixture("signer-rsa.cer"), &[fixture("root.cer")]).unwrap()
    }

    fn rsa_signer(alg: SignatureAlgorithm) -> PrivateKeySigner {
        PrivateKeySigner::new(
            SigningCredentials::new(fixture("signer-rsa.key.der"), fixture("signer-rsa.cer")),
            alg,
        )
    }

    #[test]
    fn test_begin_complete_verify() {
        let builder = SignatureContainerBuilder::new(default_provider());
        let identity = rsa_identity();
        let container = builder
            .begin(&identity, DigestAlgorithm::Sha256, SignatureStandard::Cades, &mut Cursor::new(b"content"))
            .unwrap();
        assert!(!container.is_complete());
        let expected = default_provider().digest(DigestAlgorithm::Sha256, b"content").unwrap();
        assert_eq!(container.message_digest().unwrap(), expected);

        let signed = builder
            .complete_with_signer(container, &rsa_signer(SignatureAlgorithm::RsaPkcs1))
            .unwrap();
        let reparsed = CmsContainer::from_der(&signed.to_der().unwrap()).unwrap();
        assert_eq!(reparsed.to_der().unwrap(), signed.to_der().unwrap());
        assert_eq!(reparsed.message_digest().unwrap(), expected);
        assert!(reparsed.verify_signature(default_provider().as_ref()).unwrap());
        assert_eq!(reparsed.certificates().len(), 2);
    }

    #[test]
    fn test_double_completion_rejected() {
        let builder = SignatureContainerBuilder::new(default_provider());
        let container = builder
            .begin_with_digest(&rsa_identity(), DigestAlgorithm::Sha256, SignatureStandard::Cades, &[0u8; 32])
            .unwrap();
        let done = builder.complete_with_raw_signature(container, vec![1; 256], None).unwrap();
        assert!(matches!(
            builder.complete_with_raw_signature(done, vec![1; 256], None),
            Err(Error::ContainerAlreadyCompleted)
        ));
    }

    #[test]
    fn test_pss_requires_parameters_at_completion() {
        let builder = SignatureContainerBuilder::new(default_provider()).with_signature_algorithm(SignatureAlgorithm::RsaPss);
        let container = builder
            .begin_with_digest(&rsa_identity(), DigestAlgorithm::Sha256, SignatureStandard::Cades, &[0u8; 32])
            .unwrap();
        assert!(matches!(
            builder.complete_with_raw_signature(container.clone(), vec![0; 256], None),
            Err(Error::MissingAlgorithmParameters(_))
        ));
        let wrong = PssParameters::for_digest(DigestAlgorithm::Sha512);
        assert!(matches!(
            builder.complete_with_raw_signature(container.clone(), vec![0; 256], Some(&wrong)),
            Err(Error::DigestMismatch { .. })
        ));
        let right = PssParameters::for_digest(DigestAlgorithm::Sha256);
        let done = builder.complete_with_raw_signature(container, vec![0; 256], Some(&right)).unwrap();
        assert_eq!(CmsContainer::from_der(&done.to_der().unwrap()).unwrap().pss_parameters(), Some(&right));
    }

    #[test]
    fn test_pairing_checked_before_reading() {
        struct Exploding;
        impl Read for Exploding {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                panic!("content must not be read");
            }
        }
        let identity = SignerIdentity::new(&fixture("signer-ed25519.cer"), &[]).unwrap();
        let builder = SignatureContainerBuilder::new(default_provider());
        let err = builder
            .begin(&identity, DigestAlgorithm::Sha1, SignatureStandard::Cades, &mut Exploding)
            .unwrap_err();
        match err {
            Error::DigestForbidden { required, .. } => assert_eq!(required, "SHA-512"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_is_additive() {
        let builder = SignatureContainerBuilder::new(default_provider());
        let container = builder
            .begin_with_digest(&rsa_identity(), DigestAlgorithm::Sha256, SignatureStandard::Cades, &[7u8; 32])
            .unwrap();
        let mut signed = builder
            .complete_with_signer(container, &rsa_signer(SignatureAlgorithm::RsaPkcs1))
            .unwrap();
        let before = signed.data_to_be_signed().unwrap();
        // Any DER value stands in for a token here
        let token = builder
            .begin_with_digest(&rsa_identity(), DigestAlgorithm::Sha256, SignatureStandard::Cades, &[1u8; 32])
            .unwrap()
            .to_der()
            .unwrap();
        signed.add_timestamp_token(&token).unwrap();
        let reparsed = CmsContainer::from_der(&signed.to_der().unwrap()).unwrap();
        assert_eq!(reparsed.data_to_be_signed().unwrap(), before);
        assert_eq!(reparsed.timestamp_tokens().unwrap(), vec![token]);
        assert!(reparsed.verify_signature(default_provider().as_ref()).unwrap());
    }

    #[test]
    fn test_from_der_ignores_padding() {
        let builder = SignatureContainerBuilder::new(default_provider());
        let container = builder
            .begin_with_digest(&rsa_identity(), DigestAlgorithm::Sha256, SignatureStandard::Cms, &[7u8; 32])
            .unwrap();
        let mut der = container.to_der().unwrap();
        let len = der.len();
        der.extend_from_slice(&[0u8; 100]);
        assert_eq!(der_element_len(&der).unwrap(), len);
        let parsed = CmsContainer::from_der(&der).unwrap();
        assert!(!parsed.is_complete());
    }

    #[test]
    fn test_estimate_bounds_actual_size() {
        let builder = SignatureContainerBuilder::new(default_provider());
        let identity = rsa_identity();
        let estimate = builder
            .estimate_size(&identity, DigestAlgorithm::Sha256, SignatureStandard::Cades, 0)
            .unwrap();
        let container = builder
            .begin_with_digest(&identity, DigestAlgorithm::Sha256, SignatureStandard::Cades, &[0u8; 32])
            .unwrap();
        let signed = builder
            .complete_with_signer(container, &rsa_signer(SignatureAlgorithm::RsaPkcs1))
            .unwrap();
        let actual = signed.to_der().unwrap().len();
        assert!(estimate.lower_bound <= actual);
        assert!(estimate.estimate >= actual);
    }
}
