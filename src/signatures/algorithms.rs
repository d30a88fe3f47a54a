//! Algorithm identifiers and pairing rules.
//!
//! Pairing is checked before any network or crypto work: EdDSA variants
//! mandate their digest, and SHAKE256 is only meaningful with Ed448.

use der::asn1::{Any, ObjectIdentifier};
use der::{Decode, Encode, Sequence, Tag};
use spki::AlgorithmIdentifierOwned;

use super::types::{DigestAlgorithm, PssParameters, SignatureAlgorithm};
use crate::error::{Error, Result};
use crate::object::{Dict, Object};

/// Object identifiers used across the crate.
#[allow(missing_docs)]
pub mod oids {
    use der::asn1::ObjectIdentifier as Oid;

    pub const SHA1: Oid = Oid::new_unwrap("1.3.14.3.2.26");
    pub const SHA256: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.2.1");
    pub const SHA384: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.2.2");
    pub const SHA512: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.2.3");
    pub const SHA3_256: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.2.8");
    pub const SHA3_384: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.2.9");
    pub const SHA3_512: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.2.10");
    pub const SHAKE256: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.2.12");

    pub const RSA_ENCRYPTION: Oid = Oid::new_unwrap("1.2.840.113549.1.1.1");
    pub const SHA1_WITH_RSA: Oid = Oid::new_unwrap("1.2.840.113549.1.1.5");
    pub const MGF1: Oid = Oid::new_unwrap("1.2.840.113549.1.1.8");
    pub const RSASSA_PSS: Oid = Oid::new_unwrap("1.2.840.113549.1.1.10");
    pub const SHA256_WITH_RSA: Oid = Oid::new_unwrap("1.2.840.113549.1.1.11");
    pub const SHA384_WITH_RSA: Oid = Oid::new_unwrap("1.2.840.113549.1.1.12");
    pub const SHA512_WITH_RSA: Oid = Oid::new_unwrap("1.2.840.113549.1.1.13");
    pub const SHA3_256_WITH_RSA: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.3.14");
    pub const SHA3_384_WITH_RSA: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.3.15");
    pub const SHA3_512_WITH_RSA: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.3.16");

    pub const EC_PUBLIC_KEY: Oid = Oid::new_unwrap("1.2.840.10045.2.1");
    pub const ECDSA_WITH_SHA1: Oid = Oid::new_unwrap("1.2.840.10045.4.1");
    pub const ECDSA_WITH_SHA256: Oid = Oid::new_unwrap("1.2.840.10045.4.3.2");
    pub const ECDSA_WITH_SHA384: Oid = Oid::new_unwrap("1.2.840.10045.4.3.3");
    pub const ECDSA_WITH_SHA512: Oid = Oid::new_unwrap("1.2.840.10045.4.3.4");
    pub const ECDSA_WITH_SHA3_256: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.3.10");
    pub const ECDSA_WITH_SHA3_384: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.3.11");
    pub const ECDSA_WITH_SHA3_512: Oid = Oid::new_unwrap("2.16.840.1.101.3.4.3.12");
    pub const SECP256R1: Oid = Oid::new_unwrap("1.2.840.10045.3.1.7");
    pub const SECP384R1: Oid = Oid::new_unwrap("1.3.132.0.34");

    pub const ED25519: Oid = Oid::new_unwrap("1.3.101.112");
    pub const ED448: Oid = Oid::new_unwrap("1.3.101.113");

    pub const ID_DATA: Oid = Oid::new_unwrap("1.2.840.113549.1.7.1");
    pub const ID_SIGNED_DATA: Oid = Oid::new_unwrap("1.2.840.113549.1.7.2");
    pub const CONTENT_TYPE: Oid = Oid::new_unwrap("1.2.840.113549.1.9.3");
    pub const MESSAGE_DIGEST: Oid = Oid::new_unwrap("1.2.840.113549.1.9.4");
    pub const SIGNING_TIME: Oid = Oid::new_unwrap("1.2.840.113549.1.9.5");
    pub const TST_INFO: Oid = Oid::new_unwrap("1.2.840.113549.1.9.16.1.4");
    pub const SIGNATURE_TIMESTAMP_TOKEN: Oid = Oid::new_unwrap("1.2.840.113549.1.9.16.2.14");
    pub const SIGNING_CERTIFICATE_V2: Oid = Oid::new_unwrap("1.2.840.113549.1.9.16.2.47");
    pub const ADBE_REVOCATION_INFO_ARCHIVAL: Oid = Oid::new_unwrap("1.2.840.113583.1.1.8");

    pub const OCSP_BASIC: Oid = Oid::new_unwrap("1.3.6.1.5.5.7.48.1.1");
    pub const OCSP_NONCE: Oid = Oid::new_unwrap("1.3.6.1.5.5.7.48.1.2");
    pub const OCSP_NOCHECK: &str = "1.3.6.1.5.5.7.48.1.5";
    pub const AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";
    pub const AD_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";
    pub const VALASSURED_ST_CERTS: &str = "0.4.0.194121.2.1";
}

/// Reject digests a signature mechanism does not allow.
pub fn check_pairing(signature: SignatureAlgorithm, digest: DigestAlgorithm) -> Result<()> {
    let required = match signature {
        SignatureAlgorithm::Ed25519 => Some(DigestAlgorithm::Sha512),
        SignatureAlgorithm::Ed448 => Some(DigestAlgorithm::Shake256),
        _ => None,
    };
    match required {
        Some(required) if required != digest => Err(Error::DigestForbidden {
            signature_algorithm: signature.name().to_string(),
            digest: digest.name().to_string(),
            required: required.name().to_string(),
        }),
        None if digest == DigestAlgorithm::Shake256 => Err(Error::DigestForbidden {
            signature_algorithm: signature.name().to_string(),
            digest: digest.name().to_string(),
            required: "a fixed-length digest (SHAKE256 is reserved for Ed448)".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Check PSS parameters against the container digest.
pub fn check_pss(digest: DigestAlgorithm, params: &PssParameters) -> Result<()> {
    if params.digest != digest {
        return Err(Error::DigestMismatch {
            expected: digest.name().to_string(),
            actual: params.digest.name().to_string(),
        });
    }
    if params.mgf_digest.is_sha3() != digest.is_sha3() || params.mgf_digest == DigestAlgorithm::Shake256 {
        return Err(Error::UnsupportedAlgorithm(format!(
            "MGF1 with {} for {}",
            params.mgf_digest, digest
        )));
    }
    Ok(())
}

/// Digest AlgorithmIdentifier with absent parameters.
pub fn digest_algorithm_identifier(digest: DigestAlgorithm) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: digest.oid(),
        parameters: None,
    }
}

fn null_parameters() -> Result<Any> {
    Ok(Any::new(Tag::Null, Vec::<u8>::new())?)
}

/// RSASSA-PSS-params (RFC 4055). Absent fields take their ASN.1 defaults.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct RsaPssParams {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    hash_algorithm: Option<AlgorithmIdentifierOwned>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    mask_gen_algorithm: Option<AlgorithmIdentifierOwned>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    salt_length: Option<u32>,
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", optional = "true")]
    trailer_field: Option<u32>,
}

/// Encode RSASSA-PSS parameters as an `Any`.
pub fn encode_pss_parameters(params: &PssParameters) -> Result<Any> {
    let hash = digest_algorithm_identifier(params.digest);
    let mgf_hash = digest_algorithm_identifier(params.mgf_digest);
    let encoded = RsaPssParams {
        hash_algorithm: Some(hash),
        mask_gen_algorithm: Some(AlgorithmIdentifierOwned {
            oid: oids::MGF1,
            parameters: Some(Any::encode_from(&mgf_hash)?),
        }),
        salt_length: Some(params.salt_len as u32),
        trailer_field: None,
    };
    Ok(Any::encode_from(&encoded)?)
}

/// Decode RSASSA-PSS parameters.
pub fn decode_pss_parameters(any: &Any) -> Result<PssParameters> {
    let params: RsaPssParams = any.decode_as()?;
    let digest = match &params.hash_algorithm {
        Some(alg) => DigestAlgorithm::from_oid(&alg.oid)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("PSS hash {}", alg.oid)))?,
        None => DigestAlgorithm::Sha1,
    };
    let mgf_digest = match &params.mask_gen_algorithm {
        Some(mgf) => {
            if mgf.oid != oids::MGF1 {
                return Err(Error::UnsupportedAlgorithm(format!("mask generation {}", mgf.oid)));
            }
            let inner = mgf
                .parameters
                .as_ref()
                .ok_or_else(|| Error::MissingAlgorithmParameters("MGF1".to_string()))?;
            let hash: AlgorithmIdentifierOwned = inner.decode_as()?;
            DigestAlgorithm::from_oid(&hash.oid)
                .ok_or_else(|| Error::UnsupportedAlgorithm(format!("MGF1 hash {}", hash.oid)))?
        },
        None => DigestAlgorithm::Sha1,
    };
    Ok(PssParameters {
        digest,
        mgf_digest,
        salt_len: params.salt_length.unwrap_or(20) as usize,
    })
}

/// SignerInfo signatureAlgorithm for a mechanism/digest pair.
pub fn signature_algorithm_identifier(
    signature: SignatureAlgorithm,
    digest: DigestAlgorithm,
    pss: Option<&PssParameters>,
) -> Result<AlgorithmIdentifierOwned> {
    check_pairing(signature, digest)?;
    let (oid, parameters) = match signature {
        SignatureAlgorithm::RsaPkcs1 => (oids::RSA_ENCRYPTION, Some(null_parameters()?)),
        SignatureAlgorithm::RsaPss => {
            let params = pss.ok_or_else(|| Error::MissingAlgorithmParameters("RSASSA-PSS".to_string()))?;
            check_pss(digest, params)?;
            (oids::RSASSA_PSS, Some(encode_pss_parameters(params)?))
        },
        SignatureAlgorithm::Ecdsa => {
            let oid = match digest {
                DigestAlgorithm::Sha1 => oids::ECDSA_WITH_SHA1,
                DigestAlgorithm::Sha256 => oids::ECDSA_WITH_SHA256,
                DigestAlgorithm::Sha384 => oids::ECDSA_WITH_SHA384,
                DigestAlgorithm::Sha512 => oids::ECDSA_WITH_SHA512,
                DigestAlgorithm::Sha3_256 => oids::ECDSA_WITH_SHA3_256,
                DigestAlgorithm::Sha3_384 => oids::ECDSA_WITH_SHA3_384,
                DigestAlgorithm::Sha3_512 => oids::ECDSA_WITH_SHA3_512,
                DigestAlgorithm::Shake256 => unreachable_pairing(signature, digest)?,
            };
            (oid, None)
        },
        SignatureAlgorithm::Ed25519 => (oids::ED25519, None),
        SignatureAlgorithm::Ed448 => (oids::ED448, None),
    };
    Ok(AlgorithmIdentifierOwned { oid, parameters })
}

fn unreachable_pairing(signature: SignatureAlgorithm, digest: DigestAlgorithm) -> Result<ObjectIdentifier> {
    Err(Error::UnsupportedAlgorithm(format!("{} with {}", signature, digest)))
}

/// Interpret a SignerInfo signatureAlgorithm.
pub fn parse_signature_algorithm(
    id: &AlgorithmIdentifierOwned,
) -> Result<(SignatureAlgorithm, Option<PssParameters>)> {
    let oid = id.oid;
    let rsa = [
        oids::RSA_ENCRYPTION,
        oids::SHA1_WITH_RSA,
        oids::SHA256_WITH_RSA,
        oids::SHA384_WITH_RSA,
        oids::SHA512_WITH_RSA,
        oids::SHA3_256_WITH_RSA,
        oids::SHA3_384_WITH_RSA,
        oids::SHA3_512_WITH_RSA,
    ];
    let ecdsa = [
        oids::ECDSA_WITH_SHA1,
        oids::ECDSA_WITH_SHA256,
        oids::ECDSA_WITH_SHA384,
        oids::ECDSA_WITH_SHA512,
        oids::ECDSA_WITH_SHA3_256,
        oids::ECDSA_WITH_SHA3_384,
        oids::ECDSA_WITH_SHA3_512,
        oids::EC_PUBLIC_KEY,
    ];
    if rsa.contains(&oid) {
        Ok((SignatureAlgorithm::RsaPkcs1, None))
    } else if oid == oids::RSASSA_PSS {
        let params = id
            .parameters
            .as_ref()
            .ok_or_else(|| Error::MissingAlgorithmParameters("RSASSA-PSS".to_string()))?;
        Ok((SignatureAlgorithm::RsaPss, Some(decode_pss_parameters(params)?)))
    } else if ecdsa.contains(&oid) {
        Ok((SignatureAlgorithm::Ecdsa, None))
    } else if oid == oids::ED25519 {
        Ok((SignatureAlgorithm::Ed25519, None))
    } else if oid == oids::ED448 {
        Ok((SignatureAlgorithm::Ed448, None))
    } else {
        Err(Error::UnsupportedAlgorithm(format!("signature algorithm {}", oid)))
    }
}

/// Mechanism and digest of a self-describing signature algorithm, as found
/// on certificates, CRLs and OCSP responses.
pub fn parse_outer_signature_algorithm(
    id: &AlgorithmIdentifierOwned,
) -> Result<(SignatureAlgorithm, DigestAlgorithm, Option<PssParameters>)> {
    let oid = id.oid;
    let digest = if oid == oids::SHA1_WITH_RSA || oid == oids::ECDSA_WITH_SHA1 {
        Some(DigestAlgorithm::Sha1)
    } else if oid == oids::SHA256_WITH_RSA || oid == oids::ECDSA_WITH_SHA256 {
        Some(DigestAlgorithm::Sha256)
    } else if oid == oids::SHA384_WITH_RSA || oid == oids::ECDSA_WITH_SHA384 {
        Some(DigestAlgorithm::Sha384)
    } else if oid == oids::SHA512_WITH_RSA || oid == oids::ECDSA_WITH_SHA512 || oid == oids::ED25519 {
        Some(DigestAlgorithm::Sha512)
    } else if oid == oids::SHA3_256_WITH_RSA || oid == oids::ECDSA_WITH_SHA3_256 {
        Some(DigestAlgorithm::Sha3_256)
    } else if oid == oids::SHA3_384_WITH_RSA || oid == oids::ECDSA_WITH_SHA3_384 {
        Some(DigestAlgorithm::Sha3_384)
    } else if oid == oids::SHA3_512_WITH_RSA || oid == oids::ECDSA_WITH_SHA3_512 {
        Some(DigestAlgorithm::Sha3_512)
    } else if oid == oids::ED448 {
        Some(DigestAlgorithm::Shake256)
    } else {
        None
    };
    let (signature, pss) = parse_signature_algorithm(id)?;
    let digest = match (&pss, digest) {
        (Some(params), _) => params.digest,
        (None, Some(digest)) => digest,
        (None, None) => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "{} does not name a digest",
                oid
            )))
        },
    };
    Ok((signature, digest, pss))
}

/// Key family from a SubjectPublicKeyInfo algorithm OID.
pub fn key_algorithm(oid: &ObjectIdentifier) -> Option<SignatureAlgorithm> {
    if *oid == oids::RSA_ENCRYPTION {
        Some(SignatureAlgorithm::RsaPkcs1)
    } else if *oid == oids::RSASSA_PSS {
        Some(SignatureAlgorithm::RsaPss)
    } else if *oid == oids::EC_PUBLIC_KEY {
        Some(SignatureAlgorithm::Ecdsa)
    } else if *oid == oids::ED25519 {
        Some(SignatureAlgorithm::Ed25519)
    } else if *oid == oids::ED448 {
        Some(SignatureAlgorithm::Ed448)
    } else {
        None
    }
}

/// Re-encode an OID parsed by another ASN.1 library.
pub fn oid_from_str(s: &str) -> Result<ObjectIdentifier> {
    ObjectIdentifier::new(s).map_err(|e| Error::Certificate(format!("invalid OID {}: {}", s, e)))
}

/// Serialize to DER and re-parse, for types that only implement `Encode`.
pub fn reencode<T: Encode, U: for<'a> Decode<'a>>(value: &T) -> Result<U> {
    let der = value.to_der()?;
    Ok(U::from_der(&der)?)
}

/// A developer-extension declaration in the catalog's `/Extensions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeveloperExtension {
    /// Registered prefix (`ESIC`, `ISO_`)
    pub prefix: &'static str,
    /// PDF base version
    pub base_version: &'static str,
    /// Extension level
    pub level: i64,
    /// Reference URL
    pub url: Option<&'static str>,
}

/// PAdES (DSS and document timestamps).
pub const ESIC_LEVEL_5: DeveloperExtension = DeveloperExtension {
    prefix: "ESIC",
    base_version: "1.7",
    level: 5,
    url: None,
};

/// ISO/TS 32001, SHA-3 and SHAKE256.
pub const ISO_32001: DeveloperExtension = DeveloperExtension {
    prefix: "ISO_",
    base_version: "2.0",
    level: 32001,
    url: Some("https://www.iso.org/standard/45874.html"),
};

/// ISO/TS 32002, EdDSA.
pub const ISO_32002: DeveloperExtension = DeveloperExtension {
    prefix: "ISO_",
    base_version: "2.0",
    level: 32002,
    url: Some("https://www.iso.org/standard/45875.html"),
};

/// Extensions implied by an algorithm pair.
pub fn extensions_for(signature: Option<SignatureAlgorithm>, digest: DigestAlgorithm) -> Vec<DeveloperExtension> {
    let mut out = Vec::new();
    if digest.is_sha3() {
        out.push(ISO_32001);
    }
    if signature.map(|s| s.is_eddsa()).unwrap_or(false) {
        out.push(ISO_32002);
    }
    out
}

impl DeveloperExtension {
    fn to_object(self) -> Object {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("DeveloperExtensions"));
        dict.insert("BaseVersion".to_string(), Object::name(self.base_version));
        dict.insert("ExtensionLevel".to_string(), Object::Integer(self.level));
        if let Some(url) = self.url {
            dict.insert("URL".to_string(), Object::String(url.as_bytes().to_vec()));
        }
        if self.prefix == "ISO_" {
            dict.insert("ExtensionRevision".to_string(), Object::String(b":2022".to_vec()));
        }
        Object::Dictionary(dict)
    }
}

fn extension_level(obj: &Object) -> Option<i64> {
    obj.as_dict()?.get("ExtensionLevel")?.as_integer()
}

/// Union `new` into an existing `/Extensions` dictionary. Returns `None`
/// when every declaration is already present.
pub fn merge_extensions(existing: Option<&Dict>, new: &[DeveloperExtension]) -> Option<Dict> {
    let mut merged = existing.cloned().unwrap_or_default();
    let mut changed = false;
    for ext in new {
        let entries: Vec<Object> = match merged.get(ext.prefix) {
            Some(Object::Array(items)) => items.clone(),
            Some(other @ Object::Dictionary(_)) => vec![other.clone()],
            _ => Vec::new(),
        };
        if entries.iter().any(|e| extension_level(e) == Some(ext.level)) {
            continue;
        }
        let mut entries = entries;
        entries.push(ext.to_object());
        let value = if entries.len() == 1 && ext.prefix != "ISO_" {
            entries.remove(0)
        } else {
            Object::Array(entries)
        };
        merged.insert(ext.prefix.to_string(), value);
        changed = true;
    }
    if changed {
        merged.insert("Type".to_string(), Object::name("Extensions"));
        Some(merged)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_requires_sha512() {
        let err = check_pairing(SignatureAlgorithm::Ed25519, DigestAlgorithm::Sha1).unwrap_err();
        match err {
            Error::DigestForbidden { required, digest, .. } => {
                assert_eq!(required, "SHA-512");
                assert_eq!(digest, "SHA-1");
            },
            other => panic!("unexpected error {:?}", other),
        }
        assert!(check_pairing(SignatureAlgorithm::Ed25519, DigestAlgorithm::Sha512).is_ok());
    }

    #[test]
    fn test_ed448_requires_shake256() {
        assert!(check_pairing(SignatureAlgorithm::Ed448, DigestAlgorithm::Sha512).is_err());
        assert!(check_pairing(SignatureAlgorithm::Ed448, DigestAlgorithm::Shake256).is_ok());
        assert!(check_pairing(SignatureAlgorithm::RsaPkcs1, DigestAlgorithm::Shake256).is_err());
        assert!(check_pairing(SignatureAlgorithm::Ecdsa, DigestAlgorithm::Sha3_256).is_ok());
    }

    #[test]
    fn test_pss_parameters_round_trip() {
        let params = PssParameters::for_digest(DigestAlgorithm::Sha384);
        let id = signature_algorithm_identifier(SignatureAlgorithm::RsaPss, DigestAlgorithm::Sha384, Some(&params))
            .unwrap();
        assert_eq!(id.oid, oids::RSASSA_PSS);
        let (alg, decoded) = parse_signature_algorithm(&id).unwrap();
        assert_eq!(alg, SignatureAlgorithm::RsaPss);
        assert_eq!(decoded, Some(params));
    }

    #[test]
    fn test_outer_signature_algorithm_names_digest() {
        let id = AlgorithmIdentifierOwned {
            oid: oids::SHA256_WITH_RSA,
            parameters: None,
        };
        let (alg, digest, pss) = parse_outer_signature_algorithm(&id).unwrap();
        assert_eq!(alg, SignatureAlgorithm::RsaPkcs1);
        assert_eq!(digest, DigestAlgorithm::Sha256);
        assert!(pss.is_none());

        let bare = AlgorithmIdentifierOwned {
            oid: oids::RSA_ENCRYPTION,
            parameters: None,
        };
        assert!(matches!(
            parse_outer_signature_algorithm(&bare),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_pss_without_parameters_fails() {
        let err = signature_algorithm_identifier(SignatureAlgorithm::RsaPss, DigestAlgorithm::Sha256, None)
            .unwrap_err();
        assert!(matches!(err, Error::MissingAlgorithmParameters(_)));
    }

    #[test]
    fn test_pss_digest_mismatch() {
        let params = PssParameters::for_digest(DigestAlgorithm::Sha512);
        let err = signature_algorithm_identifier(SignatureAlgorithm::RsaPss, DigestAlgorithm::Sha256, Some(&params))
            .unwrap_err();
        assert!(matches!(err, Error::DigestMismatch { .. }));
    }

    #[test]
    fn test_ecdsa_identifier_follows_digest() {
        let id = signature_algorithm_identifier(SignatureAlgorithm::Ecdsa, DigestAlgorithm::Sha384, None).unwrap();
        assert_eq!(id.oid, oids::ECDSA_WITH_SHA384);
        assert!(id.parameters.is_none());
    }

    #[test]
    fn test_extensions_for_algorithms() {
        assert!(extensions_for(Some(SignatureAlgorithm::RsaPkcs1), DigestAlgorithm::Sha256).is_empty());
        assert_eq!(extensions_for(Some(SignatureAlgorithm::Ed25519), DigestAlgorithm::Sha512), vec![ISO_32002]);
        assert_eq!(extensions_for(Some(SignatureAlgorithm::Ecdsa), DigestAlgorithm::Sha3_256), vec![ISO_32001]);
    }

    #[test]
    fn test_merge_extensions_is_additive() {
        let first = merge_extensions(None, &[ESIC_LEVEL_5, ISO_32001]).unwrap();
        assert!(first.get("ESIC").unwrap().as_dict().is_some());
        assert_eq!(first.get("ISO_").unwrap().as_array().unwrap().len(), 1);

        // Re-adding existing declarations changes nothing
        assert!(merge_extensions(Some(&first), &[ESIC_LEVEL_5, ISO_32001]).is_none());

        let second = merge_extensions(Some(&first), &[ISO_32002]).unwrap();
        let iso = second.get("ISO_").unwrap().as_array().unwrap();
        assert_eq!(iso.len(), 2);
        assert!(second.get("ESIC").is_some());
    }
}
