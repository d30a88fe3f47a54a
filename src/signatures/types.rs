//! Signature types shared by the container builder, the document writer
//! and the orchestrator.

use chrono::{DateTime, Utc};
use der::asn1::ObjectIdentifier;

use super::algorithms::oids;

/// Digest algorithm used for the message digest and the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    /// SHA-1 (deprecated, accepted with an advisory)
    Sha1,
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
    /// SHA3-256
    Sha3_256,
    /// SHA3-384
    Sha3_384,
    /// SHA3-512
    Sha3_512,
    /// SHAKE256 with 512-bit output, only paired with Ed448
    Shake256,
}

impl DigestAlgorithm {
    /// All supported digests.
    pub const ALL: [DigestAlgorithm; 8] = [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
        DigestAlgorithm::Sha3_256,
        DigestAlgorithm::Sha3_384,
        DigestAlgorithm::Sha3_512,
        DigestAlgorithm::Shake256,
    ];

    /// Get the OID for this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => oids::SHA1,
            DigestAlgorithm::Sha256 => oids::SHA256,
            DigestAlgorithm::Sha384 => oids::SHA384,
            DigestAlgorithm::Sha512 => oids::SHA512,
            DigestAlgorithm::Sha3_256 => oids::SHA3_256,
            DigestAlgorithm::Sha3_384 => oids::SHA3_384,
            DigestAlgorithm::Sha3_512 => oids::SHA3_512,
            DigestAlgorithm::Shake256 => oids::SHAKE256,
        }
    }

    /// Look up a digest by OID.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.oid() == *oid)
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
            DigestAlgorithm::Sha3_256 => "SHA3-256",
            DigestAlgorithm::Sha3_384 => "SHA3-384",
            DigestAlgorithm::Sha3_512 => "SHA3-512",
            DigestAlgorithm::Shake256 => "SHAKE256",
        }
    }

    /// Parse a name such as `SHA-256`, `sha256` or `SHA3-512`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect::<String>()
            .to_ascii_uppercase()
            .replace('_', "");
        Self::ALL.into_iter().find(|d| {
            d.name()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                == normalized
        })
    }

    /// Digest output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha3_256 => 32,
            DigestAlgorithm::Sha384 | DigestAlgorithm::Sha3_384 => 48,
            DigestAlgorithm::Sha512 | DigestAlgorithm::Sha3_512 | DigestAlgorithm::Shake256 => 64,
        }
    }

    /// Whether this digest belongs to the SHA-3 family (including SHAKE).
    pub fn is_sha3(&self) -> bool {
        matches!(
            self,
            DigestAlgorithm::Sha3_256
                | DigestAlgorithm::Sha3_384
                | DigestAlgorithm::Sha3_512
                | DigestAlgorithm::Shake256
        )
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Signature mechanism family, independent of the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5
    RsaPkcs1,
    /// RSASSA-PSS
    RsaPss,
    /// ECDSA
    Ecdsa,
    /// Ed25519 (mandates SHA-512)
    Ed25519,
    /// Ed448 (mandates SHAKE256)
    Ed448,
}

impl SignatureAlgorithm {
    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaPkcs1 => "RSA",
            SignatureAlgorithm::RsaPss => "RSASSA-PSS",
            SignatureAlgorithm::Ecdsa => "ECDSA",
            SignatureAlgorithm::Ed25519 => "Ed25519",
            SignatureAlgorithm::Ed448 => "Ed448",
        }
    }

    /// Whether a key of family `key` can produce this signature.
    pub fn compatible_with_key(&self, key: SignatureAlgorithm) -> bool {
        match (self, key) {
            (SignatureAlgorithm::RsaPkcs1 | SignatureAlgorithm::RsaPss, SignatureAlgorithm::RsaPkcs1) => true,
            (SignatureAlgorithm::RsaPss, SignatureAlgorithm::RsaPss) => true,
            (a, b) => *a == b,
        }
    }

    /// Whether this is an EdDSA variant.
    pub fn is_eddsa(&self) -> bool {
        matches!(self, SignatureAlgorithm::Ed25519 | SignatureAlgorithm::Ed448)
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// RSASSA-PSS parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PssParameters {
    /// Message digest
    pub digest: DigestAlgorithm,
    /// Digest used by MGF1
    pub mgf_digest: DigestAlgorithm,
    /// Salt length in bytes
    pub salt_len: usize,
}

impl PssParameters {
    /// Conventional parameters: MGF1 with the same digest, salt length equal to the digest length.
    pub fn for_digest(digest: DigestAlgorithm) -> Self {
        Self {
            digest,
            mgf_digest: digest,
            salt_len: digest.output_len(),
        }
    }
}

/// Signature sub-filter type (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    Pkcs7Detached,
    /// adbe.pkcs7.sha1 - PKCS#7 with SHA-1 digest (read only)
    Pkcs7Sha1,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    CadesDetached,
    /// ETSI.RFC3161 - Document timestamp token
    Rfc3161,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::Pkcs7Sha1 => "adbe.pkcs7.sha1",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
            SignatureSubFilter::Rfc3161 => "ETSI.RFC3161",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "adbe.pkcs7.sha1" => Some(SignatureSubFilter::Pkcs7Sha1),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            "ETSI.RFC3161" => Some(SignatureSubFilter::Rfc3161),
            _ => None,
        }
    }
}

/// Container flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureStandard {
    /// CMS detached signature (`adbe.pkcs7.detached`); signing time travels as a signed attribute
    Cms,
    /// CAdES detached signature (`ETSI.CAdES.detached`); binds the signing certificate
    #[default]
    Cades,
}

impl SignatureStandard {
    /// Sub-filter written into the signature dictionary.
    pub fn sub_filter(&self) -> SignatureSubFilter {
        match self {
            SignatureStandard::Cms => SignatureSubFilter::Pkcs7Detached,
            SignatureStandard::Cades => SignatureSubFilter::CadesDetached,
        }
    }
}

/// PAdES baseline level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignatureProfile {
    /// Basic signature
    B,
    /// Signature with a signature timestamp
    T,
    /// T plus revocation evidence for every chain in a validation dictionary
    LT,
    /// LT plus a document timestamp covering everything
    LTA,
}

impl SignatureProfile {
    /// Whether the level requires a timestamp authority.
    pub fn requires_timestamp(&self) -> bool {
        *self >= SignatureProfile::T
    }

    /// Whether the level embeds revocation evidence.
    pub fn requires_revocation(&self) -> bool {
        *self >= SignatureProfile::LT
    }
}

impl std::fmt::Display for SignatureProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignatureProfile::B => "B-B",
            SignatureProfile::T => "B-T",
            SignatureProfile::LT => "B-LT",
            SignatureProfile::LTA => "B-LTA",
        };
        f.write_str(s)
    }
}

/// DocMDP certification level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertificationLevel {
    /// Approval signature
    #[default]
    NotCertified,
    /// P = 1
    NoChangesAllowed,
    /// P = 2
    FormFilling,
    /// P = 3
    FormFillingAndAnnotations,
}

impl CertificationLevel {
    /// DocMDP /P value, `None` for approval signatures.
    pub fn permission(&self) -> Option<i64> {
        match self {
            CertificationLevel::NotCertified => None,
            CertificationLevel::NoChangesAllowed => Some(1),
            CertificationLevel::FormFilling => Some(2),
            CertificationLevel::FormFillingAndAnnotations => Some(3),
        }
    }
}

/// How the new revision is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Append an incremental revision after the existing bytes
    #[default]
    Append,
    /// Rewrite the whole file; only valid while no signature exists
    FullRewrite,
}

/// Signature dictionary kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// `/Type /Sig`
    Signature,
    /// `/Type /DocTimeStamp`
    DocumentTimestamp,
}

/// Options for signing a PDF.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Digest algorithm to use
    pub digest_algorithm: DigestAlgorithm,
    /// CMS or CAdES container
    pub standard: SignatureStandard,
    /// Signature mechanism, derived from the signing certificate when `None`
    pub signature_algorithm: Option<SignatureAlgorithm>,
    /// PSS parameters for RSASSA-PSS
    pub pss_parameters: Option<PssParameters>,
    /// Field to sign; a new field is created when absent
    pub field_name: Option<String>,
    /// Zero-based page receiving a new field's widget
    pub page: usize,
    /// Reason for signing
    pub reason: Option<String>,
    /// Location where the document was signed
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Name of the signer (if different from certificate CN)
    pub name: Option<String>,
    /// Signing time written to /M and, for CMS, the signing-time attribute
    pub signing_time: Option<DateTime<Utc>>,
    /// DocMDP certification
    pub certification: CertificationLevel,
    /// Bytes of DER reserved for the container, estimated when `None`
    pub placeholder_size: Option<usize>,
    /// Collect revocation data before signing and embed it as
    /// `adbe-revocationInfoArchival` (CMS standard only)
    pub embed_revocation_archival: bool,
    /// Append or rewrite
    pub write_mode: WriteMode,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha256,
            standard: SignatureStandard::Cades,
            signature_algorithm: None,
            pss_parameters: None,
            field_name: None,
            page: 0,
            reason: None,
            location: None,
            contact_info: None,
            name: None,
            signing_time: None,
            certification: CertificationLevel::NotCertified,
            placeholder_size: None,
            embed_revocation_archival: false,
            write_mode: WriteMode::Append,
        }
    }
}

impl SignOptions {
    /// Set the digest algorithm.
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest;
        self
    }

    /// Set the container standard.
    pub fn with_standard(mut self, standard: SignatureStandard) -> Self {
        self.standard = standard;
        self
    }

    /// Force a signature mechanism (e.g. PSS with an RSA key).
    pub fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = Some(algorithm);
        self
    }

    /// Set RSASSA-PSS parameters.
    pub fn with_pss_parameters(mut self, params: PssParameters) -> Self {
        self.pss_parameters = Some(params);
        self
    }

    /// Sign into the named field.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }

    /// Place a new field's widget on `page`.
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the contact information.
    pub fn with_contact_info(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = Some(contact.into());
        self
    }

    /// Set the signer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Fix the signing time.
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// Certify the document.
    pub fn with_certification(mut self, level: CertificationLevel) -> Self {
        self.certification = level;
        self
    }

    /// Reserve `size` bytes of DER for the container.
    pub fn with_placeholder_size(mut self, size: usize) -> Self {
        self.placeholder_size = Some(size);
        self
    }

    /// Embed revocation data as a signed attribute.
    pub fn with_revocation_archival(mut self, enable: bool) -> Self {
        self.embed_revocation_archival = enable;
        self
    }

    /// Choose append or full rewrite.
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Signing time, falling back to now.
    pub fn effective_signing_time(&self) -> DateTime<Utc> {
        self.signing_time.unwrap_or_else(Utc::now)
    }
}

/// Result of signature verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Field holding the signature
    pub field_name: String,
    /// Signature or document timestamp
    pub kind: SignatureKind,
    /// Overall verification status
    pub status: VerificationStatus,
    /// Subject of the signing (or TSA) certificate
    pub signer_subject: Option<String>,
    /// Whether the byte range ends at the end of the file
    pub covers_whole_document: bool,
    /// Whether a signature timestamp is attached
    pub has_timestamp: bool,
    /// Verification messages (errors, warnings)
    pub messages: Vec<String>,
}

/// Verification status of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Signature is valid
    Valid,
    /// Signature is invalid (cryptographically)
    Invalid,
    /// Signature validity is unknown (e.g., unsupported algorithm)
    Unknown,
}

impl VerificationStatus {
    /// Check if the status indicates a valid signature.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }
}
