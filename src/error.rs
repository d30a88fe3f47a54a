//! Error types for PAdES signing.
//!
//! Variants are grouped the way callers branch on them: sizing, algorithm
//! compatibility, trust/availability, document state, and infrastructure.
//! Advisory conditions (revoked certificates, exempted revocation checks)
//! are never errors; they travel through [`crate::signatures::SigningReport`].

/// Result type alias for signing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while preparing, signing or extending a PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // Sizing errors
    /// The requested placeholder cannot hold even the fixed parts of the container
    #[error("Signature placeholder too small: requested {requested} bytes, at least {estimated} bytes required")]
    PlaceholderTooSmall {
        /// Placeholder size requested by the caller (bytes of DER)
        requested: usize,
        /// Lower bound of the final container size
        estimated: usize,
    },

    /// The serialized container does not fit the reserved placeholder
    #[error("Signature container ({actual} bytes) exceeds reserved space ({reserved} bytes)")]
    ContainerTooLarge {
        /// Reserved placeholder size (bytes of DER)
        reserved: usize,
        /// Actual serialized container size
        actual: usize,
    },

    // Algorithm-compatibility errors
    /// A signature algorithm mandates a specific digest
    #[error("Digest {digest} is not allowed with {signature_algorithm}; {required} is required")]
    DigestForbidden {
        /// Signature algorithm name
        signature_algorithm: String,
        /// Requested digest name
        digest: String,
        /// Digest the algorithm requires
        required: String,
    },

    /// Digest algorithm disagreement between container creation and completion
    #[error("Digest algorithm mismatch: container uses {expected}, got {actual}")]
    DigestMismatch {
        /// Digest fixed when the container was created
        expected: String,
        /// Digest supplied later
        actual: String,
    },

    /// Algorithm parameters required by the structure are absent
    #[error("Missing algorithm parameters for {0}")]
    MissingAlgorithmParameters(String),

    /// Signature algorithm does not match the signing certificate's key
    #[error("Signing certificate holds a {certificate} key, cannot sign with {requested}")]
    KeyAlgorithmMismatch {
        /// Key algorithm found in the certificate
        certificate: String,
        /// Requested signature algorithm
        requested: String,
    },

    /// Algorithm known to the crate but not to the active provider
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    // Trust / availability errors
    /// Profile T and above need a timestamp client
    #[error("A timestamp client is required for this profile")]
    TimestampClientRequired,

    /// No revocation evidence could be collected for the signing certificate
    #[error("No revocation data for signing certificate {subject}")]
    NoRevocationData {
        /// Subject of the certificate without evidence
        subject: String,
    },

    /// The issuer of the signing certificate cannot be found
    #[error("Cannot resolve issuer of certificate {subject}")]
    UnresolvedIssuer {
        /// Subject of the certificate whose issuer is unknown
        subject: String,
    },

    /// Network exchange with an OCSP responder, CRL server, TSA or AIA location failed
    #[error("Network request to {url} failed: {reason}")]
    Network {
        /// Target URL
        url: String,
        /// Failure description
        reason: String,
    },

    /// The timestamp authority answered with an unusable token
    #[error("Timestamp error: {0}")]
    Timestamp(String),

    // Document-state errors
    /// A two-phase session was already completed
    #[error("Signing session already closed")]
    SessionClosed,

    /// The field to complete is not the most recently added signature
    #[error("Signature field '{field}' is not the last signature in the document")]
    FieldNotLast {
        /// Field name
        field: String,
    },

    /// The field to complete does not cover the whole document
    #[error("Signature field '{field}' does not cover the whole document")]
    FieldNotCoveringDocument {
        /// Field name
        field: String,
    },

    /// Signature field not present in the document
    #[error("Signature field not found: {0}")]
    FieldNotFound(String),

    /// Target field already holds a signature
    #[error("Signature field '{0}' is already signed")]
    FieldAlreadySigned(String),

    /// An existing certification signature forbids any change
    #[error("Document is certified with no changes allowed")]
    CertificationForbidsChanges,

    /// Certification requested on a document that already carries signatures
    #[error("Cannot certify a document that already contains signatures")]
    CertifyingSignedDocument,

    /// Prolongation requested but no signature is present
    #[error("No signatures to prolong")]
    NoSignaturesToProlong,

    /// Container already holds a signature value
    #[error("Signature container already completed")]
    ContainerAlreadyCompleted,

    /// Extension of a signature that does not exist
    #[error("No signature present to extend")]
    NoSignatureToExtend,

    /// LTA requested without a timestamped signature below it
    #[error("Archive timestamp requires a prior signature timestamp")]
    NoTimestampToArchive,

    /// Full rewrite is only legal when no prior signature exists
    #[error("Full rewrite is not allowed on a signed document")]
    FullRewriteNotAllowed,

    // Infrastructure errors
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ASN.1 DER encoding or decoding error
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// Certificate could not be parsed or is malformed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Malformed or unusable OCSP response or CRL
    #[error("Revocation data error: {0}")]
    Revocation(String),

    /// Cryptographic provider failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

impl Error {
    /// Whether this error reflects the state of the document rather than
    /// inputs or infrastructure.
    pub fn is_document_state(&self) -> bool {
        matches!(
            self,
            Error::SessionClosed
                | Error::FieldNotLast { .. }
                | Error::FieldNotCoveringDocument { .. }
                | Error::FieldNotFound(_)
                | Error::FieldAlreadySigned(_)
                | Error::CertificationForbidsChanges
                | Error::CertifyingSignedDocument
                | Error::NoSignaturesToProlong
                | Error::NoSignatureToExtend
                | Error::NoTimestampToArchive
                | Error::FullRewriteNotAllowed
        )
    }

    /// Whether this error is a sizing error (placeholder vs. container size).
    pub fn is_sizing(&self) -> bool {
        matches!(self, Error::PlaceholderTooSmall { .. } | Error::ContainerTooLarge { .. })
    }
}
