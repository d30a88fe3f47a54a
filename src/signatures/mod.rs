//! PAdES signatures.
//!
//! Signing appends one incremental revision holding a signature dictionary
//! whose `/Contents` is a zero-filled placeholder, digests everything but
//! that placeholder, builds a CMS container over the digest and writes it
//! into the placeholder. Nothing outside the placeholder changes after the
//! digest is taken.
//!
//! ## Levels
//!
//! - **B**: signature only
//! - **T**: plus a signature timestamp from a [`TsaClient`]
//! - **LT**: plus a Document Security Store with certificates, CRLs and
//!   OCSP responses for the signer and TSA chains
//! - **LTA**: plus a document timestamp over the LT document
//!
//! [`ProfileOrchestrator`] runs the levels and prolongs existing signatures;
//! [`TwoPhaseCoordinator`] splits signing into a prepare step returning the
//! hash to sign and a complete step taking the signature value from
//! elsewhere (HSM, remote service).
//!
//! ## Example
//!
//! ```ignore
//! use pades_oxide::document::PdfDocument;
//! use pades_oxide::signatures::{
//!     default_provider, PrivateKeySigner, ProfileOrchestrator, SignOptions, SignatureProfile,
//!     SignerIdentity, SigningCredentials,
//! };
//!
//! let credentials = SigningCredentials::from_pem(&chain_pem, &key_pem)?;
//! let identity = SignerIdentity::new(credentials.certificate(), credentials.chain())?;
//! let signer = PrivateKeySigner::new(credentials, identity.signature_algorithm(None)?);
//!
//! let doc = PdfDocument::open("contract.pdf")?;
//! let mut orchestrator = ProfileOrchestrator::new(default_provider(), Default::default());
//! let signed = orchestrator.sign_with_profile(&doc, &identity, &signer, &SignOptions::default(), SignatureProfile::B)?;
//! std::fs::write("contract-signed.pdf", signed.bytes)?;
//! ```
//!
//! ## References
//!
//! - ISO 32000-2:2020 Section 12.8 - Digital Signatures
//! - ETSI EN 319 142-1 - PAdES baseline signatures
//! - RFC 5652 (CMS), RFC 3161 (time-stamp protocol), RFC 6960 (OCSP)

pub mod algorithms;
pub mod attributes;
pub mod byterange;
pub mod container;
pub mod document_writer;
pub mod dss;
pub mod identity;
pub mod orchestrator;
pub mod provider;
pub mod report;
pub mod timestamp;
pub mod two_phase;
pub mod types;
pub mod verifier;

pub use byterange::{ByteRange, ByteRangeCalculator};
pub use container::{CmsContainer, SignatureContainerBuilder, SizeEstimate};
pub use document_writer::{ByteRangeDocumentWriter, PlaceholderRequest, PreparedRevision};
pub use dss::{ValidationDictionary, VriEntry};
pub use identity::{CertificateInfo, SignerIdentity};
pub use orchestrator::{ProfileOrchestrator, SignedDocument};
pub use provider::{default_provider, CryptoProvider, ExternalSigner, PrivateKeySigner, RustCryptoProvider, SigningCredentials};
pub use report::{Advisory, SigningReport};
pub use timestamp::{TimestampRequest, TimestampToken, TsaClient};
pub use two_phase::{CompletionInput, PrepareExtras, PreparedSignature, TwoPhaseCoordinator};
pub use types::{
    CertificationLevel, DigestAlgorithm, PssParameters, SignOptions, SignatureAlgorithm, SignatureKind,
    SignatureProfile, SignatureStandard, SignatureSubFilter, VerificationResult, VerificationStatus, WriteMode,
};
pub use verifier::SignatureVerifier;
