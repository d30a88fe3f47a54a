// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]

//! # PAdES Oxide
//!
//! PAdES signing for PDF: incremental signature revisions, CMS/CAdES
//! containers, RFC 3161 timestamps and long-term validation evidence.
//!
//! ## Core Features
//!
//! ### Signing
//! - **Incremental revisions**: every signature, DSS and document timestamp
//!   is appended; earlier bytes are never touched
//! - **Baseline levels**: B, T, LT and LTA, plus prolongation of existing
//!   signatures
//! - **Two-phase signing**: prepare the hash to sign, complete later with a
//!   raw signature value or a finished container
//! - **Algorithms**: RSA PKCS#1 v1.5, RSASSA-PSS, ECDSA P-256/P-384, Ed25519,
//!   with SHA-1, SHA-2, SHA-3 digests (pairing rules enforced up front)
//! - **Certification**: DocMDP levels 1 to 3
//!
//! ### Long-term validation
//! - **Revocation collection**: OCSP then CRL per certificate, issuer
//!   resolution through known certificates, a trust store or AIA retrieval
//! - **Document Security Store**: deduplicated `/Certs`, `/CRLs`, `/OCSPs`
//!   with per-signature `/VRI` entries
//! - **Advisories**: revoked certificates, exemptions and client failures
//!   are reported, not fatal
//!
//! ### Host document
//! - Classic xref tables, xref streams, object streams and `/Prev` chains
//! - AcroForm signature field lookup and creation
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pades_oxide::document::PdfDocument;
//! use pades_oxide::http::{HttpOcspClient, HttpTsaClient};
//! use pades_oxide::signatures::*;
//!
//! # fn main() -> pades_oxide::Result<()> {
//! let credentials = SigningCredentials::from_pem(&std::fs::read("chain.pem")?, &std::fs::read("key.pem")?)?;
//! let identity = SignerIdentity::new(credentials.certificate(), credentials.chain())?;
//! let signer = PrivateKeySigner::new(credentials, identity.signature_algorithm(None)?);
//!
//! let config = pades_oxide::config::SigningConfig::default();
//! let mut orchestrator = ProfileOrchestrator::new(default_provider(), config.clone())
//!     .with_tsa(Arc::new(HttpTsaClient::new("https://tsa.example.com", &config)))
//!     .with_ocsp_client(Arc::new(HttpOcspClient::new(default_provider(), &config)));
//!
//! let doc = PdfDocument::open("contract.pdf")?;
//! let signed = orchestrator.sign_with_profile(&doc, &identity, &signer, &SignOptions::default(), SignatureProfile::LT)?;
//! std::fs::write("contract-signed.pdf", signed.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod xref;

// Incremental revisions
pub mod writer;

// Signing, timestamps, DSS
pub mod signatures;

// Revocation evidence
pub mod revocation;

// Network clients (optional)
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;

// Re-exports
pub use config::SigningConfig;
pub use document::PdfDocument;
pub use error::{Error, Result};

/// Producer name written to `/Prop_Build`.
pub const NAME: &str = "pades_oxide";

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
