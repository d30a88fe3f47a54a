//! Sign, prolong or verify PDF signatures.
//!
//! Usage:
//!   pades_sign sign --in doc.pdf --out signed.pdf --cert chain.pem --key key.pem
//!       [--profile B|T|LT|LTA] [--tsa URL] [--tsa-user U --tsa-password P]
//!       [--digest SHA-256] [--field NAME] [--reason TEXT] [--location TEXT]
//!       [--standard cades|cms] [--trust roots.pem] [--config config.json]
//!   pades_sign prolong --in signed.pdf --out prolonged.pdf [--profile LT|LTA] [--tsa URL] ...
//!   pades_sign verify --in signed.pdf
//!
//! Set RUST_LOG=debug for a trace of each step.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use pades_oxide::config::SigningConfig;
use pades_oxide::document::PdfDocument;
use pades_oxide::http::{HttpCrlClient, HttpIssuerRetriever, HttpOcspClient, HttpTsaClient};
use pades_oxide::revocation::{IssuerResolver, TrustStore};
use pades_oxide::signatures::{
    default_provider, DigestAlgorithm, PrivateKeySigner, ProfileOrchestrator, SignOptions, SignatureProfile,
    SignatureStandard, SignatureVerifier, SignerIdentity, SigningCredentials, SigningReport,
};
use pades_oxide::{Error, Result};

#[derive(Default)]
struct Args {
    command: String,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    trust: Option<PathBuf>,
    config: Option<PathBuf>,
    profile: Option<String>,
    tsa: Option<String>,
    tsa_user: Option<String>,
    tsa_password: Option<String>,
    digest: Option<String>,
    standard: Option<String>,
    field: Option<String>,
    reason: Option<String>,
    location: Option<String>,
}

impl Args {
    fn from_args() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut parsed = Args {
            command: args.first().cloned().unwrap_or_default(),
            ..Default::default()
        };

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = args
                .get(i + 1)
                .cloned()
                .ok_or_else(|| Error::InvalidConfig(format!("{} needs a value", flag)))?;
            match flag {
                "--in" => parsed.input = Some(value.into()),
                "--out" => parsed.output = Some(value.into()),
                "--cert" => parsed.cert = Some(value.into()),
                "--key" => parsed.key = Some(value.into()),
                "--trust" => parsed.trust = Some(value.into()),
                "--config" => parsed.config = Some(value.into()),
                "--profile" => parsed.profile = Some(value),
                "--tsa" => parsed.tsa = Some(value),
                "--tsa-user" => parsed.tsa_user = Some(value),
                "--tsa-password" => parsed.tsa_password = Some(value),
                "--digest" => parsed.digest = Some(value),
                "--standard" => parsed.standard = Some(value),
                "--field" => parsed.field = Some(value),
                "--reason" => parsed.reason = Some(value),
                "--location" => parsed.location = Some(value),
                other => return Err(Error::InvalidConfig(format!("unknown option {}", other))),
            }
            i += 2;
        }
        Ok(parsed)
    }

    fn required(value: &Option<PathBuf>, flag: &str) -> Result<PathBuf> {
        value
            .clone()
            .ok_or_else(|| Error::InvalidConfig(format!("{} is required", flag)))
    }

    fn profile(&self, default: SignatureProfile) -> Result<SignatureProfile> {
        match self.profile.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None => Ok(default),
            Some("B") | Some("B-B") => Ok(SignatureProfile::B),
            Some("T") | Some("B-T") => Ok(SignatureProfile::T),
            Some("LT") | Some("B-LT") => Ok(SignatureProfile::LT),
            Some("LTA") | Some("B-LTA") => Ok(SignatureProfile::LTA),
            Some(other) => Err(Error::InvalidConfig(format!("unknown profile {}", other))),
        }
    }

    fn options(&self) -> Result<SignOptions> {
        let mut options = SignOptions::default();
        if let Some(name) = &self.digest {
            let digest = DigestAlgorithm::from_name(name)
                .ok_or_else(|| Error::UnsupportedAlgorithm(name.clone()))?;
            options = options.with_digest(digest);
        }
        match self.standard.as_deref() {
            None | Some("cades") => {},
            Some("cms") => options = options.with_standard(SignatureStandard::Cms).with_revocation_archival(true),
            Some(other) => return Err(Error::InvalidConfig(format!("unknown standard {}", other))),
        }
        if let Some(field) = &self.field {
            options = options.with_field_name(field);
        }
        if let Some(reason) = &self.reason {
            options = options.with_reason(reason);
        }
        if let Some(location) = &self.location {
            options = options.with_location(location);
        }
        Ok(options)
    }

    fn orchestrator(&self, config: &SigningConfig) -> Result<ProfileOrchestrator> {
        let provider = default_provider();
        let mut trust = TrustStore::new();
        if let Some(path) = &self.trust {
            trust.add_pem(&std::fs::read(path)?)?;
        }
        let resolver = IssuerResolver::new()
            .with_trust_store(Arc::new(trust))
            .with_retriever(Arc::new(HttpIssuerRetriever::new(config)));
        let mut orchestrator = ProfileOrchestrator::new(provider.clone(), config.clone())
            .with_resolver(resolver)
            .with_ocsp_client(Arc::new(HttpOcspClient::new(provider, config)))
            .with_crl_client(Arc::new(HttpCrlClient::new(config)));
        if let Some(url) = &self.tsa {
            let mut tsa = HttpTsaClient::new(url.clone(), config);
            if let (Some(user), Some(password)) = (&self.tsa_user, &self.tsa_password) {
                tsa = tsa.with_basic_auth(user, password);
            }
            orchestrator = orchestrator.with_tsa(Arc::new(tsa));
        }
        Ok(orchestrator)
    }
}

fn print_report(report: &SigningReport) {
    if report.is_empty() {
        return;
    }
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Cannot render report: {}", e),
    }
}

fn sign(args: &Args, config: &SigningConfig) -> Result<()> {
    let credentials = SigningCredentials::from_pem(
        &std::fs::read(Args::required(&args.cert, "--cert")?)?,
        &std::fs::read(Args::required(&args.key, "--key")?)?,
    )?;
    let identity = SignerIdentity::new(credentials.certificate(), credentials.chain())?;
    let signer = PrivateKeySigner::new(credentials, identity.signature_algorithm(None)?);
    let doc = PdfDocument::open(Args::required(&args.input, "--in")?)?;

    let signed = args.orchestrator(config)?.sign_with_profile(
        &doc,
        &identity,
        &signer,
        &args.options()?,
        args.profile(SignatureProfile::B)?,
    )?;
    std::fs::write(Args::required(&args.output, "--out")?, &signed.bytes)?;
    println!("Signed field {}", signed.field_name.unwrap_or_default());
    print_report(&signed.report);
    Ok(())
}

fn prolong(args: &Args, config: &SigningConfig) -> Result<()> {
    let doc = PdfDocument::open(Args::required(&args.input, "--in")?)?;
    let prolonged = args
        .orchestrator(config)?
        .prolong_signatures(&doc, args.profile(SignatureProfile::LT)?)?;
    std::fs::write(Args::required(&args.output, "--out")?, &prolonged.bytes)?;
    println!("Prolonged {} bytes -> {} bytes", doc.len(), prolonged.bytes.len());
    print_report(&prolonged.report);
    Ok(())
}

fn verify(args: &Args) -> Result<bool> {
    let doc = PdfDocument::open(Args::required(&args.input, "--in")?)?;
    let results = SignatureVerifier::new(default_provider()).verify_all(&doc)?;
    if results.is_empty() {
        println!("No signatures");
    }
    let mut all_valid = true;
    for result in &results {
        all_valid &= result.status.is_valid();
        println!(
            "{} [{:?}] {:?} signer={} timestamp={} whole-document={}",
            result.field_name,
            result.kind,
            result.status,
            result.signer_subject.as_deref().unwrap_or("?"),
            result.has_timestamp,
            result.covers_whole_document
        );
        for message in &result.messages {
            println!("    {}", message);
        }
    }
    Ok(all_valid)
}

fn run() -> Result<bool> {
    let args = Args::from_args()?;
    let config = match &args.config {
        Some(path) => SigningConfig::from_file(path)?,
        None => SigningConfig::default(),
    };
    match args.command.as_str() {
        "sign" => sign(&args, &config).map(|_| true),
        "prolong" => prolong(&args, &config).map(|_| true),
        "verify" => verify(&args),
        _ => Err(Error::InvalidConfig(
            "usage: pades_sign <sign|prolong|verify> --in FILE [options]".to_string(),
        )),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
