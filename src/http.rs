//! Blocking HTTP clients for OCSP responders, CRL distribution points,
//! timestamp authorities and AIA CA-issuers locations.
//!
//! Each exchange is one request with the timeout and User-Agent from
//! [`SigningConfig`]. There is no retry: a failed fetch surfaces as
//! [`Error::Network`] and the collector decides whether that is fatal.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

use crate::config::SigningConfig;
use crate::error::{Error, Result};
use crate::revocation::{CrlClient, IssuerCertificateRetriever, OcspClient, OcspRequest, OcspResponse};
use crate::signatures::identity::CertificateInfo;
use crate::signatures::provider::CryptoProvider;
use crate::signatures::timestamp::{TimestampRequest, TsaClient, DEFAULT_TOKEN_SIZE_ESTIMATE};
use crate::signatures::types::DigestAlgorithm;

/// Largest response body accepted from any endpoint.
const MAX_RESPONSE_SIZE: u64 = 16 * 1024 * 1024;

fn agent(timeout: Duration, user_agent: &str) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
}

fn network_error(url: &str, err: impl std::fmt::Display) -> Error {
    Error::Network {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

fn read_body(url: &str, response: ureq::Response) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_SIZE)
        .read_to_end(&mut body)
        .map_err(|e| network_error(url, e))?;
    log::debug!("{}: {} bytes", url, body.len());
    Ok(body)
}

fn post(agent: &ureq::Agent, url: &str, content_type: &str, authorization: Option<&str>, body: &[u8]) -> Result<Vec<u8>> {
    let mut request = agent.post(url).set("Content-Type", content_type);
    if let Some(auth) = authorization {
        request = request.set("Authorization", auth);
    }
    let response = request.send_bytes(body).map_err(|e| network_error(url, e))?;
    read_body(url, response)
}

fn get(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent.get(url).call().map_err(|e| network_error(url, e))?;
    read_body(url, response)
}

/// OCSP over HTTP POST to the responders named in the certificate's AIA.
pub struct HttpOcspClient {
    agent: ureq::Agent,
    provider: Arc<dyn CryptoProvider>,
    url_overrides: Vec<String>,
}

impl HttpOcspClient {
    /// Client using the AIA OCSP locations of each certificate.
    pub fn new(provider: Arc<dyn CryptoProvider>, config: &SigningConfig) -> Self {
        Self {
            agent: agent(config.network_timeout(), &config.user_agent),
            provider,
            url_overrides: Vec::new(),
        }
    }

    /// Send every request to `url` regardless of the certificate's AIA.
    /// Further calls add fallback responders, tried in order.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url_overrides.push(url.into());
        self
    }
}

impl OcspClient for HttpOcspClient {
    fn fetch(&self, certificate: &CertificateInfo, issuer: &CertificateInfo) -> Result<Option<Vec<u8>>> {
        let urls: Vec<&str> = if self.url_overrides.is_empty() {
            certificate.ocsp_urls().iter().map(String::as_str).collect()
        } else {
            self.url_overrides.iter().map(String::as_str).collect()
        };
        if urls.is_empty() {
            log::debug!("no OCSP responder for {}", certificate.subject());
            return Ok(None);
        }
        let request = OcspRequest::new(self.provider.as_ref(), certificate, issuer)?;
        let mut last_error = None;
        for url in urls {
            let exchange = post(&self.agent, url, "application/ocsp-request", None, request.to_der()).and_then(|body| {
                request.check_response(&OcspResponse::parse(&body)?)?;
                Ok(body)
            });
            match exchange {
                Ok(body) => return Ok(Some(body)),
                Err(e) => {
                    log::warn!("OCSP request for {} to {} failed: {}", certificate.subject(), url, e);
                    last_error = Some(e);
                },
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// CRL download from the certificate's distribution points.
pub struct HttpCrlClient {
    agent: ureq::Agent,
}

impl HttpCrlClient {
    /// Client with the configured timeout.
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            agent: agent(config.network_timeout(), &config.user_agent),
        }
    }
}

impl CrlClient for HttpCrlClient {
    fn fetch(&self, certificate: &CertificateInfo) -> Result<Vec<Vec<u8>>> {
        let mut crls = Vec::new();
        let mut last_error = None;
        for url in certificate.crl_urls().iter().filter(|u| u.starts_with("http")) {
            match get(&self.agent, url) {
                Ok(body) => crls.push(body),
                Err(e) => {
                    log::warn!("CRL download for {} failed: {}", certificate.subject(), e);
                    last_error = Some(e);
                },
            }
        }
        match (crls.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(crls),
        }
    }
}

/// RFC 3161 over HTTP POST.
pub struct HttpTsaClient {
    agent: ureq::Agent,
    url: String,
    digest: DigestAlgorithm,
    authorization: Option<String>,
    token_size_estimate: usize,
}

impl HttpTsaClient {
    /// Client for the TSA at `url`, stamping SHA-256 imprints.
    pub fn new(url: impl Into<String>, config: &SigningConfig) -> Self {
        Self {
            agent: agent(config.network_timeout(), &config.user_agent),
            url: url.into(),
            digest: DigestAlgorithm::Sha256,
            authorization: None,
            token_size_estimate: DEFAULT_TOKEN_SIZE_ESTIMATE,
        }
    }

    /// Imprint digest.
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// HTTP basic authentication.
    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        let credentials = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
        self.authorization = Some(format!("Basic {}", credentials));
        self
    }

    /// Bytes reserved per token in signature placeholders.
    pub fn with_token_size_estimate(mut self, size: usize) -> Self {
        self.token_size_estimate = size;
        self
    }
}

impl std::fmt::Debug for HttpTsaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTsaClient")
            .field("url", &self.url)
            .field("digest", &self.digest)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TsaClient for HttpTsaClient {
    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    fn token_size_estimate(&self) -> usize {
        self.token_size_estimate
    }

    fn timestamp(&self, imprint: &[u8]) -> Result<Vec<u8>> {
        let request = TimestampRequest::new(self.digest, imprint)?;
        let body = post(
            &self.agent,
            &self.url,
            "application/timestamp-query",
            self.authorization.as_deref(),
            request.to_der(),
        )?;
        let token = request.parse_response(&body)?;
        log::info!("timestamp token from {} ({} bytes)", self.url, token.len());
        Ok(token)
    }
}

/// Plain GET for AIA CA-issuers URIs.
pub struct HttpIssuerRetriever {
    agent: ureq::Agent,
}

impl HttpIssuerRetriever {
    /// Retriever with the configured timeout.
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            agent: agent(config.network_timeout(), &config.user_agent),
        }
    }
}

impl IssuerCertificateRetriever for HttpIssuerRetriever {
    fn retrieve(&self, uri: &str) -> Result<Vec<u8>> {
        if !uri.starts_with("http") {
            return Err(Error::Unsupported(format!("issuer retrieval from {}", uri)));
        }
        get(&self.agent, uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    /// Answer one POST on a local port with `body`, returning the URL.
    fn serve_once(body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line.trim().is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    length = value.trim().parse().unwrap();
                }
            }
            let mut request = vec![0u8; length];
            reader.read_exact(&mut request).unwrap();
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/ocsp-response\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(&body).unwrap();
        });
        url
    }

    fn signer_and_root() -> (CertificateInfo, CertificateInfo) {
        (
            CertificateInfo::parse(&fixture("signer-rsa.cer")).unwrap(),
            CertificateInfo::parse(&fixture("root.cer")).unwrap(),
        )
    }

    #[test]
    fn test_garbled_ocsp_response_falls_through_to_next_responder() {
        let (signer, root) = signer_and_root();
        let client = HttpOcspClient::new(crate::signatures::default_provider(), &SigningConfig::default())
            .with_url(serve_once(b"<html>maintenance</html>".to_vec()))
            .with_url(serve_once(fixture("signer-rsa.ocsp")));
        assert_eq!(client.fetch(&signer, &root).unwrap(), Some(fixture("signer-rsa.ocsp")));
    }

    #[test]
    fn test_last_ocsp_failure_is_reported() {
        let (signer, root) = signer_and_root();
        let client = HttpOcspClient::new(crate::signatures::default_provider(), &SigningConfig::default())
            .with_url(serve_once(fixture("signer-rsa.ocsp")[..10].to_vec()))
            .with_url(serve_once(b"garbage".to_vec()));
        assert!(client.fetch(&signer, &root).is_err());
    }

    #[test]
    fn test_basic_auth_header() {
        let client = HttpTsaClient::new("http://tsa.invalid/", &SigningConfig::default()).with_basic_auth("user", "pass");
        assert_eq!(client.authorization.as_deref(), Some("Basic dXNlcjpwYXNz"));
        assert!(format!("{:?}", client).contains("<redacted>"));
    }

    #[test]
    fn test_non_http_issuer_uri() {
        let retriever = HttpIssuerRetriever::new(&SigningConfig::default());
        assert!(matches!(retriever.retrieve("ldap://example/cn=ca"), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_unreachable_tsa_is_network_error() {
        let config = SigningConfig::default().with_network_timeout(1);
        let client = HttpTsaClient::new("http://127.0.0.1:9/", &config);
        match client.timestamp(&[0u8; 32]) {
            Err(Error::Network { url, .. }) => assert_eq!(url, "http://127.0.0.1:9/"),
            other => panic!("unexpected {:?}", other.map(|t| t.len())),
        }
    }
}
