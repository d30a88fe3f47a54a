//! Cryptographic provider and signing credentials.
//!
//! All hashing, signing and signature checks go through a
//! [`CryptoProvider`]. The default one is backed by the RustCrypto crates
//! and shared process-wide; callers with HSMs or remote signers plug in
//! through [`ExternalSigner`] instead.

use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

use lazy_static::lazy_static;
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use signature::{Signer as _, Verifier as _};
use spki::DecodePublicKey;
use x509_parser::pem::Pem;

use super::types::{DigestAlgorithm, PssParameters, SignatureAlgorithm};
use crate::error::{Error, Result};

/// Hashing, signing and verification primitives.
pub trait CryptoProvider: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Hash everything `reader` yields.
    fn digest_reader(&self, algorithm: DigestAlgorithm, reader: &mut dyn Read) -> Result<Vec<u8>>;

    /// Hash a byte slice.
    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        self.digest_reader(algorithm, &mut Cursor::new(data))
    }

    /// Sign `message` with a PKCS#8 private key. RSA and ECDSA hash the
    /// message with `digest` first; EdDSA signs it directly.
    fn sign(
        &self,
        private_key_der: &[u8],
        algorithm: SignatureAlgorithm,
        digest: DigestAlgorithm,
        pss: Option<&PssParameters>,
        message: &[u8],
    ) -> Result<Vec<u8>>;

    /// Check `signature` over `message` against a DER SubjectPublicKeyInfo.
    fn verify(
        &self,
        public_key_info: &[u8],
        algorithm: SignatureAlgorithm,
        digest: DigestAlgorithm,
        pss: Option<&PssParameters>,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool>;
}

/// Provider backed by `sha2`/`sha3`, `rsa`, `p256`/`p384` and `ed25519-dalek`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoProvider;

lazy_static! {
    static ref DEFAULT_PROVIDER: Arc<dyn CryptoProvider> = Arc::new(RustCryptoProvider);
}

/// Process-wide default provider.
pub fn default_provider() -> Arc<dyn CryptoProvider> {
    Arc::clone(&DEFAULT_PROVIDER)
}

fn hash_reader<D: sha2::Digest>(reader: &mut dyn Read) -> Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sha2::Digest::update(&mut hasher, &buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

fn shake256_reader(reader: &mut dyn Read) -> Result<Vec<u8>> {
    use sha3::digest::{ExtendableOutput, Update, XofReader};

    let mut hasher = sha3::Shake256::default();
    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut out = vec![0u8; DigestAlgorithm::Shake256.output_len()];
    XofReader::read(&mut hasher.finalize_xof(), &mut out);
    Ok(out)
}

fn crypto(context: &str, e: impl fmt::Display) -> Error {
    Error::Crypto(format!("{}: {}", context, e))
}

fn rsa_sign_pkcs1(key: &rsa::RsaPrivateKey, digest: DigestAlgorithm, hashed: &[u8]) -> Result<Vec<u8>> {
    use rsa::Pkcs1v15Sign;
    let scheme = match digest {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        DigestAlgorithm::Sha3_256 => Pkcs1v15Sign::new::<sha3::Sha3_256>(),
        DigestAlgorithm::Sha3_384 => Pkcs1v15Sign::new::<sha3::Sha3_384>(),
        DigestAlgorithm::Sha3_512 => Pkcs1v15Sign::new::<sha3::Sha3_512>(),
        DigestAlgorithm::Shake256 => return Err(Error::UnsupportedAlgorithm("RSA with SHAKE256".to_string())),
    };
    key.sign(scheme, hashed).map_err(|e| crypto("RSA signing", e))
}

fn pss_scheme(params: &PssParameters) -> Result<rsa::Pss> {
    use rsa::Pss;
    if params.mgf_digest != params.digest {
        return Err(Error::UnsupportedAlgorithm(format!(
            "RSASSA-PSS with MGF1 {} over {}",
            params.mgf_digest, params.digest
        )));
    }
    let salt = params.salt_len;
    Ok(match params.digest {
        DigestAlgorithm::Sha1 => Pss::new_with_salt::<sha1::Sha1>(salt),
        DigestAlgorithm::Sha256 => Pss::new_with_salt::<sha2::Sha256>(salt),
        DigestAlgorithm::Sha384 => Pss::new_with_salt::<sha2::Sha384>(salt),
        DigestAlgorithm::Sha512 => Pss::new_with_salt::<sha2::Sha512>(salt),
        DigestAlgorithm::Sha3_256 => Pss::new_with_salt::<sha3::Sha3_256>(salt),
        DigestAlgorithm::Sha3_384 => Pss::new_with_salt::<sha3::Sha3_384>(salt),
        DigestAlgorithm::Sha3_512 => Pss::new_with_salt::<sha3::Sha3_512>(salt),
        DigestAlgorithm::Shake256 => {
            return Err(Error::UnsupportedAlgorithm("RSASSA-PSS with SHAKE256".to_string()))
        },
    })
}

fn rsa_verify_pkcs1(key: &rsa::RsaPublicKey, digest: DigestAlgorithm, hashed: &[u8], sig: &[u8]) -> Result<bool> {
    use rsa::Pkcs1v15Sign;
    let scheme = match digest {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        DigestAlgorithm::Sha3_256 => Pkcs1v15Sign::new::<sha3::Sha3_256>(),
        DigestAlgorithm::Sha3_384 => Pkcs1v15Sign::new::<sha3::Sha3_384>(),
        DigestAlgorithm::Sha3_512 => Pkcs1v15Sign::new::<sha3::Sha3_512>(),
        DigestAlgorithm::Shake256 => return Err(Error::UnsupportedAlgorithm("RSA with SHAKE256".to_string())),
    };
    Ok(key.verify(scheme, hashed, sig).is_ok())
}

fn ecdsa_sign(private_key_der: &[u8], hashed: &[u8]) -> Result<Vec<u8>> {
    if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(private_key_der) {
        let sig: p256::ecdsa::Signature =
            key.sign_prehash(hashed).map_err(|e| crypto("ECDSA P-256", e))?;
        return Ok(sig.to_der().as_bytes().to_vec());
    }
    if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_der(private_key_der) {
        let sig: p384::ecdsa::Signature =
            key.sign_prehash(hashed).map_err(|e| crypto("ECDSA P-384", e))?;
        return Ok(sig.to_der().as_bytes().to_vec());
    }
    Err(Error::UnsupportedAlgorithm("ECDSA key on an unsupported curve".to_string()))
}

fn ecdsa_verify(spki: &[u8], hashed: &[u8], sig: &[u8]) -> Result<bool> {
    if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(spki) {
        let Ok(sig) = p256::ecdsa::Signature::from_der(sig) else {
            return Ok(false);
        };
        return Ok(key.verify_prehash(hashed, &sig).is_ok());
    }
    if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(spki) {
        let Ok(sig) = p384::ecdsa::Signature::from_der(sig) else {
            return Ok(false);
        };
        return Ok(key.verify_prehash(hashed, &sig).is_ok());
    }
    Err(Error::UnsupportedAlgorithm("ECDSA key on an unsupported curve".to_string()))
}

impl CryptoProvider for RustCryptoProvider {
    fn name(&self) -> &str {
        "rustcrypto"
    }

    fn digest_reader(&self, algorithm: DigestAlgorithm, reader: &mut dyn Read) -> Result<Vec<u8>> {
        match algorithm {
            DigestAlgorithm::Sha1 => hash_reader::<sha1::Sha1>(reader),
            DigestAlgorithm::Sha256 => hash_reader::<sha2::Sha256>(reader),
            DigestAlgorithm::Sha384 => hash_reader::<sha2::Sha384>(reader),
            DigestAlgorithm::Sha512 => hash_reader::<sha2::Sha512>(reader),
            DigestAlgorithm::Sha3_256 => hash_reader::<sha3::Sha3_256>(reader),
            DigestAlgorithm::Sha3_384 => hash_reader::<sha3::Sha3_384>(reader),
            DigestAlgorithm::Sha3_512 => hash_reader::<sha3::Sha3_512>(reader),
            DigestAlgorithm::Shake256 => shake256_reader(reader),
        }
    }

    fn sign(
        &self,
        private_key_der: &[u8],
        algorithm: SignatureAlgorithm,
        digest: DigestAlgorithm,
        pss: Option<&PssParameters>,
        message: &[u8],
    ) -> Result<Vec<u8>> {
        match algorithm {
            SignatureAlgorithm::RsaPkcs1 => {
                let key = rsa::RsaPrivateKey::from_pkcs8_der(private_key_der)
                    .map_err(|e| crypto("RSA private key", e))?;
                rsa_sign_pkcs1(&key, digest, &self.digest(digest, message)?)
            },
            SignatureAlgorithm::RsaPss => {
                let params = pss.ok_or_else(|| Error::MissingAlgorithmParameters("RSASSA-PSS".to_string()))?;
                let key = rsa::RsaPrivateKey::from_pkcs8_der(private_key_der)
                    .map_err(|e| crypto("RSA private key", e))?;
                let hashed = self.digest(params.digest, message)?;
                let mut rng = rand::thread_rng();
                key.sign_with_rng(&mut rng, pss_scheme(params)?, &hashed)
                    .map_err(|e| crypto("RSASSA-PSS signing", e))
            },
            SignatureAlgorithm::Ecdsa => ecdsa_sign(private_key_der, &self.digest(digest, message)?),
            SignatureAlgorithm::Ed25519 => {
                let key = ed25519_dalek::SigningKey::from_pkcs8_der(private_key_der)
                    .map_err(|e| crypto("Ed25519 private key", e))?;
                Ok(key.sign(message).to_bytes().to_vec())
            },
            SignatureAlgorithm::Ed448 => Err(Error::UnsupportedAlgorithm(format!(
                "Ed448 signing with provider {}",
                self.name()
            ))),
        }
    }

    fn verify(
        &self,
        public_key_info: &[u8],
        algorithm: SignatureAlgorithm,
        digest: DigestAlgorithm,
        pss: Option<&PssParameters>,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        match algorithm {
            SignatureAlgorithm::RsaPkcs1 => {
                let key = rsa::RsaPublicKey::from_public_key_der(public_key_info)
                    .map_err(|e| crypto("RSA public key", e))?;
                rsa_verify_pkcs1(&key, digest, &self.digest(digest, message)?, signature)
            },
            SignatureAlgorithm::RsaPss => {
                let params = pss.ok_or_else(|| Error::MissingAlgorithmParameters("RSASSA-PSS".to_string()))?;
                let key = rsa::RsaPublicKey::from_public_key_der(public_key_info)
                    .map_err(|e| crypto("RSA public key", e))?;
                let hashed = self.digest(params.digest, message)?;
                Ok(key.verify(pss_scheme(params)?, &hashed, signature).is_ok())
            },
            SignatureAlgorithm::Ecdsa => ecdsa_verify(public_key_info, &self.digest(digest, message)?, signature),
            SignatureAlgorithm::Ed25519 => {
                let key = ed25519_dalek::VerifyingKey::from_public_key_der(public_key_info)
                    .map_err(|e| crypto("Ed25519 public key", e))?;
                let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(key.verify(message, &sig).is_ok())
            },
            SignatureAlgorithm::Ed448 => Err(Error::UnsupportedAlgorithm(format!(
                "Ed448 verification with provider {}",
                self.name()
            ))),
        }
    }
}

/// Produces raw signature values over the DER-encoded signed attributes.
pub trait ExternalSigner: Send + Sync {
    /// Mechanism the signer implements.
    fn signature_algorithm(&self) -> SignatureAlgorithm;

    /// Sign `data_to_be_signed`.
    fn sign(&self, data_to_be_signed: &[u8], digest: DigestAlgorithm, pss: Option<&PssParameters>) -> Result<Vec<u8>>;
}

/// Private key material plus the certificates that go with it.
#[derive(Clone)]
pub struct SigningCredentials {
    private_key_der: Vec<u8>,
    certificate_der: Vec<u8>,
    chain_der: Vec<Vec<u8>>,
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("private_key", &"<redacted>")
            .field("certificate_len", &self.certificate_der.len())
            .field("chain_len", &self.chain_der.len())
            .finish()
    }
}

/// Split a PEM file into `(label, der)` blocks.
pub fn pem_blocks(pem: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    Pem::iter_from_buffer(pem)
        .map(|block| {
            block
                .map(|p| (p.label, p.contents))
                .map_err(|e| Error::Certificate(format!("PEM decode: {}", e)))
        })
        .collect()
}

/// Re-encode a PKCS#1 RSA or SEC1 EC private key as PKCS#8. Keys that are
/// already PKCS#8, or that no decoder recognizes, come back unchanged.
fn normalize_private_key(der: Vec<u8>) -> Vec<u8> {
    use pkcs1::DecodeRsaPrivateKey;

    if pkcs8::PrivateKeyInfo::try_from(der.as_slice()).is_ok() {
        return der;
    }
    let encoded = if let Ok(key) = rsa::RsaPrivateKey::from_pkcs1_der(&der) {
        key.to_pkcs8_der()
    } else if let Ok(key) = p256::SecretKey::from_sec1_der(&der) {
        key.to_pkcs8_der()
    } else if let Ok(key) = p384::SecretKey::from_sec1_der(&der) {
        key.to_pkcs8_der()
    } else {
        return der;
    };
    match encoded {
        Ok(doc) => doc.as_bytes().to_vec(),
        Err(e) => {
            log::warn!("Cannot re-encode private key as PKCS#8: {}", e);
            der
        },
    }
}

fn private_key_from_pem(label: &str, der: Vec<u8>) -> Result<Vec<u8>> {
    match label {
        "PRIVATE KEY" | "RSA PRIVATE KEY" | "EC PRIVATE KEY" => Ok(normalize_private_key(der)),
        other => Err(Error::Unsupported(format!("private key PEM label {}", other))),
    }
}

impl SigningCredentials {
    /// Credentials from a DER key and a DER certificate. The key may be
    /// PKCS#8, PKCS#1 (RSA) or SEC1 (P-256, P-384).
    pub fn new(private_key_der: Vec<u8>, certificate_der: Vec<u8>) -> Self {
        Self {
            private_key_der: normalize_private_key(private_key_der),
            certificate_der,
            chain_der: Vec::new(),
        }
    }

    /// Credentials from PEM text. The certificate file may carry the chain
    /// after the signing certificate; the key may be PKCS#8, PKCS#1 or SEC1.
    pub fn from_pem(certificates_pem: &[u8], private_key_pem: &[u8]) -> Result<Self> {
        let mut certs = pem_blocks(certificates_pem)?
            .into_iter()
            .filter(|(label, _)| label == "CERTIFICATE")
            .map(|(_, der)| der);
        let certificate_der = certs
            .next()
            .ok_or_else(|| Error::Certificate("no CERTIFICATE block in PEM".to_string()))?;
        let chain_der: Vec<Vec<u8>> = certs.collect();

        let (label, der) = pem_blocks(private_key_pem)?
            .into_iter()
            .find(|(label, _)| label.ends_with("PRIVATE KEY"))
            .ok_or_else(|| Error::Certificate("no PRIVATE KEY block in PEM".to_string()))?;
        Ok(Self {
            private_key_der: private_key_from_pem(&label, der)?,
            certificate_der,
            chain_der,
        })
    }

    /// Add chain certificates (DER).
    pub fn with_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.chain_der.extend(chain);
        self
    }

    /// Signing certificate (DER).
    pub fn certificate(&self) -> &[u8] {
        &self.certificate_der
    }

    /// Chain certificates (DER).
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain_der
    }

    pub(crate) fn private_key(&self) -> &[u8] {
        &self.private_key_der
    }
}

/// [`ExternalSigner`] over in-memory credentials.
pub struct PrivateKeySigner {
    credentials: SigningCredentials,
    algorithm: SignatureAlgorithm,
    provider: Arc<dyn CryptoProvider>,
}

impl PrivateKeySigner {
    /// Signer for `credentials` using `algorithm`.
    pub fn new(credentials: SigningCredentials, algorithm: SignatureAlgorithm) -> Self {
        Self {
            credentials,
            algorithm,
            provider: default_provider(),
        }
    }

    /// Use a different provider.
    pub fn with_provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.provider = provider;
        self
    }
}

impl ExternalSigner for PrivateKeySigner {
    fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn sign(&self, data_to_be_signed: &[u8], digest: DigestAlgorithm, pss: Option<&PssParameters>) -> Result<Vec<u8>> {
        self.provider
            .sign(self.credentials.private_key(), self.algorithm, digest, pss, data_to_be_signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::identity::CertificateInfo;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    fn spki(cert: &str) -> Vec<u8> {
        CertificateInfo::parse(&fixture(cert)).unwrap().public_key_info().to_vec()
    }

    #[test]
    fn test_digest_lengths() {
        let provider = RustCryptoProvider;
        for alg in DigestAlgorithm::ALL {
            assert_eq!(provider.digest(alg, b"abc").unwrap().len(), alg.output_len(), "{}", alg);
        }
        assert_eq!(
            hex::encode(provider.digest(DigestAlgorithm::Sha256, b"abc").unwrap()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_rsa_pkcs1_sign_verify() {
        let provider = RustCryptoProvider;
        let key = fixture("signer-rsa.key.der");
        let sig = provider
            .sign(&key, SignatureAlgorithm::RsaPkcs1, DigestAlgorithm::Sha256, None, b"message")
            .unwrap();
        let pk = spki("signer-rsa.cer");
        assert!(provider
            .verify(&pk, SignatureAlgorithm::RsaPkcs1, DigestAlgorithm::Sha256, None, b"message", &sig)
            .unwrap());
        assert!(!provider
            .verify(&pk, SignatureAlgorithm::RsaPkcs1, DigestAlgorithm::Sha256, None, b"other", &sig)
            .unwrap());
    }

    #[test]
    fn test_rsa_pss_sign_verify() {
        let provider = RustCryptoProvider;
        let params = PssParameters::for_digest(DigestAlgorithm::Sha256);
        let sig = provider
            .sign(
                &fixture("signer-rsa.key.der"),
                SignatureAlgorithm::RsaPss,
                DigestAlgorithm::Sha256,
                Some(&params),
                b"message",
            )
            .unwrap();
        assert!(provider
            .verify(
                &spki("signer-rsa.cer"),
                SignatureAlgorithm::RsaPss,
                DigestAlgorithm::Sha256,
                Some(&params),
                b"message",
                &sig
            )
            .unwrap());
    }

    #[test]
    fn test_ecdsa_and_ed25519() {
        let provider = RustCryptoProvider;
        let sig = provider
            .sign(&fixture("signer-p256.key.der"), SignatureAlgorithm::Ecdsa, DigestAlgorithm::Sha256, None, b"m")
            .unwrap();
        assert!(provider
            .verify(&spki("signer-p256.cer"), SignatureAlgorithm::Ecdsa, DigestAlgorithm::Sha256, None, b"m", &sig)
            .unwrap());

        let sig = provider
            .sign(&fixture("signer-ed25519.key.der"), SignatureAlgorithm::Ed25519, DigestAlgorithm::Sha512, None, b"m")
            .unwrap();
        assert_eq!(sig.len(), 64);
        assert!(provider
            .verify(&spki("signer-ed25519.cer"), SignatureAlgorithm::Ed25519, DigestAlgorithm::Sha512, None, b"m", &sig)
            .unwrap());
    }

    #[test]
    fn test_ed448_unsupported() {
        let provider = RustCryptoProvider;
        let err = provider
            .sign(b"", SignatureAlgorithm::Ed448, DigestAlgorithm::Shake256, None, b"m")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_credentials_from_pem() {
        let creds = SigningCredentials::from_pem(&fixture("signer-rsa.pem"), &fixture("signer-rsa.key")).unwrap();
        assert_eq!(creds.certificate(), fixture("signer-rsa.cer").as_slice());
        assert_eq!(creds.private_key(), fixture("signer-rsa.key.der").as_slice());
        let debug = format!("{:?}", creds);
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_pkcs1_and_sec1_keys_are_normalized() {
        use pkcs1::EncodeRsaPrivateKey;

        let provider = RustCryptoProvider;
        let pkcs8_rsa = fixture("signer-rsa.key.der");
        let pkcs1_rsa = rsa::RsaPrivateKey::from_pkcs8_der(&pkcs8_rsa)
            .unwrap()
            .to_pkcs1_der()
            .unwrap()
            .as_bytes()
            .to_vec();
        assert_ne!(pkcs1_rsa, pkcs8_rsa);
        let creds = SigningCredentials::new(pkcs1_rsa, fixture("signer-rsa.cer"));
        let sig = PrivateKeySigner::new(creds, SignatureAlgorithm::RsaPkcs1)
            .sign(b"message", DigestAlgorithm::Sha256, None)
            .unwrap();
        assert!(provider
            .verify(&spki("signer-rsa.cer"), SignatureAlgorithm::RsaPkcs1, DigestAlgorithm::Sha256, None, b"message", &sig)
            .unwrap());

        let sec1_ec = p256::SecretKey::from_pkcs8_der(&fixture("signer-p256.key.der"))
            .unwrap()
            .to_sec1_der()
            .unwrap()
            .to_vec();
        let creds = SigningCredentials::new(sec1_ec, fixture("signer-p256.cer"));
        assert!(pkcs8::PrivateKeyInfo::try_from(creds.private_key()).is_ok());
        let sig = PrivateKeySigner::new(creds, SignatureAlgorithm::Ecdsa)
            .sign(b"m", DigestAlgorithm::Sha256, None)
            .unwrap();
        assert!(provider
            .verify(&spki("signer-p256.cer"), SignatureAlgorithm::Ecdsa, DigestAlgorithm::Sha256, None, b"m", &sig)
            .unwrap());
    }

    #[test]
    fn test_unrecognized_key_is_kept() {
        let creds = SigningCredentials::new(vec![0x30, 0x00], fixture("signer-rsa.cer"));
        assert_eq!(creds.private_key(), [0x30u8, 0x00].as_slice());
        let err = PrivateKeySigner::new(creds, SignatureAlgorithm::RsaPkcs1)
            .sign(b"m", DigestAlgorithm::Sha256, None)
            .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_pem_blocks_multiple() {
        let mut pem = fixture("signer-rsa.pem");
        pem.extend(fixture("root.pem"));
        let blocks = pem_blocks(&pem).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].1, fixture("root.cer"));
    }

    #[test]
    fn test_pem_blocks_skip_surrounding_text() {
        let mut pem = b"Bag Attributes\n    friendlyName: signer\n".to_vec();
        pem.extend(fixture("signer-rsa.pem"));
        pem.extend(b"trailing notes\n");
        let blocks = pem_blocks(&pem).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].0, "CERTIFICATE");
        assert_eq!(blocks[0].1, fixture("signer-rsa.cer"));
        assert!(pem_blocks(b"no armor here").unwrap().is_empty());
    }
}
