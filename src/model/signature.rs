//! RSA-PSS signatures over SHA-512, shared by both servers.
//!
//! Signatures travel as standard base64. Verification never panics on
//! malformed input: anything that is not a valid signature for the payload
//! is reported as a [`SignatureError`].

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use data_encoding::BASE64;
use rsa::{
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, LineEnding},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey},
    pss::{BlindedSigningKey, Signature as PssSignature, VerifyingKey},
    signature::{RandomizedSigner, SignatureEncoding, Verifier as _},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;

/// Smallest modulus that can hold a PSS encoding of a SHA-512 digest with a
/// digest-sized salt, rounded up to a sensible size.
pub const MIN_KEY_BITS: usize = 1536;

/// A base64-encoded signature, as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Signature {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl From<&str> for Signature {
    fn from(encoded: &str) -> Self {
        Self(encoded.to_string())
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Problems with key material. These are configuration errors and abort startup.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to read key file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Key is not a PEM-encoded RSA key")]
    Parse,
    #[error("Key is too small: {0} bits, need at least {MIN_KEY_BITS}")]
    TooSmall(usize),
    #[error("Failed to generate or encode key: {0}")]
    Generation(String),
}

/// Reasons a signature fails to verify.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is not valid base64")]
    Encoding,
    #[error("signature is malformed")]
    Malformed,
    #[error("signature does not match the payload")]
    Mismatch,
}

/// Private half: produces signatures.
pub struct Signer {
    key: BlindedSigningKey<Sha512>,
    public: RsaPublicKey,
}

impl Signer {
    /// Parse a PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|_| KeyError::Parse)?;
        let bits = private.size() * 8;
        if bits < MIN_KEY_BITS {
            return Err(KeyError::TooSmall(bits));
        }
        let public = RsaPublicKey::from(&private);
        Ok(Self {
            key: BlindedSigningKey::new(private),
            public,
        })
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        Self::from_pem(&read_key_file(path.as_ref())?)
    }

    /// Sign the payload. Only fails if the key material itself is broken.
    pub fn sign(&self, payload: &[u8]) -> Result<Signature, rsa::signature::Error> {
        let mut rng = rand::thread_rng();
        let signature: PssSignature = self.key.try_sign_with_rng(&mut rng, payload)?;
        Ok(Signature(BASE64.encode(&signature.to_bytes())))
    }

    /// A verifier for signatures made by this signer.
    pub fn verifier(&self) -> Verifier {
        Verifier::new(self.public.clone())
    }
}

/// Public half: checks signatures made by the pinned counterpart key.
pub struct Verifier {
    key: VerifyingKey<Sha512>,
}

impl Verifier {
    fn new(public: RsaPublicKey) -> Self {
        Self {
            key: VerifyingKey::new(public),
        }
    }

    /// Parse a SubjectPublicKeyInfo (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let public = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|_| KeyError::Parse)?;
        Ok(Self::new(public))
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        Self::from_pem(&read_key_file(path.as_ref())?)
    }

    pub fn verify(&self, payload: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        let bytes = BASE64
            .decode(signature.as_str().as_bytes())
            .map_err(|_| SignatureError::Encoding)?;
        let signature =
            PssSignature::try_from(bytes.as_slice()).map_err(|_| SignatureError::Malformed)?;
        self.key
            .verify(payload, &signature)
            .map_err(|_| SignatureError::Mismatch)
    }
}

fn read_key_file(path: &Path) -> Result<String, KeyError> {
    fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Generate a fresh keypair, returning `(private PKCS#1 PEM, public SPKI PEM)`.
pub fn generate_keypair(bits: usize) -> Result<(String, String), KeyError> {
    if bits < MIN_KEY_BITS {
        return Err(KeyError::TooSmall(bits));
    }
    let mut rng = rand::thread_rng();
    let private =
        RsaPrivateKey::new(&mut rng, bits).map_err(|e| KeyError::Generation(e.to_string()))?;
    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    let public_pem = RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    Ok(((*private_pem).clone(), public_pem))
}
