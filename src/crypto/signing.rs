//! Ed25519 bundle signing and verification.
//!
//! Bundles are signed over the SHA-512 digest of their canonical bytes.
//! Signatures are 64 bytes, rendered as 128 lowercase hex characters;
//! public keys are 32 bytes, rendered as 64 lowercase hex characters.

use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
use rand::rngs::OsRng;

use crate::crypto::hash::Hash512;

/// Ed25519 signature (64 bytes)
pub type Signature64 = [u8; SIGNATURE_LENGTH];

/// Ed25519 public key (32 bytes)
pub type PublicKey32 = [u8; PUBLIC_KEY_LENGTH];

/// Ed25519 secret key seed (32 bytes)
pub type SecretKey32 = [u8; SECRET_KEY_LENGTH];

/// Error type for signing operations
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid signature format")]
    InvalidSignatureFormat,

    #[error("invalid public key format")]
    InvalidPublicKeyFormat,

    #[error("invalid secret key format")]
    InvalidSecretKeyFormat,

    #[error("signature verification failed")]
    VerificationFailed,
}

/// Bundle signing keypair.
#[derive(Clone)]
pub struct BundleSigningKey {
    signing_key: SigningKey,
}

impl BundleSigningKey {
    /// Generate a new random signing key
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from secret key seed bytes
    pub fn from_bytes(bytes: &SecretKey32) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Parse from a 64-character hex seed
    pub fn from_hex(hex_str: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(hex_str).map_err(|_| SigningError::InvalidSecretKeyFormat)?;
        let seed: SecretKey32 = bytes
            .try_into()
            .map_err(|_| SigningError::InvalidSecretKeyFormat)?;
        Ok(Self::from_bytes(&seed))
    }

    /// Get the secret key seed bytes
    pub fn to_bytes(&self) -> SecretKey32 {
        self.signing_key.to_bytes()
    }

    /// Get the verifying key
    pub fn public_key(&self) -> BundleVerifyingKey {
        BundleVerifyingKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> PublicKey32 {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Public key as 64 lowercase hex characters
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Sign a bundle digest (SHA-512 of the canonical bytes)
    pub fn sign_digest(&self, digest: &Hash512) -> Signature64 {
        self.signing_key.sign(digest).to_bytes()
    }
}

impl std::fmt::Debug for BundleSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleSigningKey")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Bundle verifying key.
#[derive(Clone)]
pub struct BundleVerifyingKey {
    verifying_key: VerifyingKey,
}

impl BundleVerifyingKey {
    /// Create from public key bytes
    pub fn from_bytes(bytes: &PublicKey32) -> Result<Self, SigningError> {
        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|_| SigningError::InvalidPublicKeyFormat)?;
        Ok(Self { verifying_key })
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, SigningError> {
        let key = public_key_from_hex(hex_str)?;
        Self::from_bytes(&key)
    }

    /// Get the public key bytes
    pub fn to_bytes(&self) -> PublicKey32 {
        self.verifying_key.to_bytes()
    }

    /// Verify a signature over a bundle digest
    pub fn verify(&self, digest: &Hash512, signature: &Signature64) -> Result<(), SigningError> {
        let sig = Signature::from_bytes(signature);
        self.verifying_key
            .verify(digest, &sig)
            .map_err(|_| SigningError::VerificationFailed)
    }
}

impl std::fmt::Debug for BundleVerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleVerifyingKey")
            .field("public_key", &hex::encode(self.to_bytes()))
            .finish()
    }
}

/// Render a signature as 128 lowercase hex characters
pub fn signature_to_hex(signature: &Signature64) -> String {
    hex::encode(signature)
}

/// Parse a signature from hex; rejects wrong length or non-hex input
pub fn signature_from_hex(hex_str: &str) -> Result<Signature64, SigningError> {
    let bytes = hex::decode(hex_str).map_err(|_| SigningError::InvalidSignatureFormat)?;
    bytes
        .try_into()
        .map_err(|_| SigningError::InvalidSignatureFormat)
}

/// Render a public key as 64 lowercase hex characters
pub fn public_key_to_hex(public_key: &PublicKey32) -> String {
    hex::encode(public_key)
}

/// Parse a public key from hex
pub fn public_key_from_hex(hex_str: &str) -> Result<PublicKey32, SigningError> {
    let bytes = hex::decode(hex_str).map_err(|_| SigningError::InvalidPublicKeyFormat)?;
    bytes
        .try_into()
        .map_err(|_| SigningError::InvalidPublicKeyFormat)
}
