// ABOUTME: Ed25519 instance of the signature scheme capability
// ABOUTME: Used as the classical half of the dual signature and for client proofs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::{SignatureAlgorithm, SignatureScheme, SigningScheme};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use qtoken_core::constants::signatures::{ED25519_PUBLIC_KEY_LEN, ED25519_SIGNATURE_LEN};
use qtoken_core::errors::{AppError, AppResult};
use rand::rngs::OsRng;

/// Ed25519 public key wrapper
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Wrap an existing verifying key
    #[must_use]
    pub const fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Decode a 32-byte public key
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Ed25519 point
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let array: [u8; ED25519_PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            AppError::config_invalid(format!(
                "Ed25519 public key must be {ED25519_PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        let key = VerifyingKey::from_bytes(&array)
            .map_err(|e| AppError::config_invalid(format!("Invalid Ed25519 public key: {e}")))?;
        Ok(Self { key })
    }
}

impl SignatureScheme for Ed25519Verifier {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn signature_len(&self) -> usize {
        ED25519_SIGNATURE_LEN
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.key.as_bytes().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        Signature::from_slice(signature)
            .is_ok_and(|signature| self.key.verify_strict(message, &signature).is_ok())
    }
}

/// Ed25519 signing key; zeroized on drop by `ed25519-dalek`
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a fresh key from the OS RNG
    #[must_use]
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore from a 32-byte secret
    ///
    /// # Errors
    ///
    /// Returns an error if the secret has the wrong length
    pub fn from_secret_bytes(bytes: &[u8]) -> AppResult<Self> {
        let secret: &[u8; 32] = bytes.try_into().map_err(|_| {
            AppError::config_invalid(format!(
                "Ed25519 secret key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(secret),
        })
    }

    /// Secret key bytes (caller is responsible for zeroizing the copy)
    #[must_use]
    pub fn secret_bytes(&self) -> zeroize::Zeroizing<[u8; 32]> {
        zeroize::Zeroizing::new(self.key.to_bytes())
    }

    /// Public half of this key
    #[must_use]
    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier::new(self.key.verifying_key())
    }
}

impl SignatureScheme for Ed25519Signer {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn signature_len(&self) -> usize {
        ED25519_SIGNATURE_LEN
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.key.verifying_key().as_bytes().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.verifier().verify(message, signature)
    }
}

impl SigningScheme for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> AppResult<Vec<u8>> {
        let signature = self
            .key
            .try_sign(message)
            .map_err(|e| AppError::internal(format!("Ed25519 signing failed: {e}")))?;
        Ok(signature.to_bytes().to_vec())
    }
}
