// ABOUTME: XChaCha20-Poly1305 payload encryption bound to the token header as associated data
// ABOUTME: Produces nonce ‖ ciphertext ‖ tag and refuses any plaintext fallback on failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use qtoken_core::constants::wire::{NONCE_LEN, SYMMETRIC_KEY_LEN, TAG_LEN};
use qtoken_core::errors::{AppError, AppResult, ErrorCode};
use rand::RngCore;
use zeroize::Zeroizing;

/// Symmetric payload cipher
///
/// The key lives in a zeroizing buffer; the cipher instance is rebuilt per call so no
/// expanded key state outlives an operation.
pub struct PayloadCipher {
    key: Zeroizing<[u8; SYMMETRIC_KEY_LEN]>,
}

impl PayloadCipher {
    /// Create a cipher over an existing key
    #[must_use]
    pub fn new(key: Zeroizing<[u8; SYMMETRIC_KEY_LEN]>) -> Self {
        Self { key }
    }

    /// Generate a random 256-bit key
    #[must_use]
    pub fn generate_key() -> Zeroizing<[u8; SYMMETRIC_KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
        rand::thread_rng().fill_bytes(key.as_mut());
        key
    }

    /// Raw key bytes
    #[must_use]
    pub fn key_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.key
    }

    /// Encrypt `plaintext`, authenticating `associated_data`
    ///
    /// # Errors
    ///
    /// Returns an error if the AEAD implementation fails
    pub fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> AppResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        self.encrypt_with_nonce(&nonce_bytes, plaintext, associated_data)
    }

    fn encrypt_with_nonce(
        &self,
        nonce_bytes: &[u8; NONCE_LEN],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> AppResult<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(self.key.as_ref()));
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| AppError::internal("payload encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt `nonce ‖ ciphertext ‖ tag`, checking `associated_data`
    ///
    /// # Errors
    ///
    /// Returns `payload-decryption-failed` when the input is too short or authentication
    /// fails
    pub fn decrypt(&self, sealed: &[u8], associated_data: &[u8]) -> AppResult<Zeroizing<Vec<u8>>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(AppError::from_code(ErrorCode::PayloadDecryptionFailed));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = XChaCha20Poly1305::new(Key::from_slice(self.key.as_ref()));
        cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| AppError::from_code(ErrorCode::PayloadDecryptionFailed))
    }
}

impl Clone for PayloadCipher {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
        }
    }
}
