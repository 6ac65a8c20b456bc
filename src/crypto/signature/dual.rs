// ABOUTME: Dual-signature signer and verifier over a classical and a post-quantum scheme
// ABOUTME: Both halves must verify; the outcome never reveals which half failed
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::{SignatureScheme, SigningScheme};
use qtoken_core::errors::{AppError, AppResult};
use std::sync::Arc;

/// Produces `classical_sig ‖ post_quantum_sig`
#[derive(Clone)]
pub struct DualSigner {
    classical: Arc<dyn SigningScheme>,
    post_quantum: Arc<dyn SigningScheme>,
}

impl DualSigner {
    /// Combine two signing schemes
    #[must_use]
    pub fn new(classical: Arc<dyn SigningScheme>, post_quantum: Arc<dyn SigningScheme>) -> Self {
        Self {
            classical,
            post_quantum,
        }
    }

    /// Total signature length
    #[must_use]
    pub fn signature_len(&self) -> usize {
        self.classical.signature_len() + self.post_quantum.signature_len()
    }

    /// Sign `message` with both schemes
    ///
    /// # Errors
    ///
    /// Returns an error if either scheme fails or yields an unexpected length
    pub fn sign(&self, message: &[u8]) -> AppResult<Vec<u8>> {
        let classical = self.classical.sign(message)?;
        let post_quantum = self.post_quantum.sign(message)?;

        if classical.len() != self.classical.signature_len()
            || post_quantum.len() != self.post_quantum.signature_len()
        {
            return Err(AppError::internal("signature scheme produced unexpected length"));
        }

        let mut combined = Vec::with_capacity(self.signature_len());
        combined.extend_from_slice(&classical);
        combined.extend_from_slice(&post_quantum);
        Ok(combined)
    }
}

/// Verifies `classical_sig ‖ post_quantum_sig`
#[derive(Clone)]
pub struct DualVerifier {
    classical: Arc<dyn SignatureScheme>,
    post_quantum: Arc<dyn SignatureScheme>,
}

impl DualVerifier {
    /// Combine two verification schemes
    #[must_use]
    pub fn new(
        classical: Arc<dyn SignatureScheme>,
        post_quantum: Arc<dyn SignatureScheme>,
    ) -> Self {
        Self {
            classical,
            post_quantum,
        }
    }

    /// Total signature length
    #[must_use]
    pub fn signature_len(&self) -> usize {
        self.classical.signature_len() + self.post_quantum.signature_len()
    }

    /// Classical public key bytes
    #[must_use]
    pub fn classical(&self) -> &Arc<dyn SignatureScheme> {
        &self.classical
    }

    /// Post-quantum public key bytes
    #[must_use]
    pub fn post_quantum(&self) -> &Arc<dyn SignatureScheme> {
        &self.post_quantum
    }

    /// Verify both halves; true only if both verify
    ///
    /// Both verifications always run so that timing does not reveal which half failed.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        if signature.len() != self.signature_len() {
            return false;
        }
        let (classical, post_quantum) = signature.split_at(self.classical.signature_len());

        let classical_ok = self.classical.verify(message, classical);
        let post_quantum_ok = self.post_quantum.verify(message, post_quantum);
        classical_ok & post_quantum_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signature::{Ed25519Signer, MlDsa65Signer};

    fn pair() -> (DualSigner, DualVerifier) {
        let classical = Ed25519Signer::generate();
        let post_quantum = MlDsa65Signer::generate();
        let verifier = DualVerifier::new(
            Arc::new(classical.verifier()),
            Arc::new(post_quantum.verifier()),
        );
        let signer = DualSigner::new(Arc::new(classical), Arc::new(post_quantum));
        (signer, verifier)
    }

    #[test]
    fn test_both_halves_required() {
        let (signer, verifier) = pair();
        let signature = signer.sign(b"msg").unwrap();
        assert_eq!(signature.len(), 64 + 3309);
        assert!(verifier.verify(b"msg", &signature));

        // Corrupt only the classical half
        let mut bad_classical = signature.clone();
        bad_classical[0] ^= 0xff;
        assert!(!verifier.verify(b"msg", &bad_classical));

        // Corrupt only the post-quantum half
        let mut bad_pq = signature.clone();
        let last = bad_pq.len() - 1;
        bad_pq[last] ^= 0xff;
        assert!(!verifier.verify(b"msg", &bad_pq));

        assert!(!verifier.verify(b"msg", &signature[..64]));
    }
}
