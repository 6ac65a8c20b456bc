// ABOUTME: ML-DSA-65 instance of the signature scheme capability
// ABOUTME: Post-quantum half of the dual signature; the signing key wipes itself on drop
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use super::{SignatureAlgorithm, SignatureScheme, SigningScheme};
use ml_dsa::signature::{SignatureEncoding, Signer, Verifier};
use ml_dsa::{
    EncodedSignature, EncodedSigningKey, EncodedVerifyingKey, KeyGen, MlDsa65, Signature,
    SigningKey, VerifyingKey,
};
use qtoken_core::constants::signatures::{ML_DSA_65_PUBLIC_KEY_LEN, ML_DSA_65_SIGNATURE_LEN};
use qtoken_core::errors::{AppError, AppResult};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// ML-DSA-65 public key wrapper
#[derive(Clone)]
pub struct MlDsa65Verifier {
    key: VerifyingKey<MlDsa65>,
}

impl MlDsa65Verifier {
    /// Decode an encoded ML-DSA-65 public key
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes have the wrong length
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let encoded = EncodedVerifyingKey::<MlDsa65>::try_from(bytes).map_err(|_| {
            AppError::config_invalid(format!(
                "ML-DSA-65 public key must be {ML_DSA_65_PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            key: VerifyingKey::<MlDsa65>::decode(&encoded),
        })
    }
}

impl SignatureScheme for MlDsa65Verifier {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::MlDsa65
    }

    fn signature_len(&self) -> usize {
        ML_DSA_65_SIGNATURE_LEN
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.key.encode().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(encoded) = EncodedSignature::<MlDsa65>::try_from(signature) else {
            return false;
        };
        let Some(signature) = Signature::<MlDsa65>::decode(&encoded) else {
            return false;
        };
        Verifier::verify(&self.key, message, &signature).is_ok()
    }
}

/// ML-DSA-65 signing key
///
/// `SigningKey` wipes its secret vectors on drop. Encoded copies of the secret only
/// ever live in zeroizing buffers.
pub struct MlDsa65Signer {
    signing_key: SigningKey<MlDsa65>,
    verifier: MlDsa65Verifier,
}

impl MlDsa65Signer {
    /// Generate a fresh key pair from the OS RNG
    #[must_use]
    pub fn generate() -> Self {
        let keypair = MlDsa65::key_gen(&mut OsRng);
        Self {
            signing_key: keypair.signing_key().clone(),
            verifier: MlDsa65Verifier {
                key: keypair.verifying_key().clone(),
            },
        }
    }

    /// Restore from encoded secret and public key bytes
    ///
    /// # Errors
    ///
    /// Returns an error if either encoding has the wrong length
    pub fn from_encoded(secret: &[u8], public: &[u8]) -> AppResult<Self> {
        let encoded = EncodedSigningKey::<MlDsa65>::try_from(secret)
            .map(Zeroizing::new)
            .map_err(|_| {
                AppError::config_invalid(format!(
                    "ML-DSA-65 secret key has invalid length {}",
                    secret.len()
                ))
            })?;
        let verifier = MlDsa65Verifier::from_bytes(public)?;
        Ok(Self {
            signing_key: SigningKey::<MlDsa65>::decode(&encoded),
            verifier,
        })
    }

    /// Encoded secret key bytes
    #[must_use]
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        let encoded = Zeroizing::new(self.signing_key.encode());
        Zeroizing::new(encoded.to_vec())
    }

    /// Public half of this key
    #[must_use]
    pub fn verifier(&self) -> MlDsa65Verifier {
        self.verifier.clone()
    }
}

impl SignatureScheme for MlDsa65Signer {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::MlDsa65
    }

    fn signature_len(&self) -> usize {
        ML_DSA_65_SIGNATURE_LEN
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.verifier.public_key_bytes()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.verifier.verify(message, signature)
    }
}

impl SigningScheme for MlDsa65Signer {
    fn sign(&self, message: &[u8]) -> AppResult<Vec<u8>> {
        let signature = Signer::try_sign(&self.signing_key, message)
            .map_err(|e| AppError::internal(format!("ML-DSA-65 signing failed: {e}")))?;
        Ok(AsRef::<[u8]>::as_ref(&signature.to_bytes()).to_vec())
    }
}
