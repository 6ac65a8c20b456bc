// ABOUTME: Issuer key management: dual signing keys, payload key and stable key identifier
// ABOUTME: Provides key generation, key-file import/export and public verification material
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

//! Issuer key management
//!
//! [`IssuerKeys`] is owned exclusively by the issuing process. Resource servers receive
//! [`VerificationKeys`]: the two public keys plus the payload key needed to decrypt
//! claims, but never the signing secrets.

use super::aead::PayloadCipher;
use super::hash::{sha256_concat, Hash32};
use super::signature::{
    DualSigner, DualVerifier, Ed25519Signer, Ed25519Verifier, MlDsa65Signer, MlDsa65Verifier,
    SignatureAlgorithm, SignatureScheme,
};
use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Utc};
use qtoken_core::constants::wire::SYMMETRIC_KEY_LEN;
use qtoken_core::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroizing;

/// Derive the key identifier from the public key material
#[must_use]
pub fn derive_key_id(classical_public: &[u8], post_quantum_public: &[u8]) -> Hash32 {
    sha256_concat(&[classical_public, post_quantum_public])
}

/// Issuer signing and encryption keys
///
/// Every secret is held in a type that overwrites itself on drop (`ed25519-dalek`'s
/// `ZeroizeOnDrop` signing key, `Zeroizing` buffers), so release happens on every exit
/// path including early returns and panics.
pub struct IssuerKeys {
    key_id: Hash32,
    classical: Arc<Ed25519Signer>,
    post_quantum: Arc<MlDsa65Signer>,
    cipher: PayloadCipher,
    created_at: DateTime<Utc>,
}

impl IssuerKeys {
    /// Generate a fresh set of issuer keys
    #[must_use]
    pub fn generate() -> Self {
        let classical = Ed25519Signer::generate();
        let post_quantum = MlDsa65Signer::generate();
        let cipher = PayloadCipher::new(PayloadCipher::generate_key());
        let keys = Self::assemble(classical, post_quantum, cipher, Utc::now());

        info!(key_id = %keys.key_id_hex(), "Generated new issuer key set");
        keys
    }

    fn assemble(
        classical: Ed25519Signer,
        post_quantum: MlDsa65Signer,
        cipher: PayloadCipher,
        created_at: DateTime<Utc>,
    ) -> Self {
        let key_id = derive_key_id(
            &classical.public_key_bytes(),
            &post_quantum.public_key_bytes(),
        );
        Self {
            key_id,
            classical: Arc::new(classical),
            post_quantum: Arc::new(post_quantum),
            cipher,
            created_at,
        }
    }

    /// Stable key identifier
    #[must_use]
    pub const fn key_id(&self) -> &Hash32 {
        &self.key_id
    }

    /// Hex-encoded key identifier for logs
    #[must_use]
    pub fn key_id_hex(&self) -> String {
        hex::encode(self.key_id)
    }

    /// When these keys were generated
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Dual signer over both secret keys
    #[must_use]
    pub fn signer(&self) -> DualSigner {
        DualSigner::new(self.classical.clone(), self.post_quantum.clone())
    }

    /// Payload cipher
    #[must_use]
    pub const fn cipher(&self) -> &PayloadCipher {
        &self.cipher
    }

    /// Public verification material for resource servers
    #[must_use]
    pub fn verification_keys(&self) -> VerificationKeys {
        VerificationKeys {
            key_id: self.key_id,
            classical: Arc::new(self.classical.verifier()),
            post_quantum: Arc::new(self.post_quantum.verifier()),
            cipher: self.cipher.clone(),
        }
    }

    /// Export to the JSON key-file representation (contains secrets)
    #[must_use]
    pub fn to_key_file(&self) -> IssuerKeyFile {
        let engine = general_purpose::STANDARD;
        IssuerKeyFile {
            key_id: self.key_id_hex(),
            created_at: self.created_at,
            classical: KeyFileEntry {
                algorithm: SignatureAlgorithm::Ed25519,
                public_key: engine.encode(self.classical.public_key_bytes()),
                secret_key: Some(engine.encode(&*self.classical.secret_bytes())),
            },
            post_quantum: KeyFileEntry {
                algorithm: SignatureAlgorithm::MlDsa65,
                public_key: engine.encode(self.post_quantum.public_key_bytes()),
                secret_key: Some(engine.encode(self.post_quantum.secret_bytes().as_slice())),
            },
            encryption_key: engine.encode(self.cipher.key_bytes()),
        }
    }

    /// Import from the JSON key-file representation
    ///
    /// # Errors
    ///
    /// Returns an error if any field is missing, mis-encoded, has the wrong length, or if
    /// the recorded key id does not match the public keys
    pub fn from_key_file(file: &IssuerKeyFile) -> AppResult<Self> {
        let classical_secret = decode_secret(file.classical.secret_key.as_deref(), "classical")?;
        let classical = Ed25519Signer::from_secret_bytes(&classical_secret)?;
        if classical.public_key_bytes() != decode_b64(&file.classical.public_key, "classical")? {
            return Err(AppError::config_invalid(
                "classical public key does not match its secret key",
            ));
        }

        let pq_secret = decode_secret(file.post_quantum.secret_key.as_deref(), "post-quantum")?;
        let pq_public = decode_b64(&file.post_quantum.public_key, "post-quantum")?;
        let post_quantum = MlDsa65Signer::from_encoded(&pq_secret, &pq_public)?;

        let cipher = PayloadCipher::new(decode_symmetric(&file.encryption_key)?);
        let keys = Self::assemble(classical, post_quantum, cipher, file.created_at);

        if keys.key_id_hex() != file.key_id {
            return Err(AppError::config_invalid(
                "key file key_id does not match its public keys",
            ));
        }
        Ok(keys)
    }

    /// Load issuer keys from a JSON key file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read key file {}: {e}", path.display()))
        })?);
        let file: IssuerKeyFile = serde_json::from_str(&raw)?;
        let keys = Self::from_key_file(&file)?;
        info!(key_id = %keys.key_id_hex(), "Loaded issuer keys from key file");
        Ok(keys)
    }
}

impl fmt::Debug for IssuerKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerKeys")
            .field("key_id", &self.key_id_hex())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Public verification material held by resource servers
#[derive(Clone)]
pub struct VerificationKeys {
    key_id: Hash32,
    classical: Arc<dyn SignatureScheme>,
    post_quantum: Arc<dyn SignatureScheme>,
    cipher: PayloadCipher,
}

impl VerificationKeys {
    /// Assemble from arbitrary scheme instances
    ///
    /// The key id is derived from the schemes' public keys.
    #[must_use]
    pub fn new(
        classical: Arc<dyn SignatureScheme>,
        post_quantum: Arc<dyn SignatureScheme>,
        cipher: PayloadCipher,
    ) -> Self {
        let key_id = derive_key_id(
            &classical.public_key_bytes(),
            &post_quantum.public_key_bytes(),
        );
        Self {
            key_id,
            classical,
            post_quantum,
            cipher,
        }
    }

    /// Key identifier the tokens must carry
    #[must_use]
    pub const fn key_id(&self) -> &Hash32 {
        &self.key_id
    }

    /// Dual verifier over both public keys
    #[must_use]
    pub fn verifier(&self) -> DualVerifier {
        DualVerifier::new(self.classical.clone(), self.post_quantum.clone())
    }

    /// Payload cipher
    #[must_use]
    pub const fn cipher(&self) -> &PayloadCipher {
        &self.cipher
    }

    /// Export as a key file without signing secrets
    #[must_use]
    pub fn to_key_file(&self) -> VerificationKeyFile {
        let engine = general_purpose::STANDARD;
        VerificationKeyFile {
            key_id: hex::encode(self.key_id),
            classical: KeyFileEntry {
                algorithm: self.classical.algorithm(),
                public_key: engine.encode(self.classical.public_key_bytes()),
                secret_key: None,
            },
            post_quantum: KeyFileEntry {
                algorithm: self.post_quantum.algorithm(),
                public_key: engine.encode(self.post_quantum.public_key_bytes()),
                secret_key: None,
            },
            encryption_key: engine.encode(self.cipher.key_bytes()),
        }
    }

    /// Import from a verification key file
    ///
    /// # Errors
    ///
    /// Returns an error if a key is mis-encoded, uses an unsupported algorithm, or the key
    /// id does not match
    pub fn from_key_file(file: &VerificationKeyFile) -> AppResult<Self> {
        let classical = public_scheme(&file.classical)?;
        let post_quantum = public_scheme(&file.post_quantum)?;
        let cipher = PayloadCipher::new(decode_symmetric(&file.encryption_key)?);
        let keys = Self::new(classical, post_quantum, cipher);

        if hex::encode(keys.key_id) != file.key_id {
            return Err(AppError::config_invalid(
                "key file key_id does not match its public keys",
            ));
        }
        Ok(keys)
    }

    /// Load verification keys from a JSON key file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read key file {}: {e}", path.display()))
        })?;
        let file: VerificationKeyFile = serde_json::from_str(&raw)?;
        Self::from_key_file(&file)
    }
}

impl fmt::Debug for VerificationKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKeys")
            .field("key_id", &hex::encode(self.key_id))
            .field("classical", &self.classical.algorithm())
            .field("post_quantum", &self.post_quantum.algorithm())
            .finish_non_exhaustive()
    }
}

/// One signature key inside a key file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFileEntry {
    /// Signature algorithm
    pub algorithm: SignatureAlgorithm,
    /// Public key (Base64 encoded)
    pub public_key: String,
    /// Secret key (Base64 encoded); absent in verification key files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

/// Issuer key file (contains secrets)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerKeyFile {
    /// Hex key identifier
    pub key_id: String,
    /// When the keys were generated
    pub created_at: DateTime<Utc>,
    /// Classical signing key
    pub classical: KeyFileEntry,
    /// Post-quantum signing key
    pub post_quantum: KeyFileEntry,
    /// Payload encryption key (Base64 encoded)
    pub encryption_key: String,
}

/// Verification key file distributed to resource servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationKeyFile {
    /// Hex key identifier
    pub key_id: String,
    /// Classical public key
    pub classical: KeyFileEntry,
    /// Post-quantum public key
    pub post_quantum: KeyFileEntry,
    /// Payload decryption key (Base64 encoded)
    pub encryption_key: String,
}

fn decode_b64(value: &str, what: &str) -> AppResult<Vec<u8>> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|e| AppError::config_invalid(format!("invalid base64 in {what} key: {e}")))
}

fn decode_secret(value: Option<&str>, what: &str) -> AppResult<Zeroizing<Vec<u8>>> {
    let value = value.ok_or_else(|| AppError::config(format!("{what} secret key missing")))?;
    decode_b64(value, what).map(Zeroizing::new)
}

fn decode_symmetric(value: &str) -> AppResult<Zeroizing<[u8; SYMMETRIC_KEY_LEN]>> {
    let bytes = Zeroizing::new(decode_b64(value, "encryption")?);
    if bytes.len() != SYMMETRIC_KEY_LEN {
        return Err(AppError::config_invalid(format!(
            "encryption key must be exactly {SYMMETRIC_KEY_LEN} bytes, got {} bytes",
            bytes.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn public_scheme(entry: &KeyFileEntry) -> AppResult<Arc<dyn SignatureScheme>> {
    let bytes = decode_b64(&entry.public_key, "public")?;
    match entry.algorithm {
        SignatureAlgorithm::Ed25519 => Ok(Arc::new(Ed25519Verifier::from_bytes(&bytes)?)),
        SignatureAlgorithm::MlDsa65 => Ok(Arc::new(MlDsa65Verifier::from_bytes(&bytes)?)),
    }
}
