//! Salted one-way verifiers for user secrets.
//!
//! A verifier is what gets persisted in place of a secret: a random salt,
//! the KDF parameters and the Argon2id output. Checking a candidate re-derives
//! the hash and compares it in constant time.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::kdf::{derive_key, KdfParams};
use crate::keys::Salt;
use cofre_common::{Error, Result};

/// Persisted verifier for a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVerifier {
    /// Verifier format version.
    pub version: u32,
    /// Base64 salt.
    salt: String,
    /// KDF parameters used to produce `hash`.
    pub kdf_params: KdfParams,
    /// Base64 Argon2id output.
    hash: String,
}

impl SecretVerifier {
    /// Current verifier format.
    pub const VERSION: u32 = 1;

    /// Create a verifier for `secret` with a fresh random salt.
    ///
    /// # Errors
    /// - Secret is empty
    /// - KDF failure
    pub fn create(secret: &[u8], params: &KdfParams) -> Result<Self> {
        let salt = Salt::generate();
        let key = derive_key(secret, &salt, params)?;

        Ok(Self {
            version: Self::VERSION,
            salt: STANDARD.encode(salt.as_bytes()),
            kdf_params: params.clone(),
            hash: STANDARD.encode(key.as_bytes()),
        })
    }

    /// Check a candidate secret.
    ///
    /// # Returns
    /// - `Ok(true)` if the candidate matches
    /// - `Ok(false)` if it does not (including an empty candidate)
    /// - `Err(_)` if the verifier itself is malformed
    pub fn verify(&self, candidate: &[u8]) -> Result<bool> {
        if self.version != Self::VERSION {
            return Err(Error::Parse(format!(
                "Unsupported verifier version: {}",
                self.version
            )));
        }

        let salt_bytes = STANDARD
            .decode(&self.salt)
            .map_err(|e| Error::Parse(format!("Invalid verifier salt: {}", e)))?;
        let salt = Salt::from_slice(&salt_bytes)
            .ok_or_else(|| Error::Parse("Invalid verifier salt length".to_string()))?;
        let expected = STANDARD
            .decode(&self.hash)
            .map_err(|e| Error::Parse(format!("Invalid verifier hash: {}", e)))?;

        if candidate.is_empty() {
            return Ok(false);
        }

        let derived = derive_key(candidate, &salt, &self.kdf_params)?;
        Ok(derived.as_bytes().as_slice().ct_eq(expected.as_slice()).into())
    }

    /// Serialize to JSON for a secret store.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse a verifier from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Parse(format!("Invalid verifier: {}", e)))
    }
}
