//! Master secret gate.
//!
//! The gate is a small state machine over a single secret held in a
//! [`SecretStore`]:
//!
//! ```text
//! Uninitialized --create_secret--> Unlocked
//! Locked        --verify---------> Unlocked
//! any           --reset----------> Locked
//! ```
//!
//! A fresh session starts `Locked` when a secret exists and `Uninitialized`
//! otherwise. There is no lock transition: a session stays unlocked until
//! the gate is dropped.

use std::path::PathBuf;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::recovery::RecoveryChallenge;
use crate::session::{SessionHandle, UnlockToken};
use cofre_common::{Error, Result};
use cofre_crypto::{KdfParams, SecretVerifier};
use cofre_storage::SecretStore;

/// State of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No secret stored yet.
    Uninitialized,
    /// A secret exists and has not been verified in this session.
    Locked,
    /// The secret was created or verified in this session.
    Unlocked,
}

/// Whether a stored value is meant to be a verifier rather than a legacy
/// plain-text secret.
fn is_json_object(stored: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(stored),
        Ok(serde_json::Value::Object(_))
    )
}

/// Gate controlling access to the vault.
pub struct MasterPasswordGate {
    store: Arc<dyn SecretStore>,
    secret_key: String,
    min_secret_length: usize,
    kdf_params: KdfParams,
    vault_dir: PathBuf,
    session: SessionHandle,
    state: GateState,
}

impl MasterPasswordGate {
    /// Open the gate for a new session.
    ///
    /// # Postconditions
    /// - State is `Locked` if a secret is stored, `Uninitialized` otherwise
    ///
    /// # Errors
    /// - Secret store failure
    pub async fn open(store: Arc<dyn SecretStore>, config: &VaultConfig) -> Result<Self> {
        let state = if store.contains(&config.secret_key).await? {
            GateState::Locked
        } else {
            GateState::Uninitialized
        };
        debug!(state = ?state, store = store.name(), "Gate opened");

        Ok(Self {
            store,
            secret_key: config.secret_key.clone(),
            min_secret_length: config.min_secret_length,
            kdf_params: config.kdf_params.clone(),
            vault_dir: config.vault_dir(),
            session: SessionHandle::new(),
            state,
        })
    }

    /// Get the current state.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Get the session handle.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Check if the gate is unlocked.
    pub fn is_unlocked(&self) -> bool {
        self.state == GateState::Unlocked
    }

    fn validate_secret(&self, candidate: &str) -> Result<()> {
        if candidate.chars().count() < self.min_secret_length {
            return Err(Error::Validation(format!(
                "Secret must have at least {} characters",
                self.min_secret_length
            )));
        }
        Ok(())
    }

    async fn store_secret(&self, secret: &str) -> Result<()> {
        let verifier = SecretVerifier::create(secret.as_bytes(), &self.kdf_params)?;
        self.store.set(&self.secret_key, &verifier.to_json()?).await
    }

    fn unlock(&mut self) -> UnlockToken {
        self.state = GateState::Unlocked;
        UnlockToken::issue(&self.session, &self.vault_dir)
    }

    /// Create the master secret.
    ///
    /// # Preconditions
    /// - State is `Uninitialized`
    ///
    /// # Postconditions
    /// - A salted verifier of `candidate` is stored
    /// - State is `Unlocked`
    ///
    /// # Errors
    /// - `AlreadyExists` if a secret is already stored
    /// - `Validation` if `candidate` is shorter than the minimum; state unchanged
    pub async fn create_secret(&mut self, candidate: &str) -> Result<UnlockToken> {
        if self.state != GateState::Uninitialized {
            return Err(Error::AlreadyExists(
                "A master secret has already been created".to_string(),
            ));
        }
        self.validate_secret(candidate)?;

        self.store_secret(candidate).await?;
        info!("Master secret created");
        Ok(self.unlock())
    }

    /// Verify a candidate against the stored secret.
    ///
    /// A value stored by an older release as plain text is accepted once
    /// and replaced by a verifier.
    ///
    /// # Errors
    /// - `NotFound` if no secret has been created
    /// - `Auth` if the candidate does not match; state unchanged
    /// - `Parse` if the stored verifier is damaged
    pub async fn verify(&mut self, candidate: &str) -> Result<UnlockToken> {
        let Some(stored) = self.store.get(&self.secret_key).await? else {
            self.state = GateState::Uninitialized;
            return Err(Error::NotFound(
                "No master secret has been created".to_string(),
            ));
        };

        let matches = match SecretVerifier::from_json(&stored) {
            Ok(verifier) => verifier.verify(candidate.as_bytes())?,
            Err(e) if is_json_object(&stored) => return Err(e),
            Err(_) => {
                let matches: bool = candidate.as_bytes().ct_eq(stored.as_bytes()).into();
                if matches {
                    self.store_secret(candidate).await?;
                    info!("Legacy master secret upgraded to a verifier");
                }
                matches
            }
        };

        if !matches {
            warn!("Master secret verification failed");
            return Err(Error::Auth("Incorrect secret".to_string()));
        }

        info!("Vault unlocked");
        Ok(self.unlock())
    }

    /// Replace the secret after an out-of-band recovery challenge.
    ///
    /// # Postconditions
    /// - The stored secret is overwritten unconditionally
    /// - State is `Locked`; the user unlocks again with the new secret
    ///
    /// # Errors
    /// - `Auth` if the challenge answer is wrong; nothing is written
    /// - `Validation` if `new_secret` is too short; nothing is written
    pub async fn reset(
        &mut self,
        challenge: &dyn RecoveryChallenge,
        answer: &str,
        new_secret: &str,
    ) -> Result<()> {
        if !challenge.check(answer).await? {
            warn!("Recovery answer rejected");
            return Err(Error::Auth("Recovery answer is incorrect".to_string()));
        }
        self.validate_secret(new_secret)?;

        self.store_secret(new_secret).await?;
        self.state = GateState::Locked;
        info!("Master secret reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::SecurityQuestion;
    use cofre_storage::MemorySecretStore;

    fn test_config() -> VaultConfig {
        VaultConfig::new("/app").with_kdf_params(KdfParams::light())
    }

    async fn open_gate(store: &MemorySecretStore) -> MasterPasswordGate {
        MasterPasswordGate::open(Arc::new(store.clone()), &test_config())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_gate_lifecycle() {
        let store = MemorySecretStore::new();

        let mut gate = open_gate(&store).await;
        assert_eq!(gate.state(), GateState::Uninitialized);

        let result = gate.create_secret("ab").await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(gate.state(), GateState::Uninitialized);

        gate.create_secret("abcd").await.unwrap();
        assert_eq!(gate.state(), GateState::Unlocked);
        drop(gate);

        let mut gate = open_gate(&store).await;
        assert_eq!(gate.state(), GateState::Locked);

        let result = gate.verify("wrong").await;
        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(gate.state(), GateState::Locked);

        gate.verify("abcd").await.unwrap();
        assert_eq!(gate.state(), GateState::Unlocked);
    }

    #[tokio::test]
    async fn test_secret_stored_as_verifier() {
        let store = MemorySecretStore::new();
        let mut gate = open_gate(&store).await;
        gate.create_secret("abcd-secret").await.unwrap();

        let raw = store.get("userPassword").await.unwrap().unwrap();
        assert!(!raw.contains("abcd-secret"));
        assert!(SecretVerifier::from_json(&raw).is_ok());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemorySecretStore::new();
        let mut gate = open_gate(&store).await;
        gate.create_secret("abcd").await.unwrap();

        let mut gate = open_gate(&store).await;
        let result = gate.create_secret("efgh").await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        gate.verify("abcd").await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_uninitialized() {
        let store = MemorySecretStore::new();
        let mut gate = open_gate(&store).await;

        let result = gate.verify("abcd").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(gate.state(), GateState::Uninitialized);
    }

    #[tokio::test]
    async fn test_legacy_plaintext_upgraded() {
        let store = MemorySecretStore::new();
        store.set("userPassword", "1234").await.unwrap();

        let mut gate = open_gate(&store).await;
        assert!(matches!(gate.verify("12345").await, Err(Error::Auth(_))));
        assert_eq!(store.get("userPassword").await.unwrap().as_deref(), Some("1234"));

        gate.verify("1234").await.unwrap();
        let raw = store.get("userPassword").await.unwrap().unwrap();
        assert!(SecretVerifier::from_json(&raw).is_ok());

        let mut gate = open_gate(&store).await;
        gate.verify("1234").await.unwrap();
    }

    #[tokio::test]
    async fn test_legacy_plaintext_with_brace_upgraded() {
        let store = MemorySecretStore::new();
        store.set("userPassword", "{abc1").await.unwrap();

        let mut gate = open_gate(&store).await;
        assert!(matches!(gate.verify("{abc").await, Err(Error::Auth(_))));
        gate.verify("{abc1").await.unwrap();
        let raw = store.get("userPassword").await.unwrap().unwrap();
        assert!(SecretVerifier::from_json(&raw).is_ok());
    }

    #[tokio::test]
    async fn test_damaged_verifier_is_parse_error() {
        let store = MemorySecretStore::new();
        store.set("userPassword", "{\"version\": 1}").await.unwrap();

        let mut gate = open_gate(&store).await;
        assert!(matches!(gate.verify("abcd").await, Err(Error::Parse(_))));
    }

    #[tokio::test]
    async fn test_reset_requires_challenge() {
        let store = MemorySecretStore::new();
        let challenge = SecurityQuestion::new("First project?", "minhaprimeiraprograma");
        let mut gate = open_gate(&store).await;
        gate.create_secret("abcd").await.unwrap();

        let mut gate = open_gate(&store).await;
        let result = gate.reset(&challenge, "wrong", "newsecret").await;
        assert!(matches!(result, Err(Error::Auth(_))));

        let result = gate
            .reset(&challenge, " MinhaPrimeiraPrograma ", "xyz")
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        gate.verify("abcd").await.unwrap();

        gate.reset(&challenge, " MinhaPrimeiraPrograma ", "newsecret")
            .await
            .unwrap();
        assert_eq!(gate.state(), GateState::Locked);
        assert!(matches!(gate.verify("abcd").await, Err(Error::Auth(_))));
        gate.verify("newsecret").await.unwrap();
        assert!(gate.is_unlocked());
    }

    #[tokio::test]
    async fn test_tokens_carry_session() {
        let store = MemorySecretStore::new();
        let mut gate = open_gate(&store).await;
        let token = gate.create_secret("abcd").await.unwrap();

        assert_eq!(token.session(), gate.session());
        assert!(token.authorize(&test_config().vault_dir()).is_ok());
    }
}
