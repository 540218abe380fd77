//! Out-of-band recovery challenges.
//!
//! A challenge gates [`MasterPasswordGate::reset`](crate::gate::MasterPasswordGate::reset).
//! Answers are compared after trimming surrounding whitespace and folding
//! case, so "  Rust " matches "rust".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::info;
use zeroize::Zeroizing;

use crate::session::UnlockToken;
use cofre_common::{Error, Result};
use cofre_crypto::{KdfParams, SecretVerifier};
use cofre_storage::SecretStore;

/// A question the user must answer before the master secret can be reset.
#[async_trait]
pub trait RecoveryChallenge: Send + Sync {
    /// The question shown to the user.
    fn prompt(&self) -> &str;

    /// Check an answer.
    async fn check(&self, answer: &str) -> Result<bool>;
}

/// Normalize an answer for comparison.
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// A fixed question/answer pair supplied by the host.
pub struct SecurityQuestion {
    question: String,
    answer: Zeroizing<String>,
}

impl SecurityQuestion {
    /// Create a challenge. The answer is normalized up front.
    pub fn new(question: impl Into<String>, answer: &str) -> Self {
        Self {
            question: question.into(),
            answer: Zeroizing::new(normalize_answer(answer)),
        }
    }
}

#[async_trait]
impl RecoveryChallenge for SecurityQuestion {
    fn prompt(&self) -> &str {
        &self.question
    }

    async fn check(&self, answer: &str) -> Result<bool> {
        let candidate = Zeroizing::new(normalize_answer(answer));
        Ok(candidate.as_bytes().ct_eq(self.answer.as_bytes()).into())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredChallenge {
    question: String,
    verifier: SecretVerifier,
}

/// A question whose answer verifier lives in the secret store.
pub struct StoredSecurityQuestion {
    question: String,
    verifier: SecretVerifier,
}

impl StoredSecurityQuestion {
    /// Enroll a question and answer, replacing any previous enrollment.
    ///
    /// Requires an unlocked session, so a locked vault cannot have its
    /// recovery answer swapped.
    ///
    /// # Errors
    /// - `Validation` if the question or normalized answer is empty
    /// - Secret store failure
    pub async fn enroll(
        store: &Arc<dyn SecretStore>,
        key: &str,
        _token: &UnlockToken,
        question: &str,
        answer: &str,
        kdf_params: &KdfParams,
    ) -> Result<Self> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Validation("Recovery question cannot be empty".to_string()));
        }
        let normalized = Zeroizing::new(normalize_answer(answer));
        if normalized.is_empty() {
            return Err(Error::Validation("Recovery answer cannot be empty".to_string()));
        }

        let stored = StoredChallenge {
            question: question.to_string(),
            verifier: SecretVerifier::create(normalized.as_bytes(), kdf_params)?,
        };
        let json =
            serde_json::to_string(&stored).map_err(|e| Error::Serialization(e.to_string()))?;
        store.set(key, &json).await?;

        info!("Recovery question enrolled");
        Ok(Self {
            question: stored.question,
            verifier: stored.verifier,
        })
    }

    /// Load an enrolled question, or `None` if nothing was enrolled.
    pub async fn load(store: &Arc<dyn SecretStore>, key: &str) -> Result<Option<Self>> {
        let Some(json) = store.get(key).await? else {
            return Ok(None);
        };
        let stored: StoredChallenge = serde_json::from_str(&json)
            .map_err(|e| Error::Parse(format!("Invalid recovery enrollment: {}", e)))?;
        Ok(Some(Self {
            question: stored.question,
            verifier: stored.verifier,
        }))
    }
}

#[async_trait]
impl RecoveryChallenge for StoredSecurityQuestion {
    fn prompt(&self) -> &str {
        &self.question
    }

    async fn check(&self, answer: &str) -> Result<bool> {
        let candidate = Zeroizing::new(normalize_answer(answer));
        self.verifier.verify(candidate.as_bytes())
    }
}
