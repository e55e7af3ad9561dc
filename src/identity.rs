//! Identity provider abstraction: resolves a caller credential to a `UserId`.
//!
//! The settlement path only ever sees resolved ids; authentication happens
//! before a wager reaches the coordinator.

use crate::domain::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Credential is empty")]
    MissingCredential,
    #[error("Unknown credential")]
    Unknown,
    #[error("Malformed credential: {0}")]
    Malformed(String),
}

/// Resolves credentials to user ids.
#[async_trait]
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Resolve a credential (token, session id, numeric id) to a user.
    async fn resolve(&self, credential: &str) -> Result<UserId, IdentityError>;
}

/// Trusts the credential to be the numeric user id itself.
///
/// For callers that authenticate upstream, such as the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedIdentityProvider;

#[async_trait]
impl IdentityProvider for TrustedIdentityProvider {
    async fn resolve(&self, credential: &str) -> Result<UserId, IdentityError> {
        if credential.trim().is_empty() {
            return Err(IdentityError::MissingCredential);
        }
        credential
            .parse::<UserId>()
            .map_err(|e| IdentityError::Malformed(e.to_string()))
    }
}

/// In-memory token table for testing.
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    tokens: HashMap<String, UserId>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a user.
    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn resolve(&self, credential: &str) -> Result<UserId, IdentityError> {
        if credential.is_empty() {
            return Err(IdentityError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .copied()
            .ok_or(IdentityError::Unknown)
    }
}
