use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use agentmart_core::auth::{Role, Session, UserId};
use agentmart_core::domain::agent::{Agent, AgentId, AgentPatch};
use agentmart_core::domain::key_feature::KeyFeature;
use agentmart_core::errors::RemoteCallError;
use agentmart_core::ordered::ItemId;

pub mod agent;
pub mod auth;
pub mod collections;
pub mod key_feature;
pub mod memory;

pub use agent::SqlAgentRepository;
pub use auth::SqlAuthRepository;
pub use collections::{AgentComparisonStore, AgentFeatureStore, KeyFeatureOrderStore};
pub use key_feature::SqlKeyFeatureRepository;
pub use memory::{InMemoryAgentRepository, InMemoryAuthRepository, InMemoryKeyFeatureRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl RepositoryError {
    /// Reports this failure as a remote call error for `operation`.
    pub fn into_remote(self, operation: &str) -> RemoteCallError {
        RemoteCallError::new(operation, self.to_string())
    }
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Every agent, newest first.
    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError>;
    /// Active agents, newest first.
    async fn list_active(&self) -> Result<Vec<Agent>, RepositoryError>;
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
    async fn insert(&self, agent: Agent) -> Result<(), RepositoryError>;
    /// Replaces the stored agent. Returns `false` when no row matched.
    async fn update(&self, agent: Agent) -> Result<bool, RepositoryError>;
    async fn apply_patch(&self, id: &AgentId, patch: AgentPatch) -> Result<bool, RepositoryError>;
    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait KeyFeatureRepository: Send + Sync {
    /// Every key feature by display order.
    async fn list_all(&self) -> Result<Vec<KeyFeature>, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<KeyFeature>, RepositoryError>;
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<KeyFeature>, RepositoryError>;
    async fn insert(&self, feature: KeyFeature) -> Result<(), RepositoryError>;
    async fn update(&self, feature: KeyFeature) -> Result<bool, RepositoryError>;
    async fn delete(&self, id: &ItemId) -> Result<bool, RepositoryError>;
    /// Writes the display order of every given feature in one transaction.
    async fn save_order(&self, features: &[KeyFeature]) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuthRepository: Send + Sync {
    /// Creates the user, or resets the password when the email exists.
    async fn upsert_user(&self, email: &str, password: &str) -> Result<UserId, RepositoryError>;
    async fn grant_role(&self, user_id: &UserId, role: Role) -> Result<(), RepositoryError>;
    async fn has_role(&self, user_id: &UserId, role: Role) -> Result<bool, RepositoryError>;
    /// Issues a session for matching credentials; `None` otherwise.
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
        ttl_hours: u32,
    ) -> Result<Option<Session>, RepositoryError>;
    /// The unexpired session for `token`, if any.
    async fn get_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError>;
    async fn sign_out(&self, token: &str) -> Result<(), RepositoryError>;
}

/// Fixed-width UTC text so lexical order matches time order.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
