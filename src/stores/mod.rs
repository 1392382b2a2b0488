pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::EventKind;

/// Failure of an external collaborator (session store, activity log,
/// project directory). These are non-fatal to the fanout path: callers log
/// them and keep delivering.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable record of connection identity and liveness, addressable by
/// session id so presence is observable cluster-wide.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(
        &self,
        session_id: Uuid,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), StoreError>;

    /// Update the session's last-activity timestamp.
    async fn touch(&self, session_id: Uuid) -> Result<(), StoreError>;

    async fn deactivate(&self, session_id: Uuid) -> Result<(), StoreError>;
}

/// Append-only audit sink. Write-only from this service; replay and
/// analysis happen elsewhere.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(
        &self,
        project_id: &str,
        user_id: &str,
        kind: EventKind,
        payload: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Source of project membership. Any role at all grants a connection
/// (read-only viewers may observe); an empty role set denies it.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn member_roles(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<Vec<String>, StoreError>;
}
