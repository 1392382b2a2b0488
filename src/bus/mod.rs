//! Cross-process event relay.
//!
//! Every server process publishes locally-originated collaboration events
//! to the bus and holds exactly one process-wide subscription covering all
//! project topics. The bus is a best-effort relay: no ordering or delivery
//! guarantee beyond "a currently-listening subscriber receives it".
//!
//! Adapters guarantee origin suppression: a subscription never yields a
//! frame published through its own endpoint, so the gateway only ever sees
//! remote-origin events and never republishes them.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus transport error: {0}")]
    Transport(#[from] sqlx::Error),
    #[error("bus serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The bus topic for one project's events. Adapters without per-topic
/// channels multiplex topics over one physical channel; routing still uses
/// the project id inside the event body, never the topic name.
pub fn topic_for_project(project_id: &str) -> String {
    format!("collab:{}", project_id)
}

/// Frame exchanged between relay endpoints. The `event` field is the
/// stable collaboration-event wire form; `origin` identifies the
/// publishing endpoint so subscribers can drop their own frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayFrame {
    pub origin: Uuid,
    pub topic: String,
    pub event: String,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish of a serialized event to a project topic.
    async fn publish(&self, topic: &str, event: &str) -> Result<(), BusError>;

    /// Process-wide subscription over all project topics. Called once at
    /// startup; yields raw event payloads from other endpoints only.
    async fn subscribe_all(&self) -> Result<mpsc::Receiver<String>, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_deterministic_per_project() {
        assert_eq!(topic_for_project("proj-1"), "collab:proj-1");
        assert_eq!(topic_for_project("proj-1"), topic_for_project("proj-1"));
        assert_ne!(topic_for_project("proj-1"), topic_for_project("proj-2"));
    }
}
