use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kinds of collaboration events the gateway transports.
///
/// This is a closed set: the fanout and suppression rules match on it
/// exhaustively, so adding a kind forces every delivery decision to be
/// revisited at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "user-joined")]
    UserJoined,
    #[serde(rename = "user-left")]
    UserLeft,
    #[serde(rename = "file-changed")]
    FileChanged,
    #[serde(rename = "cursor-moved")]
    CursorMoved,
    #[serde(rename = "activity-update")]
    ActivityUpdate,
}

impl EventKind {
    /// Lifecycle events (join/leave) are delivered to every room member,
    /// including the subject's own connection. All other kinds are
    /// suppressed on connections belonging to the originating user.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, EventKind::UserJoined | EventKind::UserLeft)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UserJoined => "user-joined",
            EventKind::UserLeft => "user-left",
            EventKind::FileChanged => "file-changed",
            EventKind::CursorMoved => "cursor-moved",
            EventKind::ActivityUpdate => "activity-update",
        }
    }
}

/// One collaboration event flowing through the fanout pipeline.
///
/// The serialized form is the wire format sent to clients AND the payload
/// published on the event bus, so it must stay stable:
/// `{ "type", "projectId", "userId", "payload", "timestamp" }`.
/// Events are never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub project_id: String,
    pub user_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl CollaborationEvent {
    pub fn new(
        kind: EventKind,
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            project_id: project_id.into(),
            user_id: user_id.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Synthetic event emitted when a connection reaches ACTIVE.
    pub fn user_joined(project_id: &str, user_id: &str) -> Self {
        Self::new(
            EventKind::UserJoined,
            project_id,
            user_id,
            serde_json::json!({ "userId": user_id }),
        )
    }

    /// Synthetic event emitted when a connection is destroyed.
    pub fn user_left(project_id: &str, user_id: &str) -> Self {
        Self::new(
            EventKind::UserLeft,
            project_id,
            user_id,
            serde_json::json!({ "userId": user_id }),
        )
    }
}
