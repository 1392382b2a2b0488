use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A presence session as persisted in the session store.
///
/// Exactly one active row exists per live connection cluster-wide; the row
/// is deactivated (never deleted) when the connection is destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub user_id: String,
    pub project_id: String,
    pub active: bool,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
