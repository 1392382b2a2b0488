//! In-memory collaborator adapters.
//!
//! Used when no database URL is configured (single-process degraded mode)
//! and by the test suite, which inspects the recorded state directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{EventKind, SessionRecord};
use crate::stores::{ActivityLog, ProjectDirectory, SessionStore, StoreError};

/// Session store backed by a process-local map.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: Uuid) -> Option<SessionRecord> {
        self.sessions.lock().unwrap().get(&session_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().unwrap().values().filter(|s| s.active).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(
        &self,
        session_id: Uuid,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.sessions.lock().unwrap().insert(
            session_id,
            SessionRecord {
                session_id,
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
                active: true,
                last_activity_at: now,
                created_at: now,
            },
        );
        Ok(())
    }

    async fn touch(&self, session_id: Uuid) -> Result<(), StoreError> {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(&session_id) {
            session.last_activity_at = Utc::now();
        }
        Ok(())
    }

    async fn deactivate(&self, session_id: Uuid) -> Result<(), StoreError> {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(&session_id) {
            session.active = false;
        }
        Ok(())
    }
}

/// One appended activity entry, kept for inspection.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub project_id: String,
    pub user_id: String,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Activity log backed by a process-local vec.
#[derive(Default)]
pub struct MemoryActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn append(
        &self,
        project_id: &str,
        user_id: &str,
        kind: EventKind,
        payload: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.entries.lock().unwrap().push(ActivityEntry {
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            payload: payload.clone(),
            timestamp,
        });
        Ok(())
    }
}

/// Project directory with a fixed membership table, or an allow-all mode
/// for running without a database.
pub struct StaticProjectDirectory {
    // (project_id, user_id) -> roles
    members: Mutex<HashMap<(String, String), Vec<String>>>,
    allow_all: bool,
}

impl StaticProjectDirectory {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            allow_all: false,
        }
    }

    /// Every authenticated user is treated as an editor of every project.
    /// Only sensible for local development.
    pub fn allow_all() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            allow_all: true,
        }
    }

    pub fn grant(&self, project_id: &str, user_id: &str, roles: &[&str]) {
        self.members.lock().unwrap().insert(
            (project_id.to_string(), user_id.to_string()),
            roles.iter().map(|r| r.to_string()).collect(),
        );
    }
}

impl Default for StaticProjectDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectDirectory for StaticProjectDirectory {
    async fn member_roles(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        if self.allow_all {
            return Ok(vec!["editor".to_string()]);
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&(project_id.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_lifecycle_is_recorded() {
        let store = MemorySessionStore::new();
        let sid = Uuid::new_v4();
        store.create(sid, "user-a", "proj-1").await.unwrap();
        assert_eq!(store.active_count(), 1);

        let before = store.get(sid).unwrap().last_activity_at;
        store.touch(sid).await.unwrap();
        assert!(store.get(sid).unwrap().last_activity_at >= before);

        store.deactivate(sid).await.unwrap();
        let record = store.get(sid).unwrap();
        assert!(!record.active);
        assert_eq!(record.user_id, "user-a");
    }

    #[tokio::test]
    async fn directory_denies_unknown_members() {
        let dir = StaticProjectDirectory::new();
        dir.grant("proj-1", "user-a", &["viewer"]);

        assert_eq!(
            dir.member_roles("proj-1", "user-a").await.unwrap(),
            vec!["viewer".to_string()]
        );
        assert!(dir.member_roles("proj-1", "user-b").await.unwrap().is_empty());
        assert!(dir.member_roles("proj-2", "user-a").await.unwrap().is_empty());
    }
}
