use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

use crate::models::EventKind;
use crate::stores::{ActivityLog, ProjectDirectory, SessionStore, StoreError};

// Global database instance
static DB: OnceCell<Arc<DbCollab>> = OnceCell::const_new();

/// Initialize the global database connection
///
/// # Arguments
/// * `database_url` - PostgreSQL connection string
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error
pub async fn init_db(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = DbCollab::new(database_url).await?;
    DB.set(Arc::new(db))
        .map_err(|_| "Database already initialized")?;
    Ok(())
}

/// Get the global database instance
///
/// # Returns
/// * `Option<Arc<DbCollab>>` - Database instance if initialized
pub fn get_db() -> Option<Arc<DbCollab>> {
    DB.get().cloned()
}

/// Database connection pool
pub struct DbCollab {
    pool: PgPool,
}

impl DbCollab {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    ///
    /// # Returns
    /// * `Result<Self, SqlxError>` - Database connection pool or error
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for DbCollab {
    async fn create(
        &self,
        session_id: Uuid,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO collab_sessions
                (session_id, user_id, project_id, active, last_activity_at, created_at)
            VALUES ($1, $2, $3, TRUE, NOW(), NOW())
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(project_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch(&self, session_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE collab_sessions
            SET last_activity_at = NOW()
            WHERE session_id = $1 AND active = TRUE
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate(&self, session_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE collab_sessions
            SET active = FALSE, last_activity_at = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityLog for DbCollab {
    async fn append(
        &self,
        project_id: &str,
        user_id: &str,
        kind: EventKind,
        payload: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO collab_activity
                (project_id, user_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(payload)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectDirectory for DbCollab {
    /// Look up the roles a user holds in a project
    ///
    /// # Arguments
    /// * `project_id` - Project identifier
    /// * `user_id` - User identifier
    ///
    /// # Returns
    /// * `Result<Vec<String>, StoreError>` - All roles, empty when the user
    ///   is not a member
    async fn member_roles(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let roles: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT role
            FROM project_members
            WHERE project_id = $1 AND user_id = $2 AND removed = FALSE
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles.into_iter().map(|(role,)| role).collect())
    }
}
