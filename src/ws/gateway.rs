use axum::extract::ws::{CloseFrame, Message};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{AuthError, AuthGate};
use crate::bus::{topic_for_project, EventBus};
use crate::models::{CollaborationEvent, SendMessage, WelcomeMessage};
use crate::stores::{ActivityLog, SessionStore};

use super::connection::{
    ConnState, ConnectionHandle, CLOSE_ACCESS_DENIED, CLOSE_HEARTBEAT_TIMEOUT,
    CLOSE_POLICY_VIOLATION, CLOSE_SERVICE_SHUTDOWN,
};
use super::registry::ConnectionRegistry;

/// Why a handshake was refused. Maps onto the close code sent back
/// before the socket is dropped.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("handshake missing project id")]
    MissingProject,
    #[error("handshake missing auth token")]
    MissingCredential,
    #[error(transparent)]
    Denied(#[from] AuthError),
}

impl ConnectError {
    pub fn close_code(&self) -> u16 {
        match self {
            ConnectError::MissingProject | ConnectError::MissingCredential => {
                CLOSE_POLICY_VIOLATION
            }
            ConnectError::Denied(_) => CLOSE_ACCESS_DENIED,
        }
    }
}

/// The collaboration gateway for one process.
///
/// Owns the room registry and drives the fanout pipeline. Events reach it
/// from two directions: connections on this process (which get logged,
/// published to the bus, and fanned out locally) and the bus bridge
/// (which only gets fanned out locally, never republished).
pub struct CollabGateway {
    registry: ConnectionRegistry,
    auth: AuthGate,
    sessions: Arc<dyn SessionStore>,
    activity: Arc<dyn ActivityLog>,
    bus: Arc<dyn EventBus>,
    next_conn_id: AtomicU64,
}

impl CollabGateway {
    pub fn new(
        auth: AuthGate,
        sessions: Arc<dyn SessionStore>,
        activity: Arc<dyn ActivityLog>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            auth,
            sessions,
            activity,
            bus,
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Admit a connection: authenticate, join its project room, record a
    /// session and announce the join. Returns the handle plus the outbound
    /// frame stream the transport must drain into the socket.
    ///
    /// The welcome frame is queued before the join event is announced, so
    /// the client always sees `welcome` first.
    pub async fn open_connection(
        &self,
        token: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<(ConnectionHandle, mpsc::UnboundedReceiver<Message>), ConnectError> {
        let project_id = project_id.ok_or(ConnectError::MissingProject)?;
        let token = token.ok_or(ConnectError::MissingCredential)?;

        let user = self.auth.authorize(token, project_id).await?;

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(
            conn_id,
            user.user_id.clone(),
            project_id.to_string(),
            session_id,
            tx,
        );

        if let Ok(welcome) = serde_json::to_string(&SendMessage::Welcome(WelcomeMessage {
            session_id,
        })) {
            handle.send(Message::Text(welcome));
        }

        self.registry.add(handle.clone()).await;

        if let Err(e) = self
            .sessions
            .create(session_id, &user.user_id, project_id)
            .await
        {
            warn!("Failed to record session {}: {}", session_id, e);
        }

        handle.advance(ConnState::Active);
        info!(
            "User {} joined project {} (connection {}, session {})",
            user.user_id, project_id, conn_id, session_id
        );
        self.publish_event(CollaborationEvent::user_joined(project_id, &user.user_id))
            .await;

        Ok((handle, rx))
    }

    /// Full pipeline for an event originating on this process: append to
    /// the activity log, publish to the bus, then fan out to local room
    /// members. Log and bus failures degrade to local-only delivery.
    pub async fn publish_event(&self, event: CollaborationEvent) {
        if let Err(e) = self
            .activity
            .append(
                &event.project_id,
                &event.user_id,
                event.kind,
                &event.payload,
                event.timestamp,
            )
            .await
        {
            warn!(
                "Activity log append failed for project {}: {}",
                event.project_id, e
            );
        }

        match serde_json::to_string(&event) {
            Ok(raw) => {
                let topic = topic_for_project(&event.project_id);
                if let Err(e) = self.bus.publish(&topic, &raw).await {
                    warn!("Bus publish to {} failed: {}", topic, e);
                }
            }
            Err(e) => error!("Failed to serialize event: {}", e),
        }

        self.fanout_local(&event).await;
    }

    /// Deliver one event to this process's room members. Non-lifecycle
    /// events are suppressed on every connection of the originating user,
    /// not just the originating connection, so a user's own edits never
    /// bounce back to their other tabs.
    async fn fanout_local(&self, event: &CollaborationEvent) {
        let members = self.registry.members_of(&event.project_id).await;
        if members.is_empty() {
            return;
        }

        let raw = match serde_json::to_string(event) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to serialize event: {}", e);
                return;
            }
        };

        let suppress_user = !event.kind.is_lifecycle();
        let mut delivered = 0usize;
        for member in &members {
            if suppress_user && member.user_id == event.user_id {
                continue;
            }
            member.send(Message::Text(raw.clone()));
            delivered += 1;
        }
        debug!(
            "Fanned out {} to {}/{} members of {}",
            event.kind.as_str(),
            delivered,
            members.len(),
            event.project_id
        );
    }

    /// Deliver a bus-originated event: local fanout only. Republishing
    /// here would bounce the event between processes forever.
    pub async fn handle_bus_frame(&self, raw: &str) {
        let event: CollaborationEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed bus event: {}", e);
                return;
            }
        };
        self.fanout_local(&event).await;
    }

    /// Tear a connection down. Idempotent: the registry removal gates the
    /// session deactivation and the leave announcement, so racing callers
    /// (reader task, heartbeat sweep, shutdown) produce them exactly once.
    pub async fn close_connection(&self, handle: &ConnectionHandle) -> bool {
        if !self
            .registry
            .remove(&handle.project_id, handle.conn_id)
            .await
        {
            return false;
        }
        handle.advance(ConnState::Closing);

        if let Err(e) = self.sessions.deactivate(handle.session_id).await {
            warn!("Failed to deactivate session {}: {}", handle.session_id, e);
        }

        info!(
            "User {} left project {} (connection {})",
            handle.user_id, handle.project_id, handle.conn_id
        );
        self.publish_event(CollaborationEvent::user_left(
            &handle.project_id,
            &handle.user_id,
        ))
        .await;
        handle.advance(ConnState::Closed);
        true
    }

    /// Close a connection that missed its heartbeat window.
    pub async fn reclaim_connection(&self, handle: &ConnectionHandle) -> bool {
        handle.send(Message::Close(Some(CloseFrame {
            code: CLOSE_HEARTBEAT_TIMEOUT,
            reason: Cow::from("heartbeat timeout"),
        })));
        self.close_connection(handle).await
    }

    /// Close every connection for graceful shutdown.
    pub async fn shutdown(&self) {
        let connections = self.registry.connections().await;
        info!("Closing {} connections for shutdown", connections.len());
        for handle in connections {
            handle.send(Message::Close(Some(CloseFrame {
                code: CLOSE_SERVICE_SHUTDOWN,
                reason: Cow::from("service restarting"),
            })));
            self.close_connection(&handle).await;
        }
    }
}
