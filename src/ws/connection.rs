use axum::extract::ws::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Close code for handshakes missing required parameters.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code for failed authentication or missing project membership.
pub const CLOSE_ACCESS_DENIED: u16 = 4403;
/// Close code for connections reclaimed by the heartbeat sweep.
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 1001;
/// Close code sent to every connection during graceful shutdown.
pub const CLOSE_SERVICE_SHUTDOWN: u16 = 1012;

/// Lifecycle of one WebSocket connection. Transitions are one-way; a
/// handle is only constructed once the handshake has authenticated, so
/// `Connecting` describes the pre-admission phase of the raw socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnState {
    Connecting,
    Authenticated,
    Active,
    Closing,
    Closed,
}

/// Shared handle to one live connection.
///
/// The handle is what the room registry stores and what fanout writes to.
/// Outbound frames go through an unbounded channel drained by the socket's
/// writer task, so fanout never blocks on a slow client.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: u64,
    pub user_id: String,
    pub project_id: String,
    pub session_id: Uuid,
    state: Arc<Mutex<ConnState>>,
    alive: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    pub fn new(
        conn_id: u64,
        user_id: String,
        project_id: String,
        session_id: Uuid,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            conn_id,
            user_id,
            project_id,
            session_id,
            state: Arc::new(Mutex::new(ConnState::Authenticated)),
            alive: Arc::new(AtomicBool::new(true)),
            tx,
        }
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock().unwrap()
    }

    /// Advance the lifecycle. Transitions only move forward; a stale
    /// caller (a close racing another close) leaves the state untouched.
    pub fn advance(&self, to: ConnState) {
        let mut state = self.state.lock().unwrap();
        if to > *state {
            *state = to;
        }
    }

    /// Queue a frame for the connection's writer task. Errors (receiver
    /// already dropped) are ignored; the reader side handles teardown.
    pub fn send(&self, message: Message) {
        let _ = self.tx.send(message);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Record proof of life. Called on Pong frames and on any inbound text.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Clear the liveness flag at the start of a heartbeat interval.
    pub fn clear_alive(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let h = ConnectionHandle::new(
            1,
            "user-a".to_string(),
            "proj-1".to_string(),
            Uuid::new_v4(),
            tx,
        );
        (h, rx)
    }

    #[test]
    fn state_only_moves_forward() {
        let (h, _rx) = handle();
        assert_eq!(h.state(), ConnState::Authenticated);
        h.advance(ConnState::Active);
        assert_eq!(h.state(), ConnState::Active);
        h.advance(ConnState::Closed);
        h.advance(ConnState::Active);
        assert_eq!(h.state(), ConnState::Closed);
    }

    #[test]
    fn liveness_flag_toggles() {
        let (h, _rx) = handle();
        assert!(h.is_alive());
        h.clear_alive();
        assert!(!h.is_alive());
        h.mark_alive();
        assert!(h.is_alive());
    }

    #[test]
    fn send_after_receiver_dropped_is_harmless() {
        let (h, rx) = handle();
        drop(rx);
        h.send(Message::Text("late".to_string()));
    }
}
