//! Liveness sweep over every connection on this process.
//!
//! Each interval: a connection whose flag was not refreshed since the
//! previous sweep is closed as dead; everyone else has the flag cleared
//! and gets a protocol Ping. A client only has to answer (or send any
//! text) within the next interval, so a dead connection is reclaimed
//! within two intervals.

use axum::extract::ws::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::gateway::CollabGateway;

/// One sweep pass. Returns the number of connections reclaimed.
pub async fn sweep(gateway: &CollabGateway) -> usize {
    let connections = gateway.registry().connections().await;
    let mut reclaimed = 0;
    for handle in connections {
        if !handle.is_alive() {
            info!(
                "Connection {} (user {}, project {}) missed heartbeat, closing",
                handle.conn_id, handle.user_id, handle.project_id
            );
            if gateway.reclaim_connection(&handle).await {
                reclaimed += 1;
            }
            continue;
        }
        handle.clear_alive();
        handle.send(Message::Ping(Vec::new()));
    }
    debug!("Heartbeat sweep reclaimed {} connections", reclaimed);
    reclaimed
}

/// Periodic sweep loop, stopped through the shutdown channel.
pub async fn run_heartbeat(
    gateway: Arc<CollabGateway>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; every connection starts alive so
    // it only seeds the ping cycle.
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&gateway).await;
            }
            _ = shutdown.changed() => {
                info!("Heartbeat loop stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthGate;
    use crate::bus::memory::MemoryBusBackbone;
    use crate::stores::memory::{MemoryActivityLog, MemorySessionStore, StaticProjectDirectory};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(user_id: &str) -> String {
        encode(
            &Header::default(),
            &serde_json::json!({
                "sub": user_id,
                "exp": chrono::Utc::now().timestamp() + 3600,
            }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn gateway_with(sessions: Arc<MemorySessionStore>) -> CollabGateway {
        CollabGateway::new(
            AuthGate::new(
                SECRET.to_string(),
                Arc::new(StaticProjectDirectory::allow_all()),
            ),
            sessions,
            Arc::new(MemoryActivityLog::new()),
            Arc::new(MemoryBusBackbone::new().endpoint()),
        )
    }

    #[tokio::test]
    async fn silent_connection_is_reclaimed_on_second_sweep() {
        let sessions = Arc::new(MemorySessionStore::new());
        let gateway = gateway_with(sessions.clone());
        let (handle, mut rx) = gateway
            .open_connection(Some(&token_for("user-a")), Some("proj-1"))
            .await
            .unwrap();
        while rx.try_recv().is_ok() {}

        // First sweep: flag cleared, ping sent, nothing reclaimed.
        assert_eq!(sweep(&gateway).await, 0);
        assert!(matches!(rx.try_recv().unwrap(), Message::Ping(_)));

        // No pong arrives. Second sweep reclaims the connection.
        assert_eq!(sweep(&gateway).await, 1);
        assert_eq!(gateway.registry().connection_count().await, 0);
        assert!(!sessions.get(handle.session_id).unwrap().active);

        let mut close_code = None;
        while let Ok(frame) = rx.try_recv() {
            if let Message::Close(Some(cf)) = frame {
                close_code = Some(cf.code);
            }
        }
        assert_eq!(close_code, Some(super::super::connection::CLOSE_HEARTBEAT_TIMEOUT));
    }

    #[tokio::test]
    async fn responsive_connection_survives_sweeps() {
        let gateway = gateway_with(Arc::new(MemorySessionStore::new()));
        let (handle, mut rx) = gateway
            .open_connection(Some(&token_for("user-a")), Some("proj-1"))
            .await
            .unwrap();
        while rx.try_recv().is_ok() {}

        for _ in 0..3 {
            assert_eq!(sweep(&gateway).await, 0);
            // The client answers the ping.
            handle.mark_alive();
        }
        assert_eq!(gateway.registry().connection_count().await, 1);
    }
}
