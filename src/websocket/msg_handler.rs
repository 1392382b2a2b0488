use axum::extract::ws::Message;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{
    CollaborationEvent, ErrorMessage, PongMessage, ReceivedMessage, SendMessage,
};
use crate::ws::{CollabGateway, ConnectionHandle};

/// Handle one inbound text frame. Any text counts as proof of life. A
/// malformed frame earns the sender an error message but never affects
/// the rest of the room.
pub async fn dispatch(gateway: &Arc<CollabGateway>, handle: &ConnectionHandle, text: &str) {
    handle.mark_alive();

    let message: ReceivedMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Connection {} sent malformed message: {}", handle.conn_id, e);
            send_to(
                handle,
                &SendMessage::Error(ErrorMessage {
                    code: 400,
                    error: "unsupported message".to_string(),
                }),
            );
            return;
        }
    };

    if let Err(e) = gateway.sessions().touch(handle.session_id).await {
        warn!("Failed to touch session {}: {}", handle.session_id, e);
    }

    match message {
        ReceivedMessage::Ping(_) => {
            send_to(
                handle,
                &SendMessage::Pong(PongMessage {
                    date: Utc::now().to_rfc3339(),
                }),
            );
        }
        other => {
            // event_kind() is Some for every non-control variant.
            let Some(kind) = other.event_kind() else {
                return;
            };
            let payload = match other {
                ReceivedMessage::FileChanged(ev)
                | ReceivedMessage::CursorMoved(ev)
                | ReceivedMessage::ActivityUpdate(ev) => ev.payload,
                ReceivedMessage::Ping(_) => unreachable!(),
            };

            gateway
                .publish_event(CollaborationEvent::new(
                    kind,
                    handle.project_id.clone(),
                    handle.user_id.clone(),
                    payload,
                ))
                .await;
        }
    }
}

fn send_to(handle: &ConnectionHandle, message: &SendMessage) {
    match serde_json::to_string(message) {
        Ok(raw) => handle.send(Message::Text(raw)),
        Err(e) => warn!("Failed to serialize control message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthGate;
    use crate::bus::memory::MemoryBusBackbone;
    use crate::stores::memory::{MemoryActivityLog, MemorySessionStore, StaticProjectDirectory};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tokio::sync::mpsc;

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

    struct Fixture {
        gateway: Arc<CollabGateway>,
        sessions: Arc<MemorySessionStore>,
        activity: Arc<MemoryActivityLog>,
    }

    fn fixture() -> Fixture {
        let sessions = Arc::new(MemorySessionStore::new());
        let activity = Arc::new(MemoryActivityLog::new());
        let gateway = Arc::new(CollabGateway::new(
            AuthGate::new(
                SECRET.to_string(),
                Arc::new(StaticProjectDirectory::allow_all()),
            ),
            sessions.clone(),
            activity.clone(),
            Arc::new(MemoryBusBackbone::new().endpoint()),
        ));
        Fixture {
            gateway,
            sessions,
            activity,
        }
    }

    async fn connect(
        fx: &Fixture,
        user: &str,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (handle, mut rx) = fx
            .gateway
            .open_connection(Some(&token_for(user)), Some("proj-1"))
            .await
            .unwrap();
        while rx.try_recv().is_ok() {}
        (handle, rx)
    }

    #[tokio::test]
    async fn ping_gets_a_pong() {
        let fx = fixture();
        let (handle, mut rx) = connect(&fx, "user-a").await;

        dispatch(&fx.gateway, &handle, r#"{"type":"ping"}"#).await;

        match rx.try_recv().unwrap() {
            Message::Text(raw) => {
                let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
                assert_eq!(value["type"], "pong");
                assert!(value["date"].is_string());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn event_message_runs_the_pipeline_and_touches_the_session() {
        let fx = fixture();
        let (a, _a_rx) = connect(&fx, "user-a").await;
        let (_b, mut b_rx) = connect(&fx, "user-b").await;

        let before = fx.sessions.get(a.session_id).unwrap().last_activity_at;
        dispatch(
            &fx.gateway,
            &a,
            r#"{"type":"file-changed","payload":{"file":"lib.rs"}}"#,
        )
        .await;

        match b_rx.try_recv().unwrap() {
            Message::Text(raw) => {
                let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
                assert_eq!(value["type"], "file-changed");
                assert_eq!(value["userId"], "user-a");
                assert_eq!(value["payload"]["file"], "lib.rs");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(fx.activity.len(), 3); // two joins + the file change
        assert!(fx.sessions.get(a.session_id).unwrap().last_activity_at >= before);
    }

    #[tokio::test]
    async fn malformed_message_errors_only_the_sender() {
        let fx = fixture();
        let (a, mut a_rx) = connect(&fx, "user-a").await;
        let (_b, mut b_rx) = connect(&fx, "user-b").await;
        while a_rx.try_recv().is_ok() {}

        dispatch(&fx.gateway, &a, "{broken").await;
        dispatch(&fx.gateway, &a, r#"{"type":"user-joined"}"#).await;

        for _ in 0..2 {
            match a_rx.try_recv().unwrap() {
                Message::Text(raw) => {
                    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
                    assert_eq!(value["type"], "error");
                    assert_eq!(value["code"], 400);
                }
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn any_text_marks_the_connection_alive() {
        let fx = fixture();
        let (handle, _rx) = connect(&fx, "user-a").await;
        handle.clear_alive();

        dispatch(&fx.gateway, &handle, "{broken").await;
        assert!(handle.is_alive());
    }
}
