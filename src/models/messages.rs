use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::EventKind;

/// Payload of a client-originated application message. The payload is
/// opaque to the gateway and forwarded untouched.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {}

/// Messages a client may send over an established connection. Join/leave
/// are synthesized by the gateway and are deliberately not accepted here.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "file-changed")]
    FileChanged(EventMessage),
    #[serde(rename = "cursor-moved")]
    CursorMoved(EventMessage),
    #[serde(rename = "activity-update")]
    ActivityUpdate(EventMessage),
    #[serde(rename = "ping")]
    Ping(PingMessage),
}

impl ReceivedMessage {
    /// The event kind this message produces, None for control messages.
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            ReceivedMessage::FileChanged(_) => Some(EventKind::FileChanged),
            ReceivedMessage::CursorMoved(_) => Some(EventKind::CursorMoved),
            ReceivedMessage::ActivityUpdate(_) => Some(EventKind::ActivityUpdate),
            ReceivedMessage::Ping(_) => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMessage {
    pub session_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub code: u16,
    pub error: String,
}

/// Control frames the gateway sends to a single connection. Collaboration
/// events are not wrapped in this enum; they go out in their stable wire
/// form directly (see `CollaborationEvent`).
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}
