use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::extract_token;
use crate::ws::{CollabGateway, ConnectionHandle};

use super::msg_handler;

#[derive(Deserialize)]
pub struct WsParams {
    pub project: Option<String>,
    pub token: Option<String>,
}

/// WebSocket endpoint for collaboration connections
///
/// # Arguments
/// * `ws` - WebSocket upgrade request
/// * `params` - Query parameters (`project`, optional `token`)
/// * `headers` - Request headers, used for token fallback
/// * `gateway` - Shared collaboration gateway
///
/// # Returns
/// * `impl IntoResponse` - The upgrade response
pub async fn collab_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(gateway): State<Arc<CollabGateway>>,
) -> impl IntoResponse {
    let token = extract_token(params.token.as_deref(), &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, params.project, token))
}

/// Drive one upgraded socket through its whole lifetime: admission, the
/// outbound pump, the inbound loop, teardown.
async fn handle_socket(
    socket: WebSocket,
    gateway: Arc<CollabGateway>,
    project_id: Option<String>,
    token: Option<String>,
) {
    let (handle, outbound) = match gateway
        .open_connection(token.as_deref(), project_id.as_deref())
        .await
    {
        Ok(opened) => opened,
        Err(e) => {
            info!("Refused connection: {}", e);
            refuse(socket, e.close_code(), &e.to_string()).await;
            return;
        }
    };

    let (sender, receiver) = socket.split();
    let writer = tokio::spawn(pump_outbound(outbound, sender));

    read_loop(receiver, &gateway, &handle).await;

    gateway.close_connection(&handle).await;
    drop(handle);
    let _ = writer.await;
}

async fn refuse(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: Cow::from(reason.to_string()),
        })))
        .await;
}

/// Drain queued frames into the socket. Ends when every sender for the
/// connection has been dropped or the socket rejects a write.
async fn pump_outbound(
    mut outbound: tokio::sync::mpsc::UnboundedReceiver<Message>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) {
    while let Some(frame) = outbound.recv().await {
        let closing = matches!(frame, Message::Close(_));
        if sender.send(frame).await.is_err() {
            break;
        }
        if closing {
            break;
        }
    }
}

async fn read_loop(
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    gateway: &Arc<CollabGateway>,
    handle: &ConnectionHandle,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                msg_handler::dispatch(gateway, handle, &text).await;
            }
            Ok(Message::Pong(_)) => {
                handle.mark_alive();
            }
            Ok(Message::Ping(_)) => {
                // axum answers protocol pings automatically.
                handle.mark_alive();
            }
            Ok(Message::Close(_)) => {
                debug!("Connection {} closed by client", handle.conn_id);
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame on connection {}", handle.conn_id);
            }
            Err(e) => {
                warn!("Connection {} errored: {}", handle.conn_id, e);
                break;
            }
        }
    }
}
