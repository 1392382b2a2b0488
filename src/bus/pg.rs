//! Postgres-backed relay using LISTEN/NOTIFY.
//!
//! All project topics are multiplexed over one physical NOTIFY channel;
//! the frame carries the logical topic and the subscriber routes by the
//! project id inside the event body. NOTIFY echoes back to the publishing
//! connection's process, so frames are tagged with the endpoint's instance
//! id and own-origin frames are dropped in the listen loop.

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPool};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{BusError, EventBus, RelayFrame};

const SUBSCRIBE_BUFFER: usize = 1024;
const RETRY_INITIAL: Duration = Duration::from_millis(500);
const RETRY_MAX: Duration = Duration::from_secs(30);

/// Relay endpoint backed by a shared Postgres instance.
#[derive(Clone)]
pub struct PgEventBus {
    pool: PgPool,
    channel: String,
    instance_id: Uuid,
}

impl PgEventBus {
    pub fn new(pool: PgPool, channel: &str) -> Self {
        let instance_id = Uuid::new_v4();
        info!(
            "Event bus endpoint {} relaying over channel '{}'",
            instance_id, channel
        );
        Self {
            pool,
            channel: channel.to_string(),
            instance_id,
        }
    }
}

#[async_trait]
impl EventBus for PgEventBus {
    async fn publish(&self, topic: &str, event: &str) -> Result<(), BusError> {
        let frame = RelayFrame {
            origin: self.instance_id,
            topic: topic.to_string(),
            event: event.to_string(),
        };
        let payload = serde_json::to_string(&frame)?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribe_all(&self) -> Result<mpsc::Receiver<String>, BusError> {
        let pool = self.pool.clone();
        let channel = self.channel.clone();
        let own_id = self.instance_id;
        let (tx, rx) = mpsc::channel(SUBSCRIBE_BUFFER);

        tokio::spawn(async move {
            let mut backoff = RETRY_INITIAL;
            loop {
                let mut listener = match PgListener::connect_with(&pool).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        error!("Failed to open bus listener: {}", e);
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(RETRY_MAX);
                        continue;
                    }
                };
                if let Err(e) = listener.listen(&channel).await {
                    error!("Failed to LISTEN on '{}': {}", channel, e);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RETRY_MAX);
                    continue;
                }
                info!("Bus listener attached to channel '{}'", channel);
                backoff = RETRY_INITIAL;

                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            let frame: RelayFrame =
                                match serde_json::from_str(notification.payload()) {
                                    Ok(frame) => frame,
                                    Err(e) => {
                                        warn!("Dropping malformed bus frame: {}", e);
                                        continue;
                                    }
                                };
                            if frame.origin == own_id {
                                continue;
                            }
                            if tx.send(frame.event).await.is_err() {
                                // Subscriber gone, stop listening.
                                return;
                            }
                        }
                        Err(e) => {
                            error!("Bus listener connection lost: {}", e);
                            break;
                        }
                    }
                }

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RETRY_MAX);
            }
        });

        Ok(rx)
    }
}
