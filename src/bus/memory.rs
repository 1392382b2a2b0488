//! In-process relay backbone for single-node mode and tests.
//!
//! Endpoints created from one backbone behave like separate server
//! processes sharing a broker: a frame published through one endpoint is
//! seen by every other endpoint's subscription but never by its own.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use super::{BusError, EventBus, RelayFrame};

const BACKBONE_CAPACITY: usize = 1024;

/// Shared broker. Cheap to clone; create one per deployment (or per test).
#[derive(Clone)]
pub struct MemoryBusBackbone {
    tx: broadcast::Sender<RelayFrame>,
}

impl MemoryBusBackbone {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BACKBONE_CAPACITY);
        Self { tx }
    }

    /// Create an endpoint with its own origin identity.
    pub fn endpoint(&self) -> MemoryBusEndpoint {
        MemoryBusEndpoint {
            tx: self.tx.clone(),
            endpoint_id: Uuid::new_v4(),
            published: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for MemoryBusBackbone {
    fn default() -> Self {
        Self::new()
    }
}

/// One process's view of the in-memory backbone.
#[derive(Clone)]
pub struct MemoryBusEndpoint {
    tx: broadcast::Sender<RelayFrame>,
    endpoint_id: Uuid,
    published: Arc<AtomicU64>,
}

impl MemoryBusEndpoint {
    /// Number of frames published through this endpoint.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventBus for MemoryBusEndpoint {
    async fn publish(&self, topic: &str, event: &str) -> Result<(), BusError> {
        self.published.fetch_add(1, Ordering::Relaxed);
        let frame = RelayFrame {
            origin: self.endpoint_id,
            topic: topic.to_string(),
            event: event.to_string(),
        };
        // send() fails only when no endpoint is subscribed, which is fine
        // for a fire-and-forget relay.
        let _ = self.tx.send(frame);
        Ok(())
    }

    async fn subscribe_all(&self) -> Result<mpsc::Receiver<String>, BusError> {
        let mut backbone_rx = self.tx.subscribe();
        let own_id = self.endpoint_id;
        let (tx, rx) = mpsc::channel(BACKBONE_CAPACITY);

        tokio::spawn(async move {
            loop {
                match backbone_rx.recv().await {
                    Ok(frame) => {
                        if frame.origin == own_id {
                            continue;
                        }
                        if tx.send(frame.event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Bus subscription lagged by {} frames", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_across_endpoints_but_never_back_to_origin() {
        let backbone = MemoryBusBackbone::new();
        let a = backbone.endpoint();
        let b = backbone.endpoint();

        let mut a_rx = a.subscribe_all().await.unwrap();
        let mut b_rx = b.subscribe_all().await.unwrap();

        a.publish("collab:proj-1", "from-a").await.unwrap();

        assert_eq!(b_rx.recv().await.unwrap(), "from-a");
        assert_eq!(a.published(), 1);

        // The origin endpoint must not see its own frame.
        let echoed = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            a_rx.recv(),
        )
        .await;
        assert!(echoed.is_err(), "origin endpoint received its own frame");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let backbone = MemoryBusBackbone::new();
        let a = backbone.endpoint();
        a.publish("collab:proj-1", "nobody-listens").await.unwrap();
        assert_eq!(a.published(), 1);
    }
}
