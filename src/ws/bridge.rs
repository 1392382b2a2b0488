//! Pump between the process-wide bus subscription and the gateway.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::bus::EventBus;

use super::gateway::CollabGateway;

/// Subscribe once and feed every remote-origin event into local fanout.
/// Runs until the bus subscription closes or shutdown is signalled.
pub async fn run_bus_bridge(
    gateway: Arc<CollabGateway>,
    bus: Arc<dyn EventBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut events = match bus.subscribe_all().await {
        Ok(rx) => rx,
        Err(e) => {
            error!("Failed to subscribe to event bus: {}", e);
            return;
        }
    };
    info!("Bus bridge started");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(raw) => gateway.handle_bus_frame(&raw).await,
                    None => {
                        error!("Bus subscription closed");
                        return;
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("Bus bridge stopping");
                return;
            }
        }
    }
}
