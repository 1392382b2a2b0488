use axum::Router;
use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use colabri_collab::auth::AuthGate;
use colabri_collab::bus::{memory::MemoryBusBackbone, pg::PgEventBus, EventBus};
use colabri_collab::config::{init_config, Config};
use colabri_collab::db::dbcollab;
use colabri_collab::routes::api::create_api_routes;
use colabri_collab::stores::memory::{MemoryActivityLog, MemorySessionStore, StaticProjectDirectory};
use colabri_collab::stores::{ActivityLog, ProjectDirectory, SessionStore};
use colabri_collab::ws::{bridge, heartbeat, CollabGateway};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "colabri_collab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    init_config(config.clone());

    let jwt_secret = config.cloud_auth_jwt_secret.clone().unwrap_or_else(|| {
        warn!("No JWT secret configured - using an insecure development secret");
        "insecure-dev-secret".to_string()
    });

    // Wire the collaborators: Postgres-backed when a database URL is
    // provided, otherwise in-memory single-process mode.
    let sessions: Arc<dyn SessionStore>;
    let activity: Arc<dyn ActivityLog>;
    let directory: Arc<dyn ProjectDirectory>;
    let bus: Arc<dyn EventBus>;

    let mut connected_db = None;
    if let Some(db_url) = &config.db_url {
        match dbcollab::init_db(db_url).await {
            Ok(_) => {
                info!("Database initialized successfully");
                connected_db = dbcollab::get_db();
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to in-memory session and activity stores");
            }
        }
    } else {
        warn!("No database URL configured - sessions and activity will not be persisted");
    }

    match connected_db {
        Some(db) => {
            sessions = db.clone();
            activity = db.clone();
            directory = db.clone();
            bus = Arc::new(PgEventBus::new(db.pool().clone(), &config.bus_channel));
        }
        None => {
            warn!("Running in single-process mode: every authenticated user is admitted");
            sessions = Arc::new(MemorySessionStore::new());
            activity = Arc::new(MemoryActivityLog::new());
            directory = Arc::new(StaticProjectDirectory::allow_all());
            bus = Arc::new(MemoryBusBackbone::new().endpoint());
        }
    }

    let gateway = Arc::new(CollabGateway::new(
        AuthGate::new(jwt_secret, directory),
        sessions,
        activity,
        bus.clone(),
    ));

    // Background tasks: the bus bridge feeding remote events into local
    // fanout, and the heartbeat sweep.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(bridge::run_bus_bridge(
        gateway.clone(),
        bus,
        shutdown_rx.clone(),
    ));
    tokio::spawn(heartbeat::run_heartbeat(
        gateway.clone(),
        Duration::from_secs(config.heartbeat_interval_secs),
        shutdown_rx,
    ));

    // Create API routes
    let api_routes = create_api_routes(gateway.clone());

    // Combine all routes
    let app_routes = Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!(
        "📡 WebSocket available at ws://{}/api/v1/ws",
        config.server_address()
    );

    let shutdown_gateway = gateway.clone();
    axum::serve(listener, app_routes)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received, closing connections...");
            shutdown_gateway.shutdown().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .expect("Server failed to start");

    info!("Server stopped");
}
