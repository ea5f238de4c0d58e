//! Coachline relay server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use coachline_api::{AppState, Repositories, request_span, router};
use coachline_common::Config;
use coachline_core::{JwtTokenVerifier, LocalRoomPublisher, RoomPublisherService, RoomRegistry};
use coachline_pubsub::RedisRoomBridge;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coachline=debug,tower_http=debug".into());
    let json = std::env::var("COACHLINE_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting coachline relay...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(coachline_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    coachline_db::migrate(&db).await?;
    info!("Migrations completed");

    // Room fanout: Redis when configured, in-process otherwise
    let rooms = Arc::new(RoomRegistry::new());
    let bridge = match &config.redis {
        Some(redis) => {
            info!("Connecting to Redis...");
            let bridge = RedisRoomBridge::new(redis, rooms.clone()).await?;
            let room_events = bridge.start().await?;
            Some((bridge, room_events))
        }
        None => None,
    };
    let publisher: RoomPublisherService = match &bridge {
        Some((bridge, _)) => Arc::new(bridge.clone()),
        None => Arc::new(LocalRoomPublisher::new(rooms.clone())),
    };

    let state = AppState::new(
        db.clone(),
        Repositories::new(&db),
        Arc::new(JwtTokenVerifier::new(&config.auth)),
        rooms,
        publisher,
        &config.messaging,
    );

    // Build router
    let app = router()
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((bridge, room_events)) = bridge {
        if room_events.is_finished() {
            error!("Redis room event subscriber had already stopped");
        }
        if let Err(e) = bridge.shutdown().await {
            error!(error = %e, "Failed to shut down Redis room bridge");
        }
        room_events.abort();
    }

    // Closing any handle closes the shared pool.
    db.as_ref().clone().close().await?;
    info!("Database connection closed");

    info!("Server shutdown complete");
    Ok(())
}
