//! Socket API layer for coachline.
//!
//! - **Streaming**: the `/socket` WebSocket endpoint and its JSON protocol
//! - **Session**: per-connection dispatch of client events onto core services
//! - **Health**: `/health` database probe
//! - **Trace**: request spans that keep the handshake query out of the logs
//!
//! Built on Axum 0.8.

pub mod health;
pub mod protocol;
pub mod session;
pub mod state;
pub mod streaming;
pub mod trace;

use axum::{Router, routing::get};

pub use protocol::{ClientEvent, ServerEvent};
pub use session::Session;
pub use state::{AppState, Repositories};
pub use streaming::socket_handler;
pub use trace::request_span;

/// Create the relay router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/socket", get(socket_handler))
        .route("/health", get(health::health))
}
