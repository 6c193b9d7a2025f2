//! InkRoom WebSocket Relay Server
//!
//! Relays host mutations to the viewers of a room and keeps the room's
//! mutation history for late joiners and reconnecting hosts.
//!
//! ## Protocol
//!
//! Messages are JSON, tagged by `type`:
//! ```json
//! { "type": "join", "room": "math", "role": "host", "display_name": "Ada" }
//! { "type": "mutation", "mutation": { "type": "board_created" } }
//! { "type": "history_request" }
//! { "type": "question", "text": "Which page?" }
//! ```

pub mod config;
pub mod error;
pub mod rooms;
pub mod socket;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, ws::WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ServerError;
pub use rooms::AppState;

/// Build the router: `/` banner, `/health` and the `/ws` endpoint.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already bound listener until the process stops.
pub async fn serve(listener: TcpListener, config: &ServerConfig) -> Result<(), ServerError> {
    let state = Arc::new(AppState::new(config.channel_capacity));
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn index() -> &'static str {
    "InkRoom Relay Server - Connect via WebSocket at /ws"
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| socket::handle_socket(socket, state))
}
