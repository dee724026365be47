//! Availability and population monitor for a realm's auth and world gateways.
//!
//! # Data Flow
//! ```text
//! control thread ──trigger_check──▶ SchedulerBridge (worker thread)
//!                                      → StatusCache
//!                                      → StatusAggregator
//!                                          → Probe ×2 (concurrent)
//!                                          → PopulationGateway → CharacterStore
//! control thread ◀──on_complete──── CompositeStatus
//!       → StatusBoard → GET /status
//! ```

pub mod aggregator;
pub mod board;
pub mod bridge;
pub mod cache;
pub mod client_info;
pub mod config;
pub mod control;
mod error;
pub mod population;
pub mod probe;
mod routes;
pub mod status;

pub use aggregator::{Endpoints, StatusAggregator};
pub use board::StatusBoard;
pub use bridge::{CheckHandle, CheckOutcome, SchedulerBridge};
pub use cache::StatusCache;
pub use control::{ControlQueue, ControlSender, run_control_loop};
pub use population::{Population, PopulationGateway, PopulationStore};
pub use probe::{Probe, Reachability, TcpProbe};
pub use status::{CompositeStatus, RealmInfo, StatusLabel};

use axum::{Router, http::StatusCode, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub board: Arc<StatusBoard>,
}

/// Create the status router over the given board
pub fn create_app(board: Arc<StatusBoard>, request_timeout: Duration) -> Router {
    let state = Arc::new(AppState { board });

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/status", get(routes::status))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
