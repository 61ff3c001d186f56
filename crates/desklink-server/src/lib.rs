//! HTTP surface for the DeskLink bridge.
//!
//! Wires the tracker client, classification pipeline, and sync layer behind
//! an axum router with a uniform `{"status", "message"?, "data"?}` action
//! envelope.

pub mod response;
pub mod routes;
pub mod server;
pub mod state;

pub use response::{ActionResponse, ApiError};
pub use routes::build_router;
pub use server::{run_server, ServerConfig};
pub use state::{AppState, LoggingNotifier};
