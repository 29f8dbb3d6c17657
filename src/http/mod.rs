//! HTTP API server for external control
//!
//! This module provides a REST API for controlling recording sessions:
//! - POST /sessions/record/start - Create and start a recording
//! - POST /sessions/record/stop/:id - Stop a recording
//! - GET /sessions - List known sessions
//! - GET /sessions/:id/status - Query session statistics
//! - GET /sessions/:id/error - Query the last recorded error
//! - DELETE /sessions/:id - Release a session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, StartRecordingRequest, StartRecordingResponse, StopRecordingResponse};
pub use routes::create_router;
pub use state::AppState;
