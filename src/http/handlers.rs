use super::state::AppState;
use crate::capture::CaptureSourceFactory;
use crate::encoder::ContainerWriter;
use crate::session::{
    ErrorKind, ErrorRecord, RecorderError, SessionConfig, SessionCoordinator, SessionState,
    SessionStats,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Overrides applied on top of the configured recording defaults
#[derive(Debug, Default, Deserialize)]
pub struct StartRecordingRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Output path (default: `<session_id>.mp4` next to the configured output)
    pub output_path: Option<PathBuf>,

    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub quality: Option<u32>,
    pub display_id: Option<u32>,
    pub capture_audio: Option<bool>,
    pub audio_device_id: Option<String>,
}

impl StartRecordingRequest {
    fn into_config(self, session_id: &str, defaults: &SessionConfig) -> SessionConfig {
        let output_path = self.output_path.unwrap_or_else(|| {
            let extension = defaults
                .output_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("mp4");
            defaults
                .output_path
                .with_file_name(format!("{}.{}", session_id, extension))
        });

        SessionConfig {
            output_path,
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            fps: self.fps.unwrap_or(defaults.fps),
            quality: self.quality.unwrap_or(defaults.quality),
            display_id: self.display_id.unwrap_or(defaults.display_id),
            capture_audio: self.capture_audio.unwrap_or(defaults.capture_audio),
            audio_device_id: self.audio_device_id.or_else(|| defaults.audio_device_id.clone()),
            ..defaults.clone()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartRecordingResponse {
    pub session_id: String,
    pub status: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopRecordingResponse {
    pub session_id: String,
    pub status: SessionState,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: Option<ErrorKind>,
}

fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidConfig => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyStarted | ErrorKind::NotRunning => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn recorder_error(err: &RecorderError) -> Response {
    (
        error_status(err.kind()),
        Json(ErrorResponse {
            error: err.to_string(),
            kind: Some(err.kind()),
        }),
    )
        .into_response()
}

fn not_found(session_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
            kind: None,
        }),
    )
        .into_response()
}

async fn find_session(state: &AppState, session_id: &str) -> Option<Arc<SessionCoordinator>> {
    state.sessions.read().await.get(session_id).cloned()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/record/start
/// Create and start a new recording session
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> Response {
    // Generate or use provided session ID
    let session_id = req
        .session_id
        .clone()
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting recording for session: {}", session_id);

    // Check if already known
    if state.sessions.read().await.contains_key(&session_id) {
        return recorder_error(&RecorderError::AlreadyStarted);
    }

    let config = req.into_config(&session_id, &state.defaults);

    let source = match CaptureSourceFactory::create(&config) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to create capture source: {:#}", e);
            return recorder_error(&RecorderError::InitFailed(format!("{:#}", e)));
        }
    };

    let session = match SessionCoordinator::new(config, source, Box::new(ContainerWriter::new())) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create session: {}", e);
            return recorder_error(&e);
        }
    };

    // Start recording
    if let Err(e) = session.start().await {
        error!("Failed to start recording: {}", e);
        session.shutdown().await;
        return recorder_error(&e);
    }

    // Store session
    {
        let mut sessions = state.sessions.write().await;
        if sessions.contains_key(&session_id) {
            drop(sessions);
            warn!("Session {} was registered concurrently, releasing duplicate", session_id);
            session.shutdown().await;
            return recorder_error(&RecorderError::AlreadyStarted);
        }
        sessions.insert(session_id.clone(), Arc::clone(&session));
    }

    info!("Recording started successfully for session: {}", session_id);

    (
        StatusCode::OK,
        Json(StartRecordingResponse {
            session_id: session_id.clone(),
            status: session.state(),
            message: format!("Recording started for session {}", session_id),
        }),
    )
        .into_response()
}

/// POST /sessions/record/stop/:session_id
/// Stop recording for a specific session
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    info!("Stopping recording for session: {}", session_id);

    let Some(session) = find_session(&state, &session_id).await else {
        error!("Session {} not found", session_id);
        return not_found(&session_id);
    };

    match session.stop().await {
        Ok(()) => {
            info!("Recording stopped successfully for session: {}", session_id);
            (
                StatusCode::OK,
                Json(StopRecordingResponse {
                    session_id,
                    status: session.state(),
                    message: "Recording stopped".to_string(),
                    stats: session.stats(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            recorder_error(&e)
        }
    }
}

/// GET /sessions
/// List all known sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionStats>> {
    let sessions = state.sessions.read().await;
    Json(sessions.values().map(|session| session.stats()).collect())
}

/// GET /sessions/:session_id/status
/// Get status of a recording session
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match find_session(&state, &session_id).await {
        Some(session) => (StatusCode::OK, Json(session.stats())).into_response(),
        None => not_found(&session_id),
    }
}

/// GET /sessions/:session_id/error
/// Get the last recorded error (null if none)
pub async fn get_session_error(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match find_session(&state, &session_id).await {
        Some(session) => {
            let last_error: Option<ErrorRecord> = session.last_error();
            (StatusCode::OK, Json(last_error)).into_response()
        }
        None => not_found(&session_id),
    }
}

/// DELETE /sessions/:session_id
/// Release a session, stopping it first if it is still recording
pub async fn release_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session = state.sessions.write().await.remove(&session_id);

    match session {
        Some(session) => {
            session.shutdown().await;
            info!("Session {} released", session_id);
            (StatusCode::OK, Json(session.stats())).into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
