//! HTTP route handlers.
//!
//! Every handler either acknowledges success or returns an [`ApiError`],
//! which renders as `{error, kind, details?, note?}` with a status code
//! derived from the error kind.

use std::path::Path;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chatlink_core::{DispatchError, SessionError, SessionState};
use serde::{Deserialize, Serialize};

use super::AppState;

/// Attached to a failed logout; the controller has already reset the session.
pub const LOGOUT_RESET_NOTE: &str = "Session reset forced; a new linking code will follow";

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub whatsapp_ready: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QrResponse {
    pub status: String,
    pub qr: Option<String>,
}

/// Body of `POST /send`. Fields are optional so that missing values are
/// reported by dispatch validation rather than the extractor.
#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResponse {
    pub success: bool,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

/// Structured error body.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// An error response: status plus structured body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                kind: kind.to_string(),
                details: None,
                note: None,
            },
        }
    }

    fn details(mut self, details: impl Into<String>) -> Self {
        self.body.details = Some(details.into());
        self
    }

    fn note(mut self, note: impl Into<String>) -> Self {
        self.body.note = Some(note.into());
        self
    }

    fn not_ready() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "not_ready",
            "WhatsApp client not ready",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        let kind = e.kind();
        match e {
            DispatchError::NotReady => Self::not_ready(),
            DispatchError::InvalidRequest(message) => {
                Self::new(StatusCode::BAD_REQUEST, kind, message)
            }
            DispatchError::MediaLoad(err) => {
                Self::new(StatusCode::BAD_REQUEST, kind, "Failed to load image file")
                    .details(err.to_string())
            }
            DispatchError::Dispatch(err) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                kind,
                "Failed to send message",
            )
            .details(err.0),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        if e == SessionError::NotReady {
            return Self::not_ready();
        }
        let error = Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string());
        match e.diagnostic() {
            Some(diagnostic) => error.details(diagnostic),
            None => error,
        }
    }
}

/// Map the session state to the `/qr` status label.
pub fn qr_status(state: &SessionState) -> &'static str {
    match state {
        SessionState::Ready => "connected",
        SessionState::AwaitingScan { .. } => "scanning",
        _ => "initializing",
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online".to_string(),
        whatsapp_ready: state.session.is_ready_for_traffic(),
    })
}

/// GET /groups
pub async fn groups(State(state): State<AppState>) -> Result<Json<Vec<GroupEntry>>, ApiError> {
    let groups = state.session.list_groups().await.map_err(|e| {
        log::warn!("GET /groups failed: {}", e);
        ApiError::from(e)
    })?;
    log::debug!("GET /groups -> {} group(s)", groups.len());
    Ok(Json(
        groups
            .into_iter()
            .map(|chat| GroupEntry {
                name: chat.name,
                id: chat.id,
            })
            .collect(),
    ))
}

/// GET /qr
pub async fn qr(State(state): State<AppState>) -> Json<QrResponse> {
    let snapshot = state.session.current_state();
    Json(QrResponse {
        status: qr_status(&snapshot).to_string(),
        qr: snapshot.linking_code().map(str::to_string),
    })
}

/// POST /send
pub async fn send(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Malformed request body",
        )
        .details(rejection.body_text())
    })?;
    log::debug!(
        "POST /send to {:?} (media: {})",
        request.number,
        request.image_path.is_some()
    );

    let ack = state
        .dispatch
        .send(
            request.number.as_deref(),
            request.message.as_deref(),
            request.image_path.as_deref().map(Path::new),
        )
        .await
        .map_err(|e| {
            log::warn!("POST /send failed: {}", e);
            ApiError::from(e)
        })?;

    log::info!("Sent message to {}", ack.chat_id);
    Ok(Json(SendResponse {
        success: true,
        status: "Sent".to_string(),
    }))
}

/// POST /logout
pub async fn logout(State(state): State<AppState>) -> Result<Json<LogoutResponse>, ApiError> {
    match state.session.logout().await {
        Ok(()) => Ok(Json(LogoutResponse {
            success: true,
            message: "Logged out; waiting for the session to disconnect".to_string(),
        })),
        Err(e) => Err(ApiError::from(e).note(LOGOUT_RESET_NOTE)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
