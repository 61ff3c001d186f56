//! Uniform action envelope and the bridge-error to HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use desklink_core::BridgeError;

#[derive(Debug, Serialize)]
/// Every route answers with this envelope, success and error alike.
pub struct ActionResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResponse {
    pub fn success(data: Value) -> Json<Self> {
        Json(Self {
            status: "success",
            message: None,
            data: Some(data),
        })
    }

    pub fn success_with_message(message: impl Into<String>, data: Option<Value>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: Some(message.into()),
            data,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
            data: None,
        }
    }
}

#[derive(Debug)]
/// Enumerates supported `ApiError` values.
pub enum ApiError {
    Bridge(BridgeError),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        Self::Bridge(error)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error)
    }
}

/// Caller-side faults are 4xx, upstream tracker faults surface as gateway
/// statuses so HTTP clients can distinguish them from bridge bugs.
fn status_for(error: &BridgeError) -> StatusCode {
    match error {
        BridgeError::Config(_) | BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
        BridgeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        BridgeError::Remote { .. } => StatusCode::BAD_GATEWAY,
        BridgeError::Transport(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Bridge(error) => (status_for(&error), error.to_string()),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Internal(error) => {
                tracing::error!(%error, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        };
        (status, Json(ActionResponse::error(message))).into_response()
    }
}
