use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use cloudcost_core::{CostError, ErrorKind};
use serde_json::json;

/// Renders as `{"error": "..."}` with the status the error kind maps to.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::ProjectNotFound => StatusCode::NOT_FOUND,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::EndpointUnavailable
        | ErrorKind::NoCompatibleEndpoint
        | ErrorKind::MalformedResponse
        | ErrorKind::UpstreamRequest => StatusCode::BAD_GATEWAY,
        ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<CostError> for ApiError {
    fn from(err: CostError) -> Self {
        let status = status_for(err.kind());
        let message = match err {
            // Caller-facing messages go out without the error code prefix.
            CostError::InvalidRequest(message) => message,
            other => other.to_string(),
        };
        Self { status, message }
    }
}
