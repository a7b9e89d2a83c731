//! Error types for parley-server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediatorError {
    /// The provider could not be reached
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MediatorError {
    pub fn status(&self) -> StatusCode {
        match self {
            MediatorError::Upstream(_) => StatusCode::BAD_GATEWAY,
            MediatorError::BadRequest(_) => StatusCode::BAD_REQUEST,
            MediatorError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MediatorError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
            }
        }));
        (self.status(), body).into_response()
    }
}
