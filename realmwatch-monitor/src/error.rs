use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  /// No status check has completed yet.
  StatusUnknown,
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::StatusUnknown => {
        tracing::debug!("status requested before first completed check");
        let error_response =
          ErrorResponse::with_details("status unknown", "no status check has completed yet");
        (StatusCode::SERVICE_UNAVAILABLE, Json(error_response)).into_response()
      }
    }
  }
}
