use crate::error::AppError;
use crate::status::{CompositeStatus, StatusLabel};
use crate::AppState;

use axum::{extract::State, response::IntoResponse, Json};
use axum_macros::debug_handler;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    #[serde(flatten)]
    status: CompositeStatus,
    label: StatusLabel,
    label_text: String,
    online: bool,
    population: String,
}

impl From<&CompositeStatus> for StatusResponse {
    fn from(status: &CompositeStatus) -> Self {
        Self {
            label: status.label(),
            label_text: status.label().to_string(),
            online: status.is_online(),
            population: status.population_line(),
            status: status.clone(),
        }
    }
}

#[debug_handler]
pub(crate) async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let status = state.board.current().ok_or(AppError::StatusUnknown)?;

    Ok(Json(StatusResponse::from(status.as_ref())))
}
