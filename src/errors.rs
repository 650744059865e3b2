use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::models::ValidationErrors;
use crate::publishing::SaveFailure;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SaveFailure> for Error {
    fn from(failure: SaveFailure) -> Self {
        match failure {
            SaveFailure::Conflict(errors) => Self::Validation(errors),
            SaveFailure::Store(err) => Self::Internal(err),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("request failed with {self}");
        match self {
            Self::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{what} not found") })),
            )
                .into_response(),
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors.errors() })),
            )
                .into_response(),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal server error" })),
            )
                .into_response(),
        }
    }
}
