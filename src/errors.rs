use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CampanileError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(campanile::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(campanile::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(campanile::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(campanile::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Bad request: {0}")]
    #[diagnostic(code(campanile::bad_request))]
    BadRequest(String),

    #[error("Authentication required")]
    #[diagnostic(code(campanile::unauthorized))]
    Unauthorized,

    #[error("Forbidden")]
    #[diagnostic(code(campanile::forbidden))]
    Forbidden,

    #[error("Not found: {0}")]
    #[diagnostic(code(campanile::not_found))]
    NotFound(String),

    #[error("{0}")]
    #[diagnostic(code(campanile::other))]
    Other(String),
}

impl IntoResponse for CampanileError {
    fn into_response(self) -> Response {
        let status = match &self {
            CampanileError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CampanileError::Unauthorized => StatusCode::UNAUTHORIZED,
            CampanileError::Forbidden => StatusCode::FORBIDDEN,
            CampanileError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Internal detail stays in the logs, not in the response body
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
