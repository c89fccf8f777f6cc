use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Role hierarchy is empty")]
    #[diagnostic(
        code(campanile::authz::empty_hierarchy),
        help("List at least one role in [authz].hierarchy, lowest privilege first")
    )]
    EmptyHierarchy,

    #[error("Duplicate role `{0}` in hierarchy")]
    #[diagnostic(
        code(campanile::authz::duplicate_role),
        help("Each role name may appear exactly once in [authz].hierarchy")
    )]
    DuplicateRole(String),

    #[error("Unknown role `{0}`")]
    #[diagnostic(
        code(campanile::authz::unknown_role),
        help("Declared roles are listed in [authz].hierarchy, lowest privilege first")
    )]
    UnknownRole(String),
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthzError::UnknownRole(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
