use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::authz::hierarchy::ClaimSet;
use crate::authz::{token, PolicyEvaluator};

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Role names claimed for the principal, e.g. `["teacher"]`.
    pub roles: Vec<String>,
    /// Encoded policy token, e.g. `"role.teacher.true"`.
    pub policy: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    /// Lowest privilege first.
    pub roles: Vec<String>,
}

pub fn router(evaluator: Arc<PolicyEvaluator>) -> Router {
    Router::new()
        .route("/v1/check", post(handle_check))
        .route("/v1/roles", get(handle_roles))
        .route("/healthz", get(health))
        .with_state(evaluator)
}

async fn handle_check(
    State(evaluator): State<Arc<PolicyEvaluator>>,
    Json(req): Json<CheckRequest>,
) -> impl IntoResponse {
    let Some(requirement) = token::decode(evaluator.hierarchy(), &req.policy) else {
        let body = json!({ "error": format!("unrecognized policy token `{}`", req.policy) });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };

    let claims = ClaimSet::from_roles(req.roles);
    let allowed = evaluator.evaluate(&claims, requirement);
    Json(CheckResponse { allowed }).into_response()
}

async fn handle_roles(State(evaluator): State<Arc<PolicyEvaluator>>) -> impl IntoResponse {
    Json(RolesResponse {
        roles: evaluator.hierarchy().roles().to_vec(),
    })
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
