use std::sync::Arc;

use axum::{Json, Router, extract::State, extract::rejection::JsonRejection, routing::post};

use crate::app::controller::UserController;
use crate::app::dto::{LoginRequest, TokenResponse};
use crate::app::errors::ApiError;

/// Public endpoints for obtaining a token.
pub fn router() -> Router<Arc<UserController>> {
    Router::new().route("/local", post(login))
}

pub async fn login(
    State(ctl): State<Arc<UserController>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(req) = body?;
    Ok(Json(ctl.login(req).await?))
}
