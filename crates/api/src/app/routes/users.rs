//! `/api/users` route table.
//!
//! Every request under the mount point runs request-context creation,
//! authentication and user-context enrichment, in that order, before any
//! route-specific gate. Unmatched paths are no exception: the fallback sits
//! behind the same chain, so an anonymous caller sees 401 rather than 404.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, put},
};
use tower::ServiceBuilder;

use roster_auth::{Role, UserProfile};
use roster_core::UserId;

use crate::app::controller::UserController;
use crate::app::dto::{ChangePasswordRequest, CreateUserRequest, SetPasswordRequest, UpdateUserRequest, UserListResponse};
use crate::app::errors::ApiError;
use crate::context::{ACL_USER_KEY, AclUser, REQUEST_NAMESPACE};
use crate::middleware::{self, AuthState};

pub fn router(controller: Arc<UserController>, auth: AuthState) -> Router {
    let by_id = format!("/{}", UserController::PARAM);

    Router::new()
        .route(
            "/",
            get(index)
                .post(create)
                .route_layer(from_fn_with_state(Role::Admin, middleware::require_role)),
        )
        .route("/me", get(me))
        .route(
            &by_id,
            get(show)
                .delete(destroy)
                .put(update)
                .patch(update)
                .route_layer(from_fn_with_state(Role::Admin, middleware::require_role)),
        )
        .route(
            &format!("{by_id}/password"),
            put(change_password).patch(change_password),
        )
        .route(
            &format!("{by_id}/admin"),
            put(set_password)
                .patch(set_password)
                .route_layer(from_fn_with_state(Role::Admin, middleware::require_role)),
        )
        .fallback(not_found)
        .with_state(controller)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(REQUEST_NAMESPACE, middleware::attach_request_context))
                .layer(from_fn_with_state(auth, middleware::require_authenticated))
                .layer(from_fn_with_state(ACL_USER_KEY, middleware::attach_user_context)),
        )
}

fn parse_id(raw: &str) -> Result<UserId, ApiError> {
    Ok(raw.parse::<UserId>()?)
}

pub async fn index(State(ctl): State<Arc<UserController>>) -> Result<Json<UserListResponse>, ApiError> {
    Ok(Json(ctl.index().await?))
}

pub async fn create(
    State(ctl): State<Arc<UserController>>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let Json(req) = body?;
    Ok((StatusCode::CREATED, Json(ctl.create(req).await?)))
}

pub async fn me(State(ctl): State<Arc<UserController>>, user: AclUser) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(ctl.me(&user.principal).await?))
}

pub async fn show(
    State(ctl): State<Arc<UserController>>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(ctl.show(parse_id(&id)?).await?))
}

pub async fn update(
    State(ctl): State<Arc<UserController>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserProfile>, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    Ok(Json(ctl.update(id, req).await?))
}

pub async fn destroy(State(ctl): State<Arc<UserController>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    ctl.destroy(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_password(
    State(ctl): State<Arc<UserController>>,
    user: AclUser,
    Path(id): Path<String>,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    tracing::debug!(request_id = %user.request_id, user_id = %user.principal.user_id(), "password change requested");
    ctl.change_password(&user.principal, id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_password(
    State(ctl): State<Arc<UserController>>,
    Path(id): Path<String>,
    body: Result<Json<SetPasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    ctl.set_password(id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn not_found() -> ApiError {
    ApiError::not_found("no such route")
}
