use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::Instrument;

use roster_auth::{JwtValidator, Role, authorize_role};
use roster_infra::UserStore;

use crate::app::errors::ApiError;
use crate::context::{ContextKey, ContextNamespace, PrincipalContext, RequestContext};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub store: Arc<dyn UserStore>,
}

/// Open a fresh [`RequestContext`] for the request and run the rest of the
/// chain inside a span carrying its id.
pub async fn attach_request_context(
    State(namespace): State<ContextNamespace>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::new(namespace);
    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    req.extensions_mut().insert(ctx);

    next.run(req).instrument(span).await
}

/// Reject the request with 401 unless it carries a valid token for a user
/// that still exists. On success a [`PrincipalContext`] built from the stored
/// user is attached.
pub async fn require_authenticated(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers(), req.uri())?;

    let claims = state.jwt.validate(&token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "token rejected");
        ApiError::unauthorized("invalid or expired token")
    })?;

    let user = state
        .store
        .get(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("token subject no longer exists"))?;

    req.extensions_mut()
        .insert(PrincipalContext::new(user.id, user.role, user.email));

    Ok(next.run(req).await)
}

/// Copy the authenticated user into the request context under `key`.
pub async fn attach_user_context(
    State(key): State<ContextKey>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("authentication required"))?;

    let value = serde_json::to_value(&principal).map_err(|e| ApiError::internal(e.to_string()))?;

    let ctx = req
        .extensions_mut()
        .get_mut::<RequestContext>()
        .ok_or_else(|| ApiError::internal("request context missing"))?;
    if ctx.namespace() != key.namespace() {
        return Err(ApiError::internal(format!(
            "context namespace '{}' does not match key '{key}'",
            ctx.namespace()
        )));
    }
    ctx.set(key.key(), value);

    Ok(next.run(req).await)
}

/// Role gate. Requires [`require_authenticated`] to have run first.
pub async fn require_role(
    State(required): State<Role>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .ok_or_else(|| ApiError::unauthorized("authentication required"))?;

    if let Err(e) = authorize_role(principal.role(), required) {
        tracing::warn!(user_id = %principal.user_id(), error = %e, "access denied");
        return Err(e.into());
    }

    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Bearer header first; `access_token` query parameter only when the header
/// is absent. A present but malformed header is never retried from the query.
fn extract_token(headers: &HeaderMap, uri: &Uri) -> Result<String, ApiError> {
    if let Some(header) = headers.get(axum::http::header::AUTHORIZATION) {
        let header = header
            .to_str()
            .map_err(|_| ApiError::unauthorized("malformed authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("expected a bearer token"))?;
        return Ok(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.access_token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("authentication required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Extension, Json, Router,
        body::Body,
        http::{HeaderValue, StatusCode, header::AUTHORIZATION},
        middleware::from_fn_with_state,
        routing::get,
    };
    use roster_core::UserId;
    use tower::ServiceExt;

    use crate::context::{ACL_USER_KEY, AclUser, REQUEST_NAMESPACE};

    async fn whoami(user: AclUser) -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "role": user.principal.role(),
            "user_id": user.principal.user_id(),
        }))
    }

    fn principal() -> PrincipalContext {
        PrincipalContext::new(UserId::new(), Role::Admin, "admin@example.com".to_string())
    }

    /// Layers are listed innermost first; the last one sees the request first.
    fn app(namespace: Option<ContextNamespace>, principal: Option<PrincipalContext>) -> Router {
        let mut router = Router::new()
            .route("/", get(whoami))
            .layer(from_fn_with_state(ACL_USER_KEY, attach_user_context));
        if let Some(principal) = principal {
            router = router.layer(Extension(principal));
        }
        if let Some(namespace) = namespace {
            router = router.layer(from_fn_with_state(namespace, attach_request_context));
        }
        router
    }

    async fn call(router: Router) -> (StatusCode, serde_json::Value) {
        let res = router
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn user_context_is_readable_downstream() {
        let who = principal();
        let (status, body) = call(app(Some(REQUEST_NAMESPACE), Some(who.clone()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "admin");
        assert_eq!(body["user_id"], who.user_id().to_string());
    }

    #[tokio::test]
    async fn missing_request_context_is_internal_error() {
        let (status, body) = call(app(None, Some(principal()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");
    }

    #[tokio::test]
    async fn foreign_namespace_is_internal_error() {
        let (status, _) = call(app(Some(ContextNamespace::from_static("other")), Some(principal()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_principal_is_unauthorized() {
        let (status, body) = call(app(Some(REQUEST_NAMESPACE), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn reads_bearer_header() {
        let uri: Uri = "/api/users".parse().unwrap();
        assert_eq!(extract_token(&headers("Bearer abc.def"), &uri).unwrap(), "abc.def");
    }

    #[test]
    fn falls_back_to_query_parameter() {
        let uri: Uri = "/api/users/me?access_token=xyz".parse().unwrap();
        assert_eq!(extract_token(&HeaderMap::new(), &uri).unwrap(), "xyz");
    }

    #[test]
    fn malformed_header_does_not_fall_back() {
        let uri: Uri = "/api/users/me?access_token=xyz".parse().unwrap();
        let err = extract_token(&headers("Basic dXNlcjpwdw=="), &uri).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let uri: Uri = "/api/users?access_token=".parse().unwrap();
        assert!(matches!(
            extract_token(&HeaderMap::new(), &uri),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(extract_token(&headers("Bearer   "), &uri).is_err());
    }
}
