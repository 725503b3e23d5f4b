//! Per-request context.
//!
//! A [`RequestContext`] is created for every request entering the user API
//! and dropped when the response is produced. Later middleware attach derived
//! data to it (e.g. the authenticated user under `acl.user`), which handlers
//! and logs can read back.

use std::borrow::Cow;
use std::collections::HashMap;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use roster_auth::Role;
use roster_core::UserId;

use crate::app::errors::ApiError;

/// Namespace a request context is created under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextNamespace(Cow<'static, str>);

impl ContextNamespace {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Namespace used by the user API.
pub const REQUEST_NAMESPACE: ContextNamespace = ContextNamespace::from_static("request");

/// Address of a value inside a request context: `<namespace>:<key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKey {
    namespace: Cow<'static, str>,
    key: Cow<'static, str>,
}

/// Where the authenticated user is recorded.
pub const ACL_USER_KEY: ContextKey = ContextKey::from_static("request", "acl.user");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid context key '{0}' (expected '<namespace>:<key>')")]
pub struct ContextKeyError(pub String);

impl ContextKey {
    pub const fn from_static(namespace: &'static str, key: &'static str) -> Self {
        Self {
            namespace: Cow::Borrowed(namespace),
            key: Cow::Borrowed(key),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ContextKeyError> {
        match raw.split_once(':') {
            Some((ns, key)) if !ns.is_empty() && !key.is_empty() && !key.contains(':') => Ok(Self {
                namespace: Cow::Owned(ns.to_string()),
                key: Cow::Owned(key.to_string()),
            }),
            _ => Err(ContextKeyError(raw.to_string())),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl core::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}

/// Request-scoped key/value store.
#[derive(Debug, Clone)]
pub struct RequestContext {
    namespace: ContextNamespace,
    request_id: Uuid,
    values: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    pub fn new(namespace: ContextNamespace) -> Self {
        Self {
            namespace,
            request_id: Uuid::new_v4(),
            values: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }
}

/// Authenticated user for a request, resolved from the token and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalContext {
    user_id: UserId,
    role: Role,
    email: String,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, role: Role, email: String) -> Self {
        Self { user_id, role, email }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// The authenticated user as recorded in the request context under
/// [`ACL_USER_KEY`] by `attach_user_context`.
#[derive(Debug, Clone)]
pub struct AclUser {
    pub request_id: Uuid,
    pub principal: PrincipalContext,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AclUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .filter(|ctx| ctx.namespace() == ACL_USER_KEY.namespace())
            .ok_or_else(|| ApiError::internal(format!("no request context for '{ACL_USER_KEY}'")))?;

        let value = ctx
            .get(ACL_USER_KEY.key())
            .ok_or_else(|| ApiError::unauthorized("authentication required"))?;
        let principal = serde_json::from_value(value.clone())
            .map_err(|e| ApiError::internal(format!("malformed '{ACL_USER_KEY}' entry: {e}")))?;

        Ok(Self {
            request_id: ctx.request_id(),
            principal,
        })
    }
}
