//! User storage abstraction and its adapters.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use roster_auth::User;
use roster_core::UserId;

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryUserStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresUserStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,

    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),

    /// Optimistic concurrency check failed.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence boundary for user accounts.
///
/// Emails are unique across the store. `update` is guarded by the entity
/// revision: the stored revision must be exactly one behind the incoming one.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    /// Lookup by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// All users, oldest first.
    async fn list(&self) -> Result<Vec<User>, StoreError>;

    async fn insert(&self, user: User) -> Result<(), StoreError>;

    async fn update(&self, user: User) -> Result<(), StoreError>;

    async fn delete(&self, id: &UserId) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn get(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        (**self).get(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        (**self).list().await
    }

    async fn insert(&self, user: User) -> Result<(), StoreError> {
        (**self).insert(user).await
    }

    async fn update(&self, user: User) -> Result<(), StoreError> {
        (**self).update(user).await
    }

    async fn delete(&self, id: &UserId) -> Result<(), StoreError> {
        (**self).delete(id).await
    }
}
