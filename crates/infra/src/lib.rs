//! Infrastructure layer: user persistence adapters.

pub mod store;

pub use store::{InMemoryUserStore, StoreError, UserStore};
#[cfg(feature = "postgres")]
pub use store::PostgresUserStore;
