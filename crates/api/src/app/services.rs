use std::sync::Arc;

use roster_infra::{InMemoryUserStore, StoreError, UserStore};

use crate::config::ApiConfig;

/// Pick the user store: Postgres when built with the `postgres` feature and
/// `DATABASE_URL` is set, in-memory otherwise.
pub async fn build_store(config: &ApiConfig) -> Result<Arc<dyn UserStore>, StoreError> {
    match config.database_url.as_deref() {
        #[cfg(feature = "postgres")]
        Some(url) => connect_postgres(url).await,
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            tracing::warn!("DATABASE_URL is set but the postgres feature is disabled; users are kept in memory");
            Ok(in_memory())
        }
        None => Ok(in_memory()),
    }
}

fn in_memory() -> Arc<dyn UserStore> {
    tracing::info!("using in-memory user store");
    Arc::new(InMemoryUserStore::new())
}

#[cfg(feature = "postgres")]
async fn connect_postgres(url: &str) -> Result<Arc<dyn UserStore>, StoreError> {
    let store = roster_infra::PostgresUserStore::connect(url).await?;
    store.ensure_schema().await?;
    tracing::info!("using postgres user store");
    Ok(Arc::new(store))
}
