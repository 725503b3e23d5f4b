use std::sync::Arc;

use anyhow::Context;

use roster_api::app::{self, UserController, services};
use roster_api::config::ApiConfig;
use roster_auth::{Hs256Jwt, PasswordHasher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env().context("invalid configuration")?;
    roster_observability::init(config.log_format);
    tracing::debug!(?config, "configuration loaded");

    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let store = services::build_store(&config)
        .await
        .context("failed to initialize user store")?;
    let tokens = Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes(), config.token_ttl));
    let controller = Arc::new(UserController::new(store, PasswordHasher::default(), tokens));

    if let Some(seed) = &config.seed_admin {
        let created = controller
            .ensure_admin(&seed.email, &seed.password)
            .await
            .context("failed to seed admin account")?;
        if created {
            tracing::info!(email = %seed.email, "seeded admin account");
        }
    }

    let app = app::build_app(controller);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
