use std::sync::Arc;
use std::time::Duration;

use estate_api::{
    api::{create_router, AppState},
    config::{Config, StoreBackend},
    db::{create_pool, create_redis_client, run_migrations, Cache, MemoryStore, PgStore, Store},
    services::{spawn_expiration_job, LogMailer, Mailer, WebhookMailer},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("estate_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match config.backend()? {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database_url).await?;
            run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
    };

    let (cache, cache_writer) = match &config.redis_url {
        Some(url) => {
            let (cache, handle) = Cache::connect(create_redis_client(url)?).await?;
            tracing::info!("Popular lists cached in Redis");
            (Some(cache), Some(handle))
        }
        None => (None, None),
    };

    let mailer: Arc<dyn Mailer> = match &config.mail_webhook_url {
        Some(url) => Arc::new(WebhookMailer::new(url.clone())),
        None => Arc::new(LogMailer),
    };
    tracing::info!(mailer = mailer.name(), "Mailer configured");

    let sweep_interval = Duration::from_secs(config.expiration_sweep_interval_secs);
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState::new(config, store, cache, mailer);
    let expiration_job = spawn_expiration_job(state.expiration.clone(), sweep_interval);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    expiration_job.shutdown().await;
    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
