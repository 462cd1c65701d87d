use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kisan_setu::config::CONFIG;
use kisan_setu::db::DatabaseManager;
use kisan_setu::router::{AppState, app_router};
use kisan_setu::service::token::TokenSigner;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &*CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        mongodb_url = %cfg.mongodb_url,
        database = %cfg.database_name,
        fallback_path = %cfg.fallback_path.display(),
        loglevel = %cfg.loglevel,
        "starting Kisan Setu API"
    );

    let db = Arc::new(DatabaseManager::new(cfg.db()));
    db.connect().await;

    let state = AppState::new(
        db.clone(),
        TokenSigner::new(&cfg.secret_key, cfg.token_ttl_minutes),
    );
    let app = app_router(state);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.disconnect().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
