use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

mod api;
mod config;
mod db;
mod live_feed;

use api::AppState;
use config::Config;
use db::Database;
use live_feed::scheduler::SchedulerHandle;
use live_feed::{
    ApiSportsHttp, ApiTransport, CredentialPool, RefreshScheduler, SnapshotStore, SportClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let transport: Arc<dyn ApiTransport> =
        Arc::new(ApiSportsHttp::new(config.base_urls(), config.http_timeout())?);
    let pool = Arc::new(CredentialPool::new(config.api_keys(), transport.clone()));
    info!("Loaded {} API-Sports key(s)", pool.len());

    let client = Arc::new(
        SportClient::new(transport, pool.clone()).with_max_records(config.max_matches_per_sport),
    );
    let store = Arc::new(SnapshotStore::new());

    let scheduler = RefreshScheduler::new(client, store.clone(), config.scheduler_settings())
        .with_favorites(Arc::new(db.clone()));

    if config.enable_debug_routes {
        warn!("Credential debug routes are enabled");
    }
    let app = api::router(
        AppState {
            store,
            pool,
            db,
        },
        config.enable_debug_routes,
    );
    let addr: SocketAddr = config
        .feed_addr
        .parse()
        .with_context(|| format!("Invalid FEED_ADDR {}", config.feed_addr))?;
    let listener = TcpListener::bind(addr).await?;
    info!("Live feed listening on http://{}", addr);

    let handle = Arc::new(scheduler).start();
    serve_feed(listener, app, handle, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    })
    .await
}

/// Serve until `signal` fires or the server fails, then stop the scheduler
/// tasks before reporting the outcome.
async fn serve_feed(
    listener: TcpListener,
    app: Router,
    scheduler: SchedulerHandle,
    signal: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await;
    if let Err(e) = &served {
        error!("Feed server failed: {}", e);
    }

    scheduler.shutdown().await;
    info!("Live feed stopped");
    served.context("Feed server error")
}
