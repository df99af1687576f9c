use axum::{routing::get, Router};
use http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod db;
mod error;
mod fingerprint;
mod issuance;
mod ledger;
mod models;
mod routes;
mod seed;
mod store;
mod validate;

use config::Config;
use store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "certvault=info,axum=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    match config.database_url.clone() {
        Some(url) => {
            let pool = db::connect(&url, config.max_connections).await?;
            tracing::info!("connected to postgres");
            serve(config, PgStore::new(pool)).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data will not persist");
            serve(config, MemoryStore::new()).await
        }
    }
}

async fn serve<S: Store>(config: Config, store: S) -> anyhow::Result<()> {
    if config.seed_demo_data {
        seed::seed_demo_data(&store).await?;
    }

    let state = routes::AppState::new(store, &config.fallback_instructor);
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.allowed_origins)?);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(origins))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error=%e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
