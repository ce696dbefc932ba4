use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boxoffice::api::{self, AppState};
use boxoffice::config::Config;
use boxoffice::db;
use boxoffice::services::payment_gateway::PaystackGateway;
use boxoffice::services::redis::RedisService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting boxoffice server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Connect the lock backend (circuit breaker lives inside the service)
    let redis = RedisService::connect(&config.redis_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {e}"))?;
    tracing::info!("Lock backend connected");

    // Payment gateway adapter
    let gateway = Arc::new(PaystackGateway::new(&config)?);

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        redis,
        gateway,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(api::purchases::router())
        .merge(api::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
