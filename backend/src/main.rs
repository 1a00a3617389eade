//! TerraView - Backend Server
//!
//! Agricultural monitoring API: farm locations, farmer contributions with
//! admin verification and point-based rankings, and cached bloom predictions
//! from an external ML service.

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod external;
mod handlers;
mod middleware;
mod routes;
mod services;

pub use config::Config;

use external::{BloomModel, BloomModelClient};
use services::followup::{run_worker, MAX_ATTEMPTS};
use services::{FollowUpQueue, RankingService};

/// Delay before a failed follow-up task is retried
const FOLLOWUP_BACKOFF: Duration = Duration::from_millis(500);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub bloom_model: Arc<dyn BloomModel>,
    pub followups: FollowUpQueue,
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "terraview_server=debug,tower_http=debug,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;

    init_tracing(&config.log_format);

    tracing::info!("Starting TerraView Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let bloom_model = BloomModelClient::new(
        config.bloom_model.base_url.clone(),
        Duration::from_secs(config.bloom_model.request_timeout_secs),
    )?;
    tracing::info!(base_url = %config.bloom_model.base_url, "Bloom model client ready");

    // Ranking refreshes run off the request path
    let (followups, followup_rx) = FollowUpQueue::channel();
    tokio::spawn(run_worker(
        followup_rx,
        RankingService::new(db_pool.clone()),
        MAX_ATTEMPTS,
        FOLLOWUP_BACKOFF,
    ));

    // Create application state
    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        bloom_model: Arc::new(bloom_model),
        followups,
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "TerraView API v1.0"
}

/// Liveness probe
async fn health_check() -> &'static str {
    "OK"
}
