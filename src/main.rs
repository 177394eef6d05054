use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use image_jobs::{
    app_state::AppState,
    config::AppConfig,
    db::{self, JobStore, MemoryJobStore, PgJobStore},
    routes,
    services::{generator::GeminiClient, lifecycle::JobManager},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing image-jobs server");

    let prometheus_handle =
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder");

    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!(
                max_connections = config.db_max_connections,
                "Connecting to PostgreSQL database"
            );
            let db_pool = db::init_pool(database_url, &config.pool_settings())
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running database migrations");
            db::run_migrations(&db_pool)
                .await
                .expect("Failed to run database migrations");

            Arc::new(PgJobStore::new(db_pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory and lost on restart");
            Arc::new(MemoryJobStore::new())
        }
    };

    tracing::info!(model = %config.gemini_model, "Initializing Gemini client");
    let generator = GeminiClient::new(
        &config.gemini_base_url,
        &config.gemini_model,
        &config.gemini_api_key,
        config.generation_timeout(),
    )
    .expect("Failed to initialize Gemini client");

    let jobs = JobManager::new(store.clone(), Arc::new(generator), config.manager_settings());

    jobs.resume_pending()
        .await
        .expect("Failed to resume pending jobs");

    let state = AppState::new(store, jobs);

    let app = routes::router(state)
        .merge(routes::metrics::router(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
