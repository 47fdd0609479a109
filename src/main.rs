mod cache_key;
mod catalog;
mod circuit_breaker;
mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod pipeline;
mod qualification;
mod referral;
mod scoring;
mod search;
mod tariff;
mod terms;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::catalog::CatalogService;
use crate::config::Config;
use crate::db::Database;
use crate::pipeline::Classifier;
use crate::qualification::UsmcaEngine;
use crate::referral::ReferralSystem;
use crate::scoring::{AiScorer, ConfidenceScorer, TextScorer};
use crate::search::SearchEngine;
use crate::tariff::TariffService;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the pipeline
/// engines with their caches, and the HTTP routes with rate limiting and
/// body-size middleware, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tariffpath_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let catalog = CatalogService::new(db.pool.clone());

    // AI scoring oracle is optional: without a key, the pipeline runs on
    // deterministic scoring only
    let oracle: Option<Arc<dyn TextScorer>> = if config.oracle.api_key.is_some() {
        match AiScorer::new(&config.oracle) {
            Ok(scorer) => {
                tracing::info!("✓ AI scoring oracle initialized: {}", config.oracle.model);
                Some(Arc::new(scorer))
            }
            Err(e) => {
                tracing::error!("Failed to initialize scoring oracle: {}", e);
                None
            }
        }
    } else {
        None
    };

    let classifier = Arc::new(Classifier::new(
        SearchEngine::new(catalog.clone(), config.classification.clone()),
        ConfidenceScorer::new(config.classification.clone(), oracle),
        config.classification.clone(),
        &config.cache,
    ));
    tracing::info!("Classification pipeline initialized");

    let usmca = Arc::new(UsmcaEngine::new(
        catalog.clone(),
        config.usmca.clone(),
        &config.cache,
    ));
    let tariff = Arc::new(TariffService::new(
        catalog.clone(),
        config.tariff.clone(),
        &config.cache,
    ));
    let referral = Arc::new(ReferralSystem::new(
        config.classification.clone(),
        config.usmca.clone(),
        config.tariff.clone(),
    ));
    tracing::info!("Qualification, tariff and referral engines initialized");

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        db: db.pool.clone(),
        config: config.clone(),
        classifier,
        usmca,
        tariff,
        referral,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("valid rate limiter configuration"),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/api/v1/classify", post(handlers::classify))
        .route("/api/v1/qualify", post(handlers::qualify))
        .route("/api/v1/tariff/rates/:hs_code", get(handlers::tariff_rates))
        .route("/api/v1/savings", post(handlers::savings))
        .route(
            "/api/v1/referral/evaluate",
            post(handlers::evaluate_referral),
        )
        .route("/api/v1/analyze", post(handlers::analyze))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload (requests are small JSON)
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
