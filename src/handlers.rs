use crate::config::Config;
use crate::errors::AppError;
use crate::models::{
    AnalysisBundle, AnalyzeRequest, ClassificationRequest, ClassificationResponse,
    QualificationRequest, QualificationResult, ReferralEvaluation, SavingsRequest, SavingsResult,
    TariffRateRecord,
};
use crate::pipeline::{self, Classifier};
use crate::qualification::UsmcaEngine;
use crate::referral::ReferralSystem;
use crate::tariff::TariffService;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state injected into handlers.
///
/// Engines are constructed once at startup and own their caches, so
/// every request shares the same cache state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Classification pipeline.
    pub classifier: Arc<Classifier>,
    /// USMCA qualification engine.
    pub usmca: Arc<UsmcaEngine>,
    /// Tariff rate and savings service.
    pub tariff: Arc<TariffService>,
    /// Professional referral evaluator.
    pub referral: Arc<ReferralSystem>,
}

/// Health check endpoint.
///
/// Returns the service status, version, and cache statistics.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "tariffpath-api",
            "version": env!("CARGO_PKG_VERSION"),
            "cache": {
                "classification_entries": state.classifier.cache_entries(),
            }
        })),
    )
}

/// POST /api/v1/classify
///
/// Classifies a product description into ranked HS code candidates.
/// An empty candidate set is a 200 with a professional referral notice,
/// not an error.
pub async fn classify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClassificationRequest>,
) -> Result<Json<ClassificationResponse>, AppError> {
    tracing::info!(
        "POST /classify - description length {}",
        request.product_description.len()
    );

    let response = state.classifier.classify(&request).await?;

    tracing::info!(
        "Classification produced {} results, {} high confidence",
        response.results.len(),
        response.high_confidence_count
    );
    Ok(Json(response))
}

/// POST /api/v1/qualify
///
/// Evaluates a bill of materials against the applicable USMCA origin rule.
pub async fn qualify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QualificationRequest>,
) -> Result<Json<QualificationResult>, AppError> {
    tracing::info!(
        "POST /qualify - {} with {} components",
        request.hs_code,
        request.component_origins.len()
    );

    let result = state.usmca.qualify(&request).await?;

    tracing::info!(
        "Qualification for {}: qualified={}, content={:.1}%",
        request.hs_code,
        result.qualified,
        result.regional_content_percentage
    );
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct RatesParams {
    pub destination: Option<String>,
}

/// GET /api/v1/tariff/rates/:hs_code
///
/// Resolves MFN and USMCA rates through the lookup hierarchy.
pub async fn tariff_rates(
    State(state): State<Arc<AppState>>,
    Path(hs_code): Path<String>,
    Query(params): Query<RatesParams>,
) -> Result<Json<TariffRateRecord>, AppError> {
    tracing::info!("GET /tariff/rates/{}", hs_code);

    let record = state
        .tariff
        .rates(&hs_code, params.destination.as_deref())
        .await?;

    tracing::info!(
        "Rates for {}: mfn={:.1}% usmca={:.1}% ({:?})",
        hs_code,
        record.mfn_rate,
        record.usmca_rate,
        record.match_type
    );
    Ok(Json(record))
}

/// POST /api/v1/savings
///
/// Computes annual USMCA savings for a code and trade volume.
pub async fn savings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SavingsRequest>,
) -> Result<Json<SavingsResult>, AppError> {
    tracing::info!("POST /savings - {}", request.hs_code);

    let result = state.tariff.savings(&request).await?;

    tracing::info!(
        "Savings for {}: ${:.0}/year ({:.1}%)",
        request.hs_code,
        result.annual_savings,
        result.savings_percentage
    );
    Ok(Json(result))
}

/// POST /api/v1/referral/evaluate
///
/// Runs the pipeline stages the request carries inputs for and returns
/// only the escalation decision. Internal failures produce the
/// conservative referral rather than an error response.
pub async fn evaluate_referral(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<ReferralEvaluation>, AppError> {
    tracing::info!("POST /referral/evaluate");

    match pipeline::analyze_product(
        &state.classifier,
        &state.usmca,
        &state.tariff,
        &state.referral,
        &request,
    )
    .await
    {
        Ok(bundle) => Ok(Json(bundle.referral)),
        Err(e @ AppError::InvalidInput(_)) | Err(e @ AppError::InvalidComponents(_)) => Err(e),
        Err(e) => {
            tracing::error!("Referral evaluation failed: {}, using conservative decision", e);
            Ok(Json(state.referral.conservative_fallback()))
        }
    }
}

/// POST /api/v1/analyze
///
/// Runs the full decision pipeline: classification, then qualification
/// and savings where the request carries their inputs, then the merged
/// referral evaluation.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisBundle>, AppError> {
    tracing::info!("POST /analyze");

    let bundle = pipeline::analyze_product(
        &state.classifier,
        &state.usmca,
        &state.tariff,
        &state.referral,
        &request,
    )
    .await?;

    tracing::info!(
        "Analysis complete: {} classification results, referral={}",
        bundle.classification.results.len(),
        bundle.referral.requires_professional
    );
    Ok(Json(bundle))
}
