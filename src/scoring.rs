use crate::circuit_breaker::{create_oracle_circuit_breaker, OracleCircuitBreaker};
use crate::config::{ClassificationConfig, OracleConfig};
use crate::errors::AppError;
use crate::models::{CatalogCandidate, ConfidenceSource, ScoredCandidate, SearchStrategy};
use failsafe::futures::CircuitBreaker;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future returned by [`TextScorer::score_text_match`].
pub type ScoreFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u32>, AppError>> + Send + 'a>>;

/// Capability interface for the external text-match scoring oracle.
///
/// Implementations must return exactly one integer in [1, 100] per
/// candidate, in candidate order, or fail. Callers treat any failure as
/// "use the deterministic path", never as a request error.
pub trait TextScorer: Send + Sync {
    fn score_text_match<'a>(
        &'a self,
        description: &'a str,
        candidates: &'a [CatalogCandidate],
    ) -> ScoreFuture<'a>;

    /// Confidence-source tag stamped on results scored through this oracle.
    fn source_tag(&self) -> ConfidenceSource;
}

/// AI scoring oracle client.
///
/// Sends one batched prompt per classification request and parses the
/// reply as a JSON array of scores. All calls go through a circuit
/// breaker so a flapping oracle degrades to deterministic scoring fast
/// instead of timing out every request.
pub struct AiScorer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    breaker: OracleCircuitBreaker,
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    content: Vec<OracleContent>,
}

#[derive(Debug, Deserialize)]
struct OracleContent {
    text: Option<String>,
}

impl AiScorer {
    /// Builds the oracle client from configuration.
    ///
    /// # Returns
    ///
    /// * `Result<Self, AppError>` - The client, or an error when no API key
    ///   is configured or the HTTP client cannot be constructed.
    pub fn new(config: &OracleConfig) -> Result<Self, AppError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::InternalError("scoring oracle API key missing".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("failed to build oracle HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            breaker: create_oracle_circuit_breaker(),
        })
    }

    fn build_prompt(description: &str, candidates: &[CatalogCandidate]) -> String {
        let mut listing = String::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            listing.push_str(&format!(
                "{}. {} - {}\n",
                idx + 1,
                candidate.hs_code,
                candidate.product_description
            ));
        }

        format!(
            "Analyze how well each HS code matches the user's product description.\n\n\
             User's product description: \"{}\"\n\n\
             Rate each HS code on a scale of 1-100 based on how closely the official \
             description matches what the user described. Consider material types, product \
             categories, intended use, and specific features mentioned by the user.\n\n\
             HS Codes to evaluate:\n{}\n\
             Return only a JSON array of scores in the same order as listed above. \
             No explanations, just the numbers.\n\nFormat: [score1, score2, score3, ...]",
            description, listing
        )
    }

    async fn request_scores(
        &self,
        description: &str,
        candidates: &[CatalogCandidate],
    ) -> Result<Vec<u32>, AppError> {
        let prompt = Self::build_prompt(description, candidates);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("oracle request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApiError(format!(
                "oracle returned status {}",
                status
            )));
        }

        let body: OracleResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("failed to parse oracle response: {}", e))
        })?;

        let text = body
            .content
            .first()
            .and_then(|c| c.text.as_deref())
            .ok_or_else(|| {
                AppError::ExternalApiError("oracle response contained no text".to_string())
            })?;

        let scores: Vec<u32> = serde_json::from_str(text.trim()).map_err(|e| {
            AppError::ExternalApiError(format!("oracle returned malformed scores: {}", e))
        })?;

        if scores.len() != candidates.len() {
            return Err(AppError::ExternalApiError(format!(
                "oracle returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            )));
        }
        if scores.iter().any(|s| *s < 1 || *s > 100) {
            return Err(AppError::ExternalApiError(
                "oracle returned scores outside 1-100".to_string(),
            ));
        }

        Ok(scores)
    }
}

impl TextScorer for AiScorer {
    fn score_text_match<'a>(
        &'a self,
        description: &'a str,
        candidates: &'a [CatalogCandidate],
    ) -> ScoreFuture<'a> {
        Box::pin(async move {
            self.breaker
                .call(self.request_scores(description, candidates))
                .await
                .map_err(|e| match e {
                    failsafe::Error::Inner(inner) => inner,
                    failsafe::Error::Rejected => {
                        AppError::ExternalApiError("scoring oracle circuit open".to_string())
                    }
                })
        })
    }

    fn source_tag(&self) -> ConfidenceSource {
        if self.model.contains("claude") {
            ConfidenceSource::AiClaude
        } else {
            ConfidenceSource::AiEnhanced
        }
    }
}

/// Combines the optional AI oracle with deterministic data-quality and
/// term-overlap signals into a bounded confidence per candidate.
pub struct ConfidenceScorer {
    oracle: Option<Arc<dyn TextScorer>>,
    config: ClassificationConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ClassificationConfig, oracle: Option<Arc<dyn TextScorer>>) -> Self {
        Self { oracle, config }
    }

    /// Scores and ranks candidates, highest confidence first.
    ///
    /// The AI path is attempted when an oracle is configured; any oracle
    /// failure (error, malformed output, count mismatch) falls back to the
    /// deterministic path and is never surfaced to the caller.
    pub async fn score(
        &self,
        candidates: Vec<CatalogCandidate>,
        terms: &[String],
        business_type: Option<&str>,
        description: &str,
    ) -> Vec<ScoredCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut scored = match &self.oracle {
            Some(oracle) => match oracle.score_text_match(description, &candidates).await {
                Ok(scores) => {
                    tracing::debug!("Oracle scored {} candidates", scores.len());
                    candidates
                        .iter()
                        .zip(scores.iter())
                        .map(|(candidate, ai_score)| {
                            self.score_ai_candidate(
                                candidate,
                                *ai_score,
                                terms,
                                business_type,
                                oracle.source_tag(),
                            )
                        })
                        .collect::<Vec<_>>()
                }
                Err(e) => {
                    tracing::warn!("Oracle scoring failed, using deterministic fallback: {}", e);
                    candidates
                        .iter()
                        .map(|candidate| {
                            self.score_deterministic(
                                candidate,
                                terms,
                                business_type,
                                ConfidenceSource::DatabaseFallback,
                            )
                        })
                        .collect()
                }
            },
            None => candidates
                .iter()
                .map(|candidate| {
                    self.score_deterministic(
                        candidate,
                        terms,
                        business_type,
                        ConfidenceSource::Fallback,
                    )
                })
                .collect(),
        };

        scored.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }

    fn score_ai_candidate(
        &self,
        candidate: &CatalogCandidate,
        ai_score: u32,
        terms: &[String],
        business_type: Option<&str>,
        source: ConfidenceSource,
    ) -> ScoredCandidate {
        let cfg = &self.config;
        let term_ratio = term_match_ratio(&candidate.product_description, terms);
        let quality_ratio = data_quality_ratio(candidate, cfg);

        let mut score = f64::from(ai_score) / 100.0;
        if quality_ratio > cfg.data_quality_threshold {
            score += cfg.data_quality_bonus;
        }
        if term_ratio > cfg.term_match_threshold {
            score += cfg.term_match_bonus;
        }
        if candidate.usmca_eligible == Some(true) {
            score += cfg.usmca_bonus;
        }
        score += self.business_type_bonus(candidate, business_type);
        match candidate.strategy {
            SearchStrategy::MultiTerm => score += cfg.multi_term_bonus,
            SearchStrategy::BusinessType => score += cfg.business_type_search_bonus,
            SearchStrategy::SingleTerm => {}
        }

        self.finish(candidate, score, term_ratio, quality_ratio, source)
    }

    fn score_deterministic(
        &self,
        candidate: &CatalogCandidate,
        terms: &[String],
        business_type: Option<&str>,
        source: ConfidenceSource,
    ) -> ScoredCandidate {
        let cfg = &self.config;
        let term_ratio = term_match_ratio(&candidate.product_description, terms);
        let quality_ratio = data_quality_ratio(candidate, cfg);

        let score = deterministic_score(
            term_ratio,
            quality_ratio,
            candidate.usmca_eligible == Some(true),
            self.business_type_bonus(candidate, business_type) > 0.0,
            candidate.strategy,
            cfg,
        );

        self.finish(candidate, score, term_ratio, quality_ratio, source)
    }

    fn business_type_bonus(
        &self,
        candidate: &CatalogCandidate,
        business_type: Option<&str>,
    ) -> f64 {
        match (business_type, candidate.matched_business_type.as_deref()) {
            (Some(requested), Some(matched)) if requested == matched => {
                self.config.business_type_match_bonus
            }
            _ => 0.0,
        }
    }

    fn finish(
        &self,
        candidate: &CatalogCandidate,
        raw_score: f64,
        term_ratio: f64,
        quality_ratio: f64,
        source: ConfidenceSource,
    ) -> ScoredCandidate {
        let cfg = &self.config;
        let clamped = raw_score.clamp(cfg.min_confidence, cfg.max_confidence);
        let confidence = (clamped * 100.0).round() / 100.0;

        ScoredCandidate {
            hs_code: candidate.hs_code.clone(),
            product_description: candidate.product_description.clone(),
            mfn_tariff_rate: candidate.mfn_tariff_rate,
            usmca_tariff_rate: candidate.usmca_tariff_rate,
            usmca_eligible: candidate.usmca_eligible,
            strategy: candidate.strategy,
            matched_terms: candidate.matched_terms.clone(),
            confidence,
            confidence_source: source,
            match_quality: match_quality_label(confidence),
            term_match_ratio: term_ratio,
            data_quality_ratio: quality_ratio,
        }
    }
}

/// Raw deterministic confidence from precomputed signals, before the
/// clamp and rounding applied in `finish`. Weights are additive, so the
/// score is non-decreasing in both ratios.
pub fn deterministic_score(
    term_ratio: f64,
    quality_ratio: f64,
    usmca_eligible: bool,
    business_type_match: bool,
    strategy: SearchStrategy,
    cfg: &ClassificationConfig,
) -> f64 {
    let mut score = cfg.base_confidence_score;
    score += term_ratio * cfg.term_score_weight;
    score += quality_ratio * cfg.data_quality_weight;
    if usmca_eligible {
        score += cfg.usmca_eligibility_bonus;
    }
    if business_type_match {
        score += cfg.business_type_match_bonus;
    }
    match strategy {
        SearchStrategy::MultiTerm => score += cfg.multi_term_search_bonus,
        SearchStrategy::BusinessType => score += cfg.business_type_search_bonus,
        SearchStrategy::SingleTerm => {}
    }
    score
}

/// Fraction of search terms found as case-insensitive substrings of the
/// candidate description.
pub fn term_match_ratio(description: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let description_lower = description.to_lowercase();
    let matched = terms
        .iter()
        .filter(|term| description_lower.contains(&term.to_lowercase()))
        .count();
    matched as f64 / terms.len() as f64
}

/// Partial-credit score in [0, 1] for how complete a candidate's catalog
/// data is: rates present, a meaningful MFN/preferential spread, and a
/// substantial description.
pub fn data_quality_ratio(candidate: &CatalogCandidate, config: &ClassificationConfig) -> f64 {
    let mut score = 0.0;

    if candidate.mfn_tariff_rate.is_some() {
        score += config.tariff_rate_score;
    }
    if candidate.usmca_tariff_rate.is_some() {
        score += config.usmca_rate_score;
    }

    if let (Some(mfn), Some(usmca)) = (candidate.mfn_tariff_rate, candidate.usmca_tariff_rate) {
        let difference = (mfn - usmca).abs();
        if difference > config.tariff_difference_threshold_1 {
            score += config.tariff_difference_bonus_1;
        }
        if difference > config.tariff_difference_threshold_2 {
            score += config.tariff_difference_bonus_2;
        }
    }

    if candidate.product_description.chars().count() > config.description_length_threshold {
        score += config.description_length_bonus;
    }

    score.min(1.0)
}

/// Human-readable label for a confidence band.
pub fn match_quality_label(confidence: f64) -> String {
    let label = if confidence >= 0.9 {
        "Excellent match"
    } else if confidence >= 0.8 {
        "Very good match"
    } else if confidence >= 0.7 {
        "Good match"
    } else if confidence >= 0.5 {
        "Partial match"
    } else {
        "Poor match"
    };
    label.to_string()
}
