use crate::cache_key;
use crate::config::{CacheConfig, ClassificationConfig};
use crate::errors::AppError;
use crate::models::{
    AnalysisBundle, AnalyzeRequest, ClassificationRequest, ClassificationResponse,
    QualificationRequest, ReferralNotice, SavingsRequest, ScoredCandidate,
};
use crate::qualification::UsmcaEngine;
use crate::referral::{generate_referral_code, ReferralSystem};
use crate::scoring::ConfidenceScorer;
use crate::search::SearchEngine;
use crate::tariff::TariffService;
use crate::terms::extract_search_terms;
use moka::future::Cache;
use std::time::Duration;

const CLASSIFICATION_DISCLAIMERS: [&str; 2] = [
    "HS classification may require professional review.",
    "Results are estimates. Professional verification required.",
];

/// End-to-end classification pipeline: terms, search, scoring, selection.
///
/// Every outcome is a well-formed response. Requests that produce no
/// qualified candidates come back as a referral response rather than an
/// error, so callers always get an actionable answer.
pub struct Classifier {
    search: SearchEngine,
    scorer: ConfidenceScorer,
    config: ClassificationConfig,
    cache: Cache<String, ClassificationResponse>,
}

impl Classifier {
    pub fn new(
        search: SearchEngine,
        scorer: ConfidenceScorer,
        config: ClassificationConfig,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            search,
            scorer,
            config,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(cache.classification_ttl_secs))
                .max_capacity(cache.max_capacity)
                .build(),
        }
    }

    /// Classifies a product description into ranked candidate codes.
    pub async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResponse, AppError> {
        let key = cache_key::classification_key(
            &request.product_description,
            request.business_type.as_deref(),
            request.source_country.as_deref(),
        );
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!("Classification cache hit");
            return Ok(cached);
        }

        tracing::info!("Step 1: Extracting search terms");
        let terms = extract_search_terms(&request.product_description, &self.config)?;
        if terms.is_empty() {
            let response = referral_response(
                "Product description contains no searchable terms",
                vec![],
            );
            self.cache.insert(key, response.clone()).await;
            return Ok(response);
        }

        tracing::info!("Step 2: Searching catalog with {} terms", terms.len());
        let candidates = self
            .search
            .find_candidates(&terms, request.business_type.as_deref())
            .await;
        if candidates.is_empty() {
            let response = referral_response(
                "No catalog matches found for the product description",
                terms,
            );
            self.cache.insert(key, response.clone()).await;
            return Ok(response);
        }

        tracing::info!("Step 3: Scoring {} candidates", candidates.len());
        let scored = self
            .scorer
            .score(
                candidates,
                &terms,
                request.business_type.as_deref(),
                &request.product_description,
            )
            .await;

        tracing::info!("Step 4: Selecting qualified results");
        let results = select_results(scored, &self.config);
        let response = if results.is_empty() {
            referral_response(
                "No candidates met the minimum confidence threshold",
                terms,
            )
        } else {
            let high_confidence_count = results
                .iter()
                .filter(|r| r.confidence >= self.config.high_confidence_threshold)
                .count();
            ClassificationResponse {
                results,
                search_terms: terms,
                high_confidence_count,
                recommends_professional_review: high_confidence_count == 0,
                professional_referral: None,
                disclaimers: CLASSIFICATION_DISCLAIMERS
                    .iter()
                    .map(|d| d.to_string())
                    .collect(),
            }
        };

        self.cache.insert(key, response.clone()).await;
        Ok(response)
    }

    /// Cache statistics for the health endpoint.
    pub fn cache_entries(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// Drops candidates below the minimum confidence threshold. Input is
/// already sorted by confidence descending.
pub fn select_results(
    scored: Vec<ScoredCandidate>,
    config: &ClassificationConfig,
) -> Vec<ScoredCandidate> {
    scored
        .into_iter()
        .filter(|c| c.confidence >= config.min_confidence_threshold)
        .collect()
}

/// Builds the empty-result referral response.
pub fn referral_response(reason: &str, search_terms: Vec<String>) -> ClassificationResponse {
    let reasons = vec![reason.to_string()];
    ClassificationResponse {
        results: vec![],
        search_terms,
        high_confidence_count: 0,
        recommends_professional_review: true,
        professional_referral: Some(ReferralNotice {
            reason: reason.to_string(),
            message: "Professional customs broker consultation required.".to_string(),
            referral_code: generate_referral_code(&reasons),
        }),
        disclaimers: CLASSIFICATION_DISCLAIMERS
            .iter()
            .map(|d| d.to_string())
            .collect(),
    }
}

/// Runs the full decision pipeline for one product.
///
/// Qualification and savings run only when the request carries their
/// inputs and classification produced a top candidate; the referral
/// evaluation always runs over whatever stages completed.
pub async fn analyze_product(
    classifier: &Classifier,
    usmca: &UsmcaEngine,
    tariff: &TariffService,
    referral: &ReferralSystem,
    request: &AnalyzeRequest,
) -> Result<AnalysisBundle, AppError> {
    tracing::info!("Analysis step 1: Classification");
    let classification = classifier
        .classify(&ClassificationRequest {
            product_description: request.product_description.clone(),
            business_type: request.business_type.clone(),
            source_country: request.source_country.clone(),
        })
        .await?;

    let top_code = classification.results.first().map(|r| r.hs_code.clone());

    let qualification = match (
        &top_code,
        &request.component_origins,
        &request.manufacturing_location,
    ) {
        (Some(code), Some(components), Some(location)) => {
            tracing::info!("Analysis step 2: USMCA qualification for {}", code);
            Some(
                usmca
                    .qualify(&QualificationRequest {
                        hs_code: code.clone(),
                        component_origins: components.clone(),
                        manufacturing_location: location.clone(),
                        business_type: request.business_type.clone(),
                    })
                    .await?,
            )
        }
        _ => None,
    };

    let savings = match &top_code {
        Some(code) => {
            tracing::info!("Analysis step 3: Savings calculation for {}", code);
            Some(
                tariff
                    .savings(&SavingsRequest {
                        hs_code: code.clone(),
                        trade_volume: request.trade_volume.clone(),
                        supplier_country: request.source_country.clone(),
                        destination_country: request.destination_country.clone(),
                    })
                    .await?,
            )
        }
        None => None,
    };

    tracing::info!("Analysis step 4: Referral evaluation");
    let referral_evaluation =
        referral.evaluate(&classification, qualification.as_ref(), savings.as_ref());

    Ok(AnalysisBundle {
        classification,
        qualification,
        savings,
        referral: referral_evaluation,
    })
}
