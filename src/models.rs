use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Incoming classification request.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationRequest {
    pub product_description: String,
    pub business_type: Option<String>,
    pub source_country: Option<String>,
}

/// Which search strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    SingleTerm,
    MultiTerm,
    BusinessType,
}

/// One row from the reference catalog's product table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProductRecord {
    pub hs_code: String,
    pub product_description: String,
    pub mfn_tariff_rate: Option<f64>,
    pub usmca_tariff_rate: Option<f64>,
    pub usmca_eligible: Option<bool>,
}

/// A catalog row annotated with search provenance.
///
/// Candidates are deduplicated by `hs_code` with first-seen-wins, so the
/// strategy tag reflects the first strategy that found the code.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogCandidate {
    pub hs_code: String,
    pub product_description: String,
    pub mfn_tariff_rate: Option<f64>,
    pub usmca_tariff_rate: Option<f64>,
    pub usmca_eligible: Option<bool>,
    pub strategy: SearchStrategy,
    /// Terms that produced this candidate (single or joined combination).
    pub matched_terms: Vec<String>,
    /// Set only by the business-type strategy.
    pub matched_business_type: Option<String>,
}

impl CatalogCandidate {
    pub fn from_product(
        product: ProductRecord,
        strategy: SearchStrategy,
        matched_terms: Vec<String>,
    ) -> Self {
        Self {
            hs_code: product.hs_code,
            product_description: product.product_description,
            mfn_tariff_rate: product.mfn_tariff_rate,
            usmca_tariff_rate: product.usmca_tariff_rate,
            usmca_eligible: product.usmca_eligible,
            strategy,
            matched_terms,
            matched_business_type: None,
        }
    }
}

/// How a candidate's confidence value was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    /// AI oracle score plus database quality adjustments.
    AiEnhanced,
    /// Same path, scored by a Claude-family model.
    AiClaude,
    /// Deterministic scoring because the oracle failed or mismatched.
    DatabaseFallback,
    /// Deterministic scoring because no oracle is configured.
    Fallback,
}

/// A candidate with its final confidence and component sub-scores.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub hs_code: String,
    pub product_description: String,
    pub mfn_tariff_rate: Option<f64>,
    pub usmca_tariff_rate: Option<f64>,
    pub usmca_eligible: Option<bool>,
    pub strategy: SearchStrategy,
    pub matched_terms: Vec<String>,
    pub confidence: f64,
    pub confidence_source: ConfidenceSource,
    /// Human-readable label for the confidence band.
    pub match_quality: String,
    pub term_match_ratio: f64,
    pub data_quality_ratio: f64,
}

/// Routing notice attached when no qualified candidates survive.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralNotice {
    pub reason: String,
    pub message: String,
    pub referral_code: String,
}

/// Final classification response.
///
/// An empty `results` list always comes with a `professional_referral`
/// notice; the pipeline never returns an empty success.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResponse {
    pub results: Vec<ScoredCandidate>,
    pub search_terms: Vec<String>,
    pub high_confidence_count: usize,
    pub recommends_professional_review: bool,
    pub professional_referral: Option<ReferralNotice>,
    pub disclaimers: Vec<String>,
}

impl ClassificationResponse {
    /// True when at least one qualified candidate was returned.
    pub fn is_success(&self) -> bool {
        !self.results.is_empty() && self.professional_referral.is_none()
    }

    /// Confidence of the top-ranked candidate, if any.
    pub fn top_confidence(&self) -> Option<f64> {
        self.results.first().map(|r| r.confidence)
    }
}

// ---------------------------------------------------------------------------
// USMCA qualification
// ---------------------------------------------------------------------------

/// One line of a bill of materials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentOrigin {
    pub origin_country: String,
    pub value_percentage: f64,
    pub description: Option<String>,
}

/// A component annotated with USMCA membership of its origin.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentBreakdown {
    pub origin_country: String,
    pub value_percentage: f64,
    pub description: Option<String>,
    pub is_usmca_member: bool,
}

/// The four USMCA origin rule kinds, with their type-specific payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    RegionalContent { threshold: f64 },
    TariffShift { requirement: String },
    WhollyObtained,
    SpecificManufacturing { process_requirements: String },
}

/// Where a qualification rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    DatabaseLookup,
    EmergencyFallback,
}

/// A resolved qualification rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualificationRule {
    pub hs_code: Option<String>,
    pub kind: RuleKind,
    pub required_documentation: Vec<String>,
    pub source: RuleSource,
}

/// Raw `usmca_rules` row before conversion into a typed rule.
#[derive(Debug, Clone, FromRow)]
pub struct UsmcaRuleRow {
    pub hs_code: Option<String>,
    pub product_category: Option<String>,
    pub hs_chapter: Option<String>,
    pub rule_type: String,
    pub regional_content_threshold: Option<f64>,
    pub tariff_shift_rule: Option<String>,
    pub specific_process_requirements: Option<String>,
    pub required_documentation: sqlx::types::Json<Vec<String>>,
    pub is_default: bool,
}

/// A country row from the catalog.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CountryRecord {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationLevel {
    NotQualified,
    Qualified,
    HighlyQualified,
}

/// Incoming qualification request.
#[derive(Debug, Clone, Deserialize)]
pub struct QualificationRequest {
    pub hs_code: String,
    pub component_origins: Vec<ComponentOrigin>,
    pub manufacturing_location: String,
    pub business_type: Option<String>,
}

/// Outcome of one USMCA qualification evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct QualificationResult {
    pub qualified: bool,
    pub qualification_level: QualificationLevel,
    pub regional_content_percentage: f64,
    pub threshold_applied: f64,
    pub rule: String,
    pub reason: String,
    pub rule_source: RuleSource,
    pub manufacturing_location: String,
    pub documentation_required: Vec<String>,
    pub component_breakdown: Vec<ComponentBreakdown>,
    pub disclaimers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tariff rates and savings
// ---------------------------------------------------------------------------

/// How a tariff rate record was matched in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMatch {
    Exact,
    FamilyMatch,
    ChapterMatch,
    ReferenceTable,
    EmergencyFallback,
}

/// Raw `tariff_rates` row.
#[derive(Debug, Clone, FromRow)]
pub struct TariffRateRow {
    pub hs_code: String,
    pub mfn_rate: Option<f64>,
    pub usmca_rate: Option<f64>,
    pub effective_date: Option<DateTime<Utc>>,
}

/// Resolved tariff rates for a code, with match provenance.
///
/// `match_type` is mandatory in every code path so a fallback record is
/// never indistinguishable from a real lookup.
#[derive(Debug, Clone, Serialize)]
pub struct TariffRateRecord {
    /// Code the caller asked about.
    pub hs_code: String,
    /// Code of the row that actually supplied the rates.
    pub actual_hs_code: String,
    pub mfn_rate: f64,
    pub usmca_rate: f64,
    pub effective_date: Option<DateTime<Utc>>,
    pub match_type: RateMatch,
    pub disclaimers: Vec<String>,
}

/// Trade volume as supplied by callers: a plain number or free text
/// like `"$5M"` or `"$5M - $25M"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VolumeInput {
    Number(f64),
    Text(String),
}

/// Incoming savings request.
#[derive(Debug, Clone, Deserialize)]
pub struct SavingsRequest {
    pub hs_code: String,
    pub trade_volume: Option<VolumeInput>,
    pub supplier_country: Option<String>,
    pub destination_country: Option<String>,
}

/// Computed tariff savings, after the validation guard.
#[derive(Debug, Clone, Serialize)]
pub struct SavingsResult {
    pub hs_code: String,
    pub annual_savings: f64,
    pub monthly_savings: f64,
    pub savings_percentage: f64,
    pub mfn_rate: f64,
    pub usmca_rate: f64,
    pub trade_volume_used: f64,
    pub supplier_country: Option<String>,
    pub match_type: RateMatch,
    pub was_capped: bool,
    pub requires_validation: bool,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Professional referral
// ---------------------------------------------------------------------------

/// Referral severity, ordered so merges can take the numeric max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Estimated case complexity, ordered like `Severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

/// Merged escalation decision across classification, qualification and
/// savings signals.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralEvaluation {
    pub requires_professional: bool,
    pub severity: Severity,
    pub estimated_complexity: Complexity,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
    pub referral_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Full-pipeline analysis
// ---------------------------------------------------------------------------

/// Incoming end-to-end analysis request.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub product_description: String,
    pub business_type: Option<String>,
    pub source_country: Option<String>,
    pub component_origins: Option<Vec<ComponentOrigin>>,
    pub manufacturing_location: Option<String>,
    pub trade_volume: Option<VolumeInput>,
    pub destination_country: Option<String>,
}

/// Bundle produced by the end-to-end pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisBundle {
    pub classification: ClassificationResponse,
    pub qualification: Option<QualificationResult>,
    pub savings: Option<SavingsResult>,
    pub referral: ReferralEvaluation,
}
