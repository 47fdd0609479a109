use serde::Deserialize;

/// Top-level application configuration.
///
/// `DATABASE_URL` is the only required variable; every decision-pipeline
/// knob has an environment override and a default so the pipeline never
/// hard-fails on a missing value.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub oracle: OracleConfig,
    pub classification: ClassificationConfig,
    pub usmca: UsmcaConfig,
    pub tariff: TariffConfig,
    pub cache: CacheConfig,
}

/// AI scoring oracle settings. The oracle is optional: without an API key
/// the scorer runs on the deterministic path only.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

/// Classification thresholds and confidence-scoring weights.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    pub min_description_length: usize,
    pub max_description_length: usize,
    pub max_search_terms: usize,
    pub max_results: usize,
    // Search strategy bounds
    pub max_single_term_queries: usize,
    pub single_term_limit: i64,
    pub max_term_combinations: usize,
    pub multi_term_limit: i64,
    pub business_type_limit: i64,
    pub min_confidence_threshold: f64,
    pub professional_referral_threshold: f64,
    pub high_confidence_threshold: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    // AI-path bonuses
    pub data_quality_threshold: f64,
    pub data_quality_bonus: f64,
    pub term_match_threshold: f64,
    pub term_match_bonus: f64,
    pub usmca_bonus: f64,
    pub multi_term_bonus: f64,
    // Deterministic-path weights
    pub base_confidence_score: f64,
    pub term_score_weight: f64,
    pub data_quality_weight: f64,
    pub usmca_eligibility_bonus: f64,
    pub multi_term_search_bonus: f64,
    // Shared between both paths
    pub business_type_match_bonus: f64,
    pub business_type_search_bonus: f64,
    // Data-quality partial credits
    pub tariff_rate_score: f64,
    pub usmca_rate_score: f64,
    pub tariff_difference_threshold_1: f64,
    pub tariff_difference_bonus_1: f64,
    pub tariff_difference_threshold_2: f64,
    pub tariff_difference_bonus_2: f64,
    pub description_length_threshold: usize,
    pub description_length_bonus: f64,
}

/// USMCA qualification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UsmcaConfig {
    pub default_regional_content_threshold: f64,
    pub highly_qualified_margin: f64,
    pub close_gap_margin: f64,
    pub marginal_qualification_margin: f64,
}

/// Tariff rate and savings-validation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    pub emergency_fallback_rate: f64,
    pub default_trade_volume: f64,
    pub max_savings_percentage: f64,
    pub require_validation_above: f64,
    pub high_savings_threshold: f64,
    pub extreme_savings_threshold: f64,
    pub high_value_savings_threshold: f64,
    pub high_mfn_rate_threshold: f64,
}

/// Cache TTLs and capacity bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub classification_ttl_secs: u64,
    pub tariff_ttl_secs: u64,
    pub rules_ttl_secs: u64,
    pub max_capacity: u64,
}

fn env_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{} is not a valid number, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{} is not a valid number, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{} is not a valid number, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            oracle: OracleConfig::from_env()?,
            classification: ClassificationConfig::from_env(),
            usmca: UsmcaConfig::from_env(),
            tariff: TariffConfig::from_env(),
            cache: CacheConfig::from_env(),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        if config.oracle.api_key.is_some() {
            tracing::info!(
                "AI scoring oracle configured: {} ({})",
                config.oracle.base_url,
                config.oracle.model
            );
        } else {
            tracing::info!("No AI scoring oracle configured, deterministic scoring only");
        }

        Ok(config)
    }
}

impl OracleConfig {
    fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("SCORING_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com".to_string());
        // Reject malformed URLs up front rather than on the first request
        url::Url::parse(&base_url)
            .map_err(|e| anyhow::anyhow!("SCORING_API_BASE_URL is not a valid URL: {}", e))?;

        Ok(Self {
            api_key: std::env::var("SCORING_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            base_url,
            model: std::env::var("SCORING_API_MODEL")
                .unwrap_or_else(|_| "claude-3-haiku-20240307".to_string()),
            max_tokens: env_u64("SCORING_API_MAX_TOKENS", 1000) as u32,
            timeout_ms: env_u64("SCORING_API_TIMEOUT_MS", 10_000),
        })
    }
}

impl ClassificationConfig {
    pub fn from_env() -> Self {
        Self {
            min_description_length: env_usize("MIN_DESCRIPTION_LENGTH", 3),
            max_description_length: env_usize("MAX_DESCRIPTION_LENGTH", 500),
            max_search_terms: env_usize("CLASSIFICATION_MAX_KEYWORDS", 8),
            max_results: env_usize("CLASSIFICATION_MAX_RESULTS", 10),
            max_single_term_queries: env_usize("MAX_SINGLE_TERM_QUERIES", 5),
            single_term_limit: env_u64("SINGLE_TERM_RESULT_LIMIT", 10) as i64,
            max_term_combinations: env_usize("MAX_TERM_COMBINATIONS", 5),
            multi_term_limit: env_u64("MULTI_TERM_RESULT_LIMIT", 5) as i64,
            business_type_limit: env_u64("BUSINESS_TYPE_RESULT_LIMIT", 20) as i64,
            min_confidence_threshold: env_f64("MIN_CLASSIFICATION_CONFIDENCE", 0.3),
            professional_referral_threshold: env_f64("PROFESSIONAL_REFERRAL_THRESHOLD", 0.80),
            high_confidence_threshold: env_f64("HIGH_CONFIDENCE_THRESHOLD", 0.85),
            min_confidence: env_f64("MIN_CONFIDENCE_SCORE", 0.05),
            max_confidence: env_f64("MAX_CONFIDENCE_SCORE", 0.98),
            data_quality_threshold: env_f64("DATA_QUALITY_THRESHOLD", 0.8),
            data_quality_bonus: env_f64("DATA_QUALITY_BONUS", 0.02),
            term_match_threshold: env_f64("TERM_MATCH_THRESHOLD", 0.8),
            term_match_bonus: env_f64("TERM_MATCH_BONUS", 0.02),
            usmca_bonus: env_f64("USMCA_ELIGIBLE_BONUS", 0.01),
            multi_term_bonus: env_f64("MULTI_TERM_BONUS", 0.01),
            base_confidence_score: env_f64("BASE_CONFIDENCE_SCORE", 0.5),
            term_score_weight: env_f64("TERM_SCORE_WEIGHT", 0.3),
            data_quality_weight: env_f64("DATA_QUALITY_WEIGHT", 0.3),
            usmca_eligibility_bonus: env_f64("USMCA_ELIGIBILITY_BONUS", 0.15),
            multi_term_search_bonus: env_f64("MULTI_TERM_SEARCH_BONUS", 0.05),
            business_type_match_bonus: env_f64("BUSINESS_TYPE_MATCH_BONUS", 0.15),
            business_type_search_bonus: env_f64("BUSINESS_TYPE_SEARCH_BONUS", 0.10),
            tariff_rate_score: env_f64("TARIFF_RATE_SCORE", 0.3),
            usmca_rate_score: env_f64("USMCA_RATE_SCORE", 0.3),
            tariff_difference_threshold_1: env_f64("TARIFF_DIFF_THRESHOLD_1", 1.0),
            tariff_difference_bonus_1: env_f64("TARIFF_DIFF_BONUS_1", 0.2),
            tariff_difference_threshold_2: env_f64("TARIFF_DIFF_THRESHOLD_2", 5.0),
            tariff_difference_bonus_2: env_f64("TARIFF_DIFF_BONUS_2", 0.1),
            description_length_threshold: env_usize("DESCRIPTION_LENGTH_THRESHOLD", 50),
            description_length_bonus: env_f64("DESCRIPTION_LENGTH_BONUS", 0.1),
        }
    }
}

impl UsmcaConfig {
    pub fn from_env() -> Self {
        Self {
            default_regional_content_threshold: env_f64("USMCA_DEFAULT_THRESHOLD", 62.5),
            highly_qualified_margin: env_f64("USMCA_HIGHLY_QUALIFIED_MARGIN", 10.0),
            close_gap_margin: env_f64("USMCA_CLOSE_GAP_MARGIN", 10.0),
            marginal_qualification_margin: env_f64("USMCA_MARGINAL_MARGIN", 5.0),
        }
    }
}

impl TariffConfig {
    pub fn from_env() -> Self {
        Self {
            emergency_fallback_rate: env_f64("EMERGENCY_TARIFF_RATE", 3.0),
            default_trade_volume: env_f64("DEFAULT_TRADE_VOLUME", 500_000.0),
            max_savings_percentage: env_f64("MAX_TARIFF_SAVINGS_PERCENTAGE", 85.0),
            require_validation_above: env_f64("REQUIRE_VALIDATION_ABOVE", 60.0),
            high_savings_threshold: env_f64("HIGH_SAVINGS_THRESHOLD", 50.0),
            extreme_savings_threshold: env_f64("EXTREME_SAVINGS_THRESHOLD", 75.0),
            high_value_savings_threshold: env_f64("HIGH_VALUE_SAVINGS_THRESHOLD", 50_000.0),
            high_mfn_rate_threshold: env_f64("HIGH_MFN_RATE_THRESHOLD", 25.0),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            classification_ttl_secs: env_u64("CACHE_CLASSIFICATION_TTL_SECS", 1800),
            tariff_ttl_secs: env_u64("CACHE_TARIFF_TTL_SECS", 3600),
            rules_ttl_secs: env_u64("CACHE_RULES_TTL_SECS", 900),
            max_capacity: env_u64("CACHE_MAX_SIZE", 10_000),
        }
    }
}
