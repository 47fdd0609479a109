use crate::cache_key;
use crate::catalog::CatalogService;
use crate::config::{CacheConfig, TariffConfig};
use crate::errors::AppError;
use crate::models::{
    RateMatch, SavingsRequest, SavingsResult, TariffRateRecord, TariffRateRow, VolumeInput,
};
use moka::future::Cache;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

const DEFAULT_DESTINATION: &str = "US";

/// Tariff rate resolution and savings calculation.
///
/// Rate lookup walks a specificity hierarchy: exact code, 6-digit
/// family, 4-digit chapter, reference table, emergency fallback. Every
/// record carries its match tier and tier-appropriate disclaimers, so a
/// fallback is never mistaken for an authoritative rate.
pub struct TariffService {
    catalog: CatalogService,
    config: TariffConfig,
    rates_cache: Cache<String, TariffRateRecord>,
}

impl TariffService {
    pub fn new(catalog: CatalogService, config: TariffConfig, cache: &CacheConfig) -> Self {
        Self {
            catalog,
            config,
            rates_cache: Cache::builder()
                .time_to_live(Duration::from_secs(cache.tariff_ttl_secs))
                .max_capacity(cache.max_capacity)
                .build(),
        }
    }

    /// Resolves rates for a code through the lookup hierarchy.
    ///
    /// A failing tier is logged and skipped; only an unusable code is an
    /// error. The emergency fallback at the bottom guarantees a record.
    pub async fn rates(
        &self,
        hs_code: &str,
        destination: Option<&str>,
    ) -> Result<TariffRateRecord, AppError> {
        let normalized = normalize_hs_code(hs_code)?;
        let destination = destination.unwrap_or(DEFAULT_DESTINATION);

        let key = cache_key::tariff_rates_key(&normalized, destination);
        if let Some(cached) = self.rates_cache.get(&key).await {
            return Ok(cached);
        }

        let record = self.resolve_rates(&normalized, destination).await;
        self.rates_cache.insert(key, record.clone()).await;
        Ok(record)
    }

    async fn resolve_rates(&self, normalized: &str, destination: &str) -> TariffRateRecord {
        if let Some(record) = self.try_exact(normalized, destination).await {
            return record;
        }
        if let Some(record) = self.try_family(normalized, destination).await {
            return record;
        }
        if let Some(record) = self.try_chapter(normalized, destination).await {
            return record;
        }
        if let Some(record) = self.try_reference_table(normalized).await {
            return record;
        }

        tracing::warn!(
            "All rate lookup tiers exhausted for {}, using emergency fallback",
            normalized
        );
        TariffRateRecord {
            hs_code: normalized.to_string(),
            actual_hs_code: normalized.to_string(),
            mfn_rate: self.config.emergency_fallback_rate,
            usmca_rate: 0.0,
            effective_date: None,
            match_type: RateMatch::EmergencyFallback,
            disclaimers: vec![
                "No database rates available - using conservative estimate".to_string(),
            ],
        }
    }

    async fn try_exact(&self, normalized: &str, destination: &str) -> Option<TariffRateRecord> {
        let rows = match self.catalog.get_tariff_rates(normalized, destination).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Exact rate lookup failed for {}: {}", normalized, e);
                return None;
            }
        };

        pick_exact(rows, normalized)
    }

    async fn try_family(&self, normalized: &str, destination: &str) -> Option<TariffRateRecord> {
        if normalized.len() < 6 {
            return None;
        }
        let prefix = &normalized[..6];
        if prefix == normalized {
            return None;
        }

        let rows = match self
            .catalog
            .search_tariff_rates_by_prefix(prefix, destination)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Family rate lookup failed for {}: {}", prefix, e);
                return None;
            }
        };

        pick_family(rows, normalized)
    }

    async fn try_chapter(&self, normalized: &str, destination: &str) -> Option<TariffRateRecord> {
        if normalized.len() < 4 {
            return None;
        }
        let prefix = &normalized[..4];

        let rows = match self
            .catalog
            .search_tariff_rates_by_prefix(prefix, destination)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Chapter rate lookup failed for {}: {}", prefix, e);
                return None;
            }
        };

        pick_chapter(rows, normalized)
    }

    async fn try_reference_table(&self, normalized: &str) -> Option<TariffRateRecord> {
        let record = match self.catalog.get_reference_record(normalized).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Reference table lookup failed for {}: {}", normalized, e);
                return None;
            }
        };

        record
            .filter(|r| r.mfn_tariff_rate.is_some())
            .map(|r| TariffRateRecord {
                hs_code: normalized.to_string(),
                actual_hs_code: r.hs_code,
                mfn_rate: r.mfn_tariff_rate.unwrap_or(0.0),
                usmca_rate: r.usmca_tariff_rate.unwrap_or(0.0),
                effective_date: None,
                match_type: RateMatch::ReferenceTable,
                disclaimers: vec![
                    "Rate from reference database - verify with customs".to_string(),
                ],
            })
    }

    /// Resolves rates and computes validated savings for a request.
    pub async fn savings(&self, request: &SavingsRequest) -> Result<SavingsResult, AppError> {
        let rates = self
            .rates(&request.hs_code, request.destination_country.as_deref())
            .await?;
        let volume = request
            .trade_volume
            .as_ref()
            .map(|v| parse_trade_volume(v, self.config.default_trade_volume))
            .unwrap_or(self.config.default_trade_volume);

        Ok(build_savings(
            &rates,
            volume,
            request.supplier_country.as_deref(),
            &self.config,
        ))
    }
}

// Tier selection over fetched rows, kept separate from the queries.

fn highest_mfn(rows: Vec<TariffRateRow>) -> Option<TariffRateRow> {
    rows.into_iter().max_by(|a, b| {
        a.mfn_rate
            .unwrap_or(0.0)
            .partial_cmp(&b.mfn_rate.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

fn pick_exact(rows: Vec<TariffRateRow>, normalized: &str) -> Option<TariffRateRecord> {
    // Zero MFN at the exact tier usually means an incomplete row, so
    // keep walking the hierarchy
    rows.into_iter()
        .find(|r| r.mfn_rate.unwrap_or(0.0) > 0.0)
        .map(|row| TariffRateRecord {
            hs_code: normalized.to_string(),
            actual_hs_code: row.hs_code,
            mfn_rate: row.mfn_rate.unwrap_or(0.0),
            usmca_rate: row.usmca_rate.unwrap_or(0.0),
            effective_date: row.effective_date,
            match_type: RateMatch::Exact,
            disclaimers: vec![],
        })
}

fn pick_family(rows: Vec<TariffRateRow>, normalized: &str) -> Option<TariffRateRecord> {
    let positive: Vec<TariffRateRow> = rows
        .into_iter()
        .filter(|r| r.mfn_rate.unwrap_or(0.0) > 0.0)
        .collect();

    highest_mfn(positive).map(|row| {
        let disclaimer = format!("Rate estimated from similar classification {}", row.hs_code);
        TariffRateRecord {
            hs_code: normalized.to_string(),
            actual_hs_code: row.hs_code,
            mfn_rate: row.mfn_rate.unwrap_or(0.0),
            usmca_rate: row.usmca_rate.unwrap_or(0.0),
            effective_date: row.effective_date,
            match_type: RateMatch::FamilyMatch,
            disclaimers: vec![disclaimer],
        }
    })
}

fn pick_chapter(rows: Vec<TariffRateRow>, normalized: &str) -> Option<TariffRateRecord> {
    highest_mfn(rows).map(|row| {
        let chapter = &normalized[..2];
        let disclaimer = format!(
            "Rate estimated from chapter {} classification {}",
            chapter, row.hs_code
        );
        TariffRateRecord {
            hs_code: normalized.to_string(),
            actual_hs_code: row.hs_code,
            mfn_rate: row.mfn_rate.unwrap_or(0.0),
            usmca_rate: row.usmca_rate.unwrap_or(0.0),
            effective_date: row.effective_date,
            match_type: RateMatch::ChapterMatch,
            disclaimers: vec![disclaimer],
        }
    })
}

/// Strips formatting from a code, leaving digits only.
pub fn normalize_hs_code(hs_code: &str) -> Result<String, AppError> {
    let digits: String = hs_code.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 2 {
        return Err(AppError::InvalidInput(format!(
            "HS code '{}' must contain at least 2 digits",
            hs_code
        )));
    }
    Ok(digits)
}

fn volume_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?i)\$?\s*([\d,\.]+)\s*([kmb]?)\s*[-\u{2013}]\s*\$?\s*([\d,\.]+)\s*([kmb]?)")
                .expect("range pattern is valid"),
            Regex::new(r"(?i)\$?\s*([\d,\.]+)\s*([kmb]?)").expect("single pattern is valid"),
        )
    })
}

fn apply_suffix(value: f64, suffix: &str) -> f64 {
    match suffix.to_lowercase().as_str() {
        "k" => value * 1_000.0,
        "m" => value * 1_000_000.0,
        "b" => value * 1_000_000_000.0,
        _ => value,
    }
}

fn parse_amount(digits: &str, suffix: &str) -> Option<f64> {
    let cleaned = digits.replace(',', "");
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| apply_suffix(v, suffix))
}

/// Turns a caller-supplied volume into an annual dollar amount.
///
/// Accepts plain numbers, single amounts like `"$5M"`, and ranges like
/// `"$5M - $25M"` (midpoint). Anything unparseable falls back to the
/// configured default, never an error.
pub fn parse_trade_volume(input: &VolumeInput, default: f64) -> f64 {
    match input {
        VolumeInput::Number(n) if n.is_finite() && *n > 0.0 => *n,
        VolumeInput::Number(_) => default,
        VolumeInput::Text(text) => {
            let (range, single) = volume_patterns();

            if let Some(caps) = range.captures(text) {
                let low = parse_amount(&caps[1], &caps[2]);
                let high = parse_amount(&caps[3], &caps[4]);
                if let (Some(low), Some(high)) = (low, high) {
                    return (low + high) / 2.0;
                }
            }
            if let Some(caps) = single.captures(text) {
                if let Some(value) = parse_amount(&caps[1], &caps[2]) {
                    return value;
                }
            }

            tracing::debug!("Unparseable trade volume '{}', using default", text);
            default
        }
    }
}

/// Computes savings from resolved rates and runs the validation guard.
pub fn build_savings(
    rates: &TariffRateRecord,
    volume: f64,
    supplier_country: Option<&str>,
    config: &TariffConfig,
) -> SavingsResult {
    let mut warnings: Vec<String> = rates.disclaimers.clone();

    let mut savings_rate = rates.mfn_rate - rates.usmca_rate;
    if savings_rate < 0.0 {
        warnings.push("USMCA rate exceeds MFN rate - no savings available".to_string());
        savings_rate = 0.0;
    }

    let mut was_capped = false;
    if savings_rate > config.max_savings_percentage {
        warnings.push(format!(
            "Savings percentage capped from {:.1}% to {:.1}% - verify rates with customs",
            savings_rate, config.max_savings_percentage
        ));
        savings_rate = config.max_savings_percentage;
        was_capped = true;
    }
    let savings_percentage = savings_rate;

    if savings_percentage > config.high_savings_threshold {
        warnings.push("High savings percentage - verify rates before committing".to_string());
    }
    if savings_percentage > config.extreme_savings_threshold {
        warnings
            .push("Extremely high savings percentage - professional validation required".to_string());
    }

    let annual_savings = volume * savings_rate / 100.0;

    SavingsResult {
        hs_code: rates.hs_code.clone(),
        annual_savings,
        monthly_savings: annual_savings / 12.0,
        savings_percentage,
        mfn_rate: rates.mfn_rate,
        usmca_rate: rates.usmca_rate,
        trade_volume_used: volume,
        supplier_country: supplier_country.map(str::to_string),
        match_type: rates.match_type,
        was_capped,
        requires_validation: savings_percentage > config.require_validation_above,
        warnings,
    }
}
