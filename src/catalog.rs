use crate::errors::{AppError, ResultExt};
use crate::models::{CountryRecord, ProductRecord, TariffRateRow, UsmcaRuleRow};
use sqlx::PgPool;

/// Thin query gateway over the reference catalog tables.
///
/// Holds only the connection pool; every method is a single read-only
/// query. Callers own all fallback and resolution policy; this layer
/// returns rows, not decisions.
#[derive(Clone)]
pub struct CatalogService {
    pool: PgPool,
}

impl CatalogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Substring search over product descriptions.
    pub async fn search_products(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<ProductRecord>, AppError> {
        let pattern = format!("%{}%", query);
        let rows = sqlx::query_as::<_, ProductRecord>(
            "SELECT hs_code, product_description, mfn_tariff_rate, usmca_tariff_rate, usmca_eligible
             FROM comtrade_reference
             WHERE product_description ILIKE $1
             ORDER BY hs_code
             LIMIT $2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("product description search failed")?;

        Ok(rows)
    }

    /// Prefix match on classification code.
    pub async fn search_products_by_prefix(
        &self,
        code_prefix: &str,
        limit: i64,
    ) -> Result<Vec<ProductRecord>, AppError> {
        let pattern = format!("{}%", code_prefix);
        let rows = sqlx::query_as::<_, ProductRecord>(
            "SELECT hs_code, product_description, mfn_tariff_rate, usmca_tariff_rate, usmca_eligible
             FROM comtrade_reference
             WHERE hs_code LIKE $1
             ORDER BY hs_code
             LIMIT $2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("product code prefix search failed")?;

        Ok(rows)
    }

    /// Candidate qualification rules for a (code, business type) pair.
    ///
    /// Returns every row that could apply: exact code, product category,
    /// chapter and default rows. The qualification engine picks the most
    /// specific one.
    pub async fn get_qualification_rules(
        &self,
        hs_code: Option<&str>,
        business_type: Option<&str>,
    ) -> Result<Vec<UsmcaRuleRow>, AppError> {
        let chapter = hs_code.map(|c| c.chars().take(2).collect::<String>());
        let rows = sqlx::query_as::<_, UsmcaRuleRow>(
            "SELECT hs_code, product_category, hs_chapter, rule_type,
                    regional_content_threshold, tariff_shift_rule,
                    specific_process_requirements, required_documentation, is_default
             FROM usmca_rules
             WHERE ($1::text IS NOT NULL AND hs_code = $1)
                OR ($2::text IS NOT NULL AND product_category = $2)
                OR ($3::text IS NOT NULL AND hs_chapter = $3)
                OR is_default = true",
        )
        .bind(hs_code)
        .bind(business_type)
        .bind(chapter)
        .fetch_all(&self.pool)
        .await
        .context("qualification rule lookup failed")?;

        Ok(rows)
    }

    /// Country list, optionally restricted to USMCA members.
    pub async fn get_countries(&self, usmca_only: bool) -> Result<Vec<CountryRecord>, AppError> {
        let rows = sqlx::query_as::<_, CountryRecord>(
            "SELECT code, name FROM countries
             WHERE $1 = false OR usmca_member = true
             ORDER BY name",
        )
        .bind(usmca_only)
        .fetch_all(&self.pool)
        .await
        .context("country lookup failed")?;

        Ok(rows)
    }

    /// Exact-code tariff rate rows for a destination country.
    pub async fn get_tariff_rates(
        &self,
        hs_code: &str,
        destination: &str,
    ) -> Result<Vec<TariffRateRow>, AppError> {
        let rows = sqlx::query_as::<_, TariffRateRow>(
            "SELECT hs_code, mfn_rate, usmca_rate, effective_date
             FROM tariff_rates
             WHERE hs_code = $1 AND destination_country = $2",
        )
        .bind(hs_code)
        .bind(destination)
        .fetch_all(&self.pool)
        .await
        .context("exact tariff rate lookup failed")?;

        Ok(rows)
    }

    /// Prefix-match tariff rate rows (family and chapter tiers).
    pub async fn search_tariff_rates_by_prefix(
        &self,
        code_prefix: &str,
        destination: &str,
    ) -> Result<Vec<TariffRateRow>, AppError> {
        let pattern = format!("{}%", code_prefix);
        let rows = sqlx::query_as::<_, TariffRateRow>(
            "SELECT hs_code, mfn_rate, usmca_rate, effective_date
             FROM tariff_rates
             WHERE hs_code LIKE $1 AND destination_country = $2",
        )
        .bind(pattern)
        .bind(destination)
        .fetch_all(&self.pool)
        .await
        .context("tariff rate prefix lookup failed")?;

        Ok(rows)
    }

    /// Final fallback tier: the general reference table keyed by code.
    pub async fn get_reference_record(
        &self,
        normalized_code: &str,
    ) -> Result<Option<ProductRecord>, AppError> {
        let row = sqlx::query_as::<_, ProductRecord>(
            "SELECT hs_code, product_description, mfn_tariff_rate, usmca_tariff_rate, usmca_eligible
             FROM comtrade_reference
             WHERE hs_code = $1
             LIMIT 1",
        )
        .bind(normalized_code)
        .fetch_optional(&self.pool)
        .await
        .context("reference record lookup failed")?;

        Ok(row)
    }
}
