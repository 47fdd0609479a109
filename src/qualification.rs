use crate::cache_key;
use crate::catalog::CatalogService;
use crate::config::{CacheConfig, UsmcaConfig};
use crate::errors::AppError;
use crate::models::{
    ComponentBreakdown, ComponentOrigin, QualificationLevel, QualificationRequest,
    QualificationResult, QualificationRule, RuleKind, RuleSource, UsmcaRuleRow,
};
use moka::future::Cache;
use std::time::Duration;

const USMCA_MEMBERS_FALLBACK: [&str; 3] = ["US", "CA", "MX"];

const FALLBACK_DOCUMENTATION: [&str; 1] = ["Professional verification required"];

/// USMCA qualification engine.
///
/// Resolves the applicable origin rule for a product, then evaluates the
/// bill of materials against it. Rule resolution degrades to a
/// conservative default rule when the catalog is unreachable; only input
/// validation surfaces errors to the caller.
pub struct UsmcaEngine {
    catalog: CatalogService,
    config: UsmcaConfig,
    rules_cache: Cache<String, QualificationRule>,
    members_cache: Cache<&'static str, Vec<String>>,
}

impl UsmcaEngine {
    pub fn new(catalog: CatalogService, config: UsmcaConfig, cache: &CacheConfig) -> Self {
        Self {
            catalog,
            config,
            rules_cache: Cache::builder()
                .time_to_live(Duration::from_secs(cache.rules_ttl_secs))
                .max_capacity(cache.max_capacity)
                .build(),
            members_cache: Cache::builder()
                .time_to_live(Duration::from_secs(cache.rules_ttl_secs))
                .max_capacity(4)
                .build(),
        }
    }

    /// Evaluates a qualification request end to end.
    pub async fn qualify(
        &self,
        request: &QualificationRequest,
    ) -> Result<QualificationResult, AppError> {
        validate_components(&request.component_origins)?;
        if request.manufacturing_location.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "manufacturing_location is required".to_string(),
            ));
        }

        let rule = self
            .resolve_rule(&request.hs_code, request.business_type.as_deref())
            .await;
        let members = self.usmca_members().await;

        Ok(evaluate(
            &rule,
            &request.component_origins,
            &members,
            &request.manufacturing_location,
            &self.config,
        ))
    }

    /// Resolves the most specific applicable rule, cached per
    /// (code, business type) pair.
    ///
    /// Specificity order: exact code, product category, chapter, default
    /// row. Catalog failure or no applicable row both produce the
    /// emergency fallback rule rather than an error.
    pub async fn resolve_rule(
        &self,
        hs_code: &str,
        business_type: Option<&str>,
    ) -> QualificationRule {
        let key = cache_key::qualification_rule_key(hs_code, business_type);
        if let Some(cached) = self.rules_cache.get(&key).await {
            return cached;
        }

        let rule = match self
            .catalog
            .get_qualification_rules(Some(hs_code), business_type)
            .await
        {
            Ok(rows) => self.pick_rule(rows, hs_code, business_type),
            Err(e) => {
                tracing::warn!("Rule lookup failed for {}: {}, using fallback", hs_code, e);
                self.emergency_fallback_rule()
            }
        };

        self.rules_cache.insert(key, rule.clone()).await;
        rule
    }

    fn pick_rule(
        &self,
        rows: Vec<UsmcaRuleRow>,
        hs_code: &str,
        business_type: Option<&str>,
    ) -> QualificationRule {
        let chapter: String = hs_code.chars().take(2).collect();

        let best = rows
            .iter()
            .find(|r| r.hs_code.as_deref() == Some(hs_code))
            .or_else(|| {
                business_type
                    .and_then(|bt| rows.iter().find(|r| r.product_category.as_deref() == Some(bt)))
            })
            .or_else(|| rows.iter().find(|r| r.hs_chapter.as_deref() == Some(chapter.as_str())))
            .or_else(|| rows.iter().find(|r| r.is_default));

        match best {
            Some(row) => self.convert_row(row),
            None => {
                tracing::warn!("No qualification rule found for {}, using fallback", hs_code);
                self.emergency_fallback_rule()
            }
        }
    }

    fn convert_row(&self, row: &UsmcaRuleRow) -> QualificationRule {
        let kind = match row.rule_type.as_str() {
            "regional_content" | "regional_value_content" => RuleKind::RegionalContent {
                threshold: row
                    .regional_content_threshold
                    .unwrap_or(self.config.default_regional_content_threshold),
            },
            "tariff_shift" => RuleKind::TariffShift {
                requirement: row
                    .tariff_shift_rule
                    .clone()
                    .unwrap_or_else(|| "Change in tariff classification required".to_string()),
            },
            "wholly_obtained" => RuleKind::WhollyObtained,
            "specific_manufacturing" => RuleKind::SpecificManufacturing {
                process_requirements: row
                    .specific_process_requirements
                    .clone()
                    .unwrap_or_else(|| "Specified manufacturing process required".to_string()),
            },
            other => {
                tracing::warn!(
                    "Unknown rule type '{}', treating as regional content",
                    other
                );
                RuleKind::RegionalContent {
                    threshold: self.config.default_regional_content_threshold,
                }
            }
        };

        QualificationRule {
            hs_code: row.hs_code.clone(),
            kind,
            required_documentation: row.required_documentation.0.clone(),
            source: RuleSource::DatabaseLookup,
        }
    }

    fn emergency_fallback_rule(&self) -> QualificationRule {
        QualificationRule {
            hs_code: None,
            kind: RuleKind::RegionalContent {
                threshold: self.config.default_regional_content_threshold,
            },
            required_documentation: FALLBACK_DOCUMENTATION
                .iter()
                .map(|d| d.to_string())
                .collect(),
            source: RuleSource::EmergencyFallback,
        }
    }

    /// USMCA member country codes, cached. Falls back to the static
    /// member list when the catalog is unreachable.
    pub async fn usmca_members(&self) -> Vec<String> {
        if let Some(cached) = self.members_cache.get("members").await {
            return cached;
        }

        let members: Vec<String> = match self.catalog.get_countries(true).await {
            Ok(rows) if !rows.is_empty() => rows.into_iter().map(|c| c.code).collect(),
            Ok(_) => {
                tracing::warn!("Country table returned no USMCA members, using static list");
                USMCA_MEMBERS_FALLBACK.iter().map(|c| c.to_string()).collect()
            }
            Err(e) => {
                tracing::warn!("Country lookup failed: {}, using static list", e);
                USMCA_MEMBERS_FALLBACK.iter().map(|c| c.to_string()).collect()
            }
        };

        self.members_cache.insert("members", members.clone()).await;
        members
    }
}

fn validate_components(components: &[ComponentOrigin]) -> Result<(), AppError> {
    if components.is_empty() {
        return Err(AppError::InvalidComponents(
            "At least one component origin is required".to_string(),
        ));
    }

    let mut total = 0.0;
    for component in components {
        if component.origin_country.trim().is_empty() {
            return Err(AppError::InvalidComponents(
                "Component origin_country cannot be empty".to_string(),
            ));
        }
        if !component.value_percentage.is_finite()
            || component.value_percentage < 0.0
            || component.value_percentage > 100.0
        {
            return Err(AppError::InvalidComponents(format!(
                "Component value_percentage must be between 0 and 100, got {}",
                component.value_percentage
            )));
        }
        total += component.value_percentage;
    }

    if total <= 0.0 {
        return Err(AppError::InvalidComponents(
            "Component value percentages must sum to a positive total".to_string(),
        ));
    }
    // Small tolerance for floating point sums
    if total > 100.01 {
        return Err(AppError::InvalidComponents(format!(
            "Component value percentages sum to {:.1}%, exceeding 100%",
            total
        )));
    }

    Ok(())
}

/// Pure rule evaluation over a validated bill of materials.
pub fn evaluate(
    rule: &QualificationRule,
    components: &[ComponentOrigin],
    members: &[String],
    manufacturing_location: &str,
    config: &UsmcaConfig,
) -> QualificationResult {
    let is_member =
        |country: &str| members.iter().any(|m| m.eq_ignore_ascii_case(country.trim()));

    let breakdown: Vec<ComponentBreakdown> = components
        .iter()
        .map(|c| ComponentBreakdown {
            origin_country: c.origin_country.clone(),
            value_percentage: c.value_percentage,
            description: c.description.clone(),
            is_usmca_member: is_member(&c.origin_country),
        })
        .collect();

    // Regional content is relative to the declared total, so a partial
    // bill of materials still evaluates correctly
    let total_value: f64 = breakdown.iter().map(|c| c.value_percentage).sum();
    let member_value: f64 = breakdown
        .iter()
        .filter(|c| c.is_usmca_member)
        .map(|c| c.value_percentage)
        .sum();
    let regional_content = if total_value > 0.0 {
        member_value / total_value * 100.0
    } else {
        0.0
    };

    let manufactured_in_territory = is_member(manufacturing_location);

    let (qualified, rule_text, reason, threshold_applied) = match &rule.kind {
        RuleKind::RegionalContent { threshold } => {
            let qualified = regional_content >= *threshold;
            let reason = if qualified {
                format!(
                    "Product meets USMCA qualification with {:.1}% North American content",
                    regional_content
                )
            } else {
                format!(
                    "Product does not meet USMCA qualification. {:.1}% North American content is below the {}% requirement",
                    regional_content, threshold
                )
            };
            (
                qualified,
                format!("Regional Value Content ({}% required)", threshold),
                reason,
                *threshold,
            )
        }
        RuleKind::TariffShift { requirement } => {
            let qualified = manufactured_in_territory;
            let reason = if qualified {
                format!(
                    "Product qualifies under USMCA tariff shift rule. Manufacturing in {} meets origin requirements.",
                    manufacturing_location
                )
            } else {
                "Product does not meet tariff shift requirements. Check component origins and manufacturing location.".to_string()
            };
            (
                qualified,
                format!("Tariff Shift: {}", requirement),
                reason,
                config.default_regional_content_threshold,
            )
        }
        RuleKind::WhollyObtained => {
            let qualified =
                manufactured_in_territory && breakdown.iter().all(|c| c.is_usmca_member);
            let reason = if qualified {
                "Product is wholly obtained in USMCA territory".to_string()
            } else {
                "Product does not meet wholly obtained requirements".to_string()
            };
            (
                qualified,
                "Wholly Obtained in USMCA Territory".to_string(),
                reason,
                config.default_regional_content_threshold,
            )
        }
        RuleKind::SpecificManufacturing {
            process_requirements,
        } => {
            let qualified = manufactured_in_territory;
            let reason = if qualified {
                "Product meets specific manufacturing requirements".to_string()
            } else {
                "Product does not meet specific manufacturing requirements".to_string()
            };
            (
                qualified,
                format!("Specific Manufacturing: {}", process_requirements),
                reason,
                config.default_regional_content_threshold,
            )
        }
    };

    // Level banding is content-based for every rule kind
    let qualification_level = if !qualified {
        QualificationLevel::NotQualified
    } else if regional_content < threshold_applied + config.highly_qualified_margin {
        QualificationLevel::Qualified
    } else {
        QualificationLevel::HighlyQualified
    };

    let mut disclaimers = vec![
        "USMCA qualification is advisory. Final determination rests with customs authorities."
            .to_string(),
    ];
    if rule.source == RuleSource::EmergencyFallback {
        disclaimers.push(
            "Default regional content rule applied - verify the product-specific rule with customs"
                .to_string(),
        );
    }

    QualificationResult {
        qualified,
        qualification_level,
        regional_content_percentage: regional_content,
        threshold_applied,
        rule: rule_text,
        reason,
        rule_source: rule.source,
        manufacturing_location: manufacturing_location.to_string(),
        documentation_required: rule.required_documentation.clone(),
        component_breakdown: breakdown,
        disclaimers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<String> {
        vec!["US".to_string(), "CA".to_string(), "MX".to_string()]
    }

    fn component(country: &str, pct: f64) -> ComponentOrigin {
        ComponentOrigin {
            origin_country: country.to_string(),
            value_percentage: pct,
            description: None,
        }
    }

    fn rvc_rule(threshold: f64) -> QualificationRule {
        QualificationRule {
            hs_code: Some("870830".to_string()),
            kind: RuleKind::RegionalContent { threshold },
            required_documentation: vec!["USMCA Certificate of Origin".to_string()],
            source: RuleSource::DatabaseLookup,
        }
    }

    #[test]
    fn test_full_regional_content_is_highly_qualified() {
        let result = evaluate(
            &rvc_rule(62.5),
            &[component("MX", 60.0), component("US", 40.0)],
            &members(),
            "MX",
            &UsmcaConfig::from_env(),
        );

        assert!(result.qualified);
        assert_eq!(result.qualification_level, QualificationLevel::HighlyQualified);
        assert_eq!(result.regional_content_percentage, 100.0);
        assert!(result.reason.contains("100.0% North American content"));
    }

    #[test]
    fn test_below_threshold_not_qualified() {
        let result = evaluate(
            &rvc_rule(62.5),
            &[component("CN", 70.0), component("MX", 30.0)],
            &members(),
            "MX",
            &UsmcaConfig::from_env(),
        );

        assert!(!result.qualified);
        assert_eq!(result.qualification_level, QualificationLevel::NotQualified);
        assert_eq!(result.regional_content_percentage, 30.0);
        assert!(result.reason.contains("below the 62.5% requirement"));
    }

    #[test]
    fn test_just_over_threshold_is_qualified_not_highly() {
        let result = evaluate(
            &rvc_rule(62.5),
            &[component("MX", 65.0), component("CN", 35.0)],
            &members(),
            "MX",
            &UsmcaConfig::from_env(),
        );

        assert!(result.qualified);
        assert_eq!(result.qualification_level, QualificationLevel::Qualified);
    }

    #[test]
    fn test_tariff_shift_depends_on_manufacturing_location() {
        let rule = QualificationRule {
            hs_code: None,
            kind: RuleKind::TariffShift {
                requirement: "Change from any other heading".to_string(),
            },
            required_documentation: vec![],
            source: RuleSource::DatabaseLookup,
        };
        let cfg = UsmcaConfig::from_env();
        let parts = [component("CN", 80.0), component("MX", 20.0)];

        let in_territory = evaluate(&rule, &parts, &members(), "MX", &cfg);
        assert!(in_territory.qualified);
        assert!(in_territory.reason.contains("Manufacturing in MX"));

        let outside = evaluate(&rule, &parts, &members(), "CN", &cfg);
        assert!(!outside.qualified);
        assert!(outside.reason.contains("tariff shift requirements"));
    }

    #[test]
    fn test_non_rvc_level_banding_follows_regional_content() {
        let rule = QualificationRule {
            hs_code: None,
            kind: RuleKind::TariffShift {
                requirement: "Change from any other heading".to_string(),
            },
            required_documentation: vec![],
            source: RuleSource::DatabaseLookup,
        };
        let cfg = UsmcaConfig::from_env();

        // Qualifies on manufacturing location, but 20% member content is
        // nowhere near threshold + margin
        let thin = evaluate(
            &rule,
            &[component("CN", 80.0), component("MX", 20.0)],
            &members(),
            "MX",
            &cfg,
        );
        assert!(thin.qualified);
        assert_eq!(thin.qualification_level, QualificationLevel::Qualified);

        let rich = evaluate(
            &rule,
            &[component("US", 90.0), component("CN", 10.0)],
            &members(),
            "MX",
            &cfg,
        );
        assert!(rich.qualified);
        assert_eq!(rich.qualification_level, QualificationLevel::HighlyQualified);
    }

    #[test]
    fn test_wholly_obtained_requires_all_member_components() {
        let rule = QualificationRule {
            hs_code: None,
            kind: RuleKind::WhollyObtained,
            required_documentation: vec![],
            source: RuleSource::DatabaseLookup,
        };
        let cfg = UsmcaConfig::from_env();

        let pure = evaluate(
            &rule,
            &[component("US", 50.0), component("CA", 50.0)],
            &members(),
            "US",
            &cfg,
        );
        assert!(pure.qualified);

        let mixed = evaluate(
            &rule,
            &[component("US", 90.0), component("CN", 10.0)],
            &members(),
            "US",
            &cfg,
        );
        assert!(!mixed.qualified);
    }

    #[test]
    fn test_fallback_rule_adds_disclaimer() {
        let rule = QualificationRule {
            hs_code: None,
            kind: RuleKind::RegionalContent { threshold: 62.5 },
            required_documentation: vec![],
            source: RuleSource::EmergencyFallback,
        };
        let result = evaluate(
            &rule,
            &[component("MX", 100.0)],
            &members(),
            "MX",
            &UsmcaConfig::from_env(),
        );

        assert_eq!(result.rule_source, RuleSource::EmergencyFallback);
        assert!(result.disclaimers.iter().any(|d| d.contains("Default regional content rule")));
    }

    #[test]
    fn test_partial_bill_of_materials_uses_relative_content() {
        // Declared values cover only 80% of the product; content is
        // measured against what was declared
        let result = evaluate(
            &rvc_rule(62.5),
            &[component("MX", 40.0), component("CN", 40.0)],
            &members(),
            "MX",
            &UsmcaConfig::from_env(),
        );

        assert_eq!(result.regional_content_percentage, 50.0);
        assert!(!result.qualified);
    }

    #[test]
    fn test_membership_check_is_case_insensitive() {
        let result = evaluate(
            &rvc_rule(62.5),
            &[component("mx", 70.0), component("cn", 30.0)],
            &members(),
            "mx",
            &UsmcaConfig::from_env(),
        );
        assert!(result.qualified);
        assert!(result.component_breakdown[0].is_usmca_member);
        assert!(!result.component_breakdown[1].is_usmca_member);
    }

    #[test]
    fn test_component_validation() {
        assert!(matches!(
            validate_components(&[]),
            Err(AppError::InvalidComponents(_))
        ));
        assert!(matches!(
            validate_components(&[component("MX", 120.0)]),
            Err(AppError::InvalidComponents(_))
        ));
        assert!(matches!(
            validate_components(&[component("MX", 60.0), component("US", 50.0)]),
            Err(AppError::InvalidComponents(_))
        ));
        assert!(matches!(
            validate_components(&[component("", 50.0)]),
            Err(AppError::InvalidComponents(_))
        ));
        assert!(matches!(
            validate_components(&[component("MX", 0.0), component("US", 0.0)]),
            Err(AppError::InvalidComponents(_))
        ));
        assert!(validate_components(&[component("MX", 60.0), component("CN", 40.0)]).is_ok());
    }
}
