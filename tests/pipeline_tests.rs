/// Cross-module scenario tests for the decision pipeline
/// Exercises the pure stage logic end to end without a database
use tariffpath_api::config::{ClassificationConfig, TariffConfig, UsmcaConfig};
use tariffpath_api::models::{
    ComponentOrigin, ConfidenceSource, QualificationRule, RateMatch, RuleKind, RuleSource,
    ScoredCandidate, SearchStrategy, Severity, TariffRateRecord, VolumeInput,
};
use tariffpath_api::pipeline::{referral_response, select_results};
use tariffpath_api::qualification::evaluate;
use tariffpath_api::referral::ReferralSystem;
use tariffpath_api::tariff::{build_savings, parse_trade_volume};

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

fn scored(code: &str, confidence: f64) -> ScoredCandidate {
    ScoredCandidate {
        hs_code: code.to_string(),
        product_description: "Brake pads for passenger vehicles".to_string(),
        mfn_tariff_rate: Some(8.0),
        usmca_tariff_rate: Some(0.0),
        usmca_eligible: Some(true),
        strategy: SearchStrategy::SingleTerm,
        matched_terms: vec!["brake".to_string()],
        confidence,
        confidence_source: ConfidenceSource::Fallback,
        match_quality: "Good match".to_string(),
        term_match_ratio: 0.8,
        data_quality_ratio: 0.9,
    }
}

fn rates(mfn: f64, usmca: f64) -> TariffRateRecord {
    TariffRateRecord {
        hs_code: "870830".to_string(),
        actual_hs_code: "870830".to_string(),
        mfn_rate: mfn,
        usmca_rate: usmca,
        effective_date: None,
        match_type: RateMatch::Exact,
        disclaimers: vec![],
    }
}

fn classification_from(results: Vec<ScoredCandidate>) -> tariffpath_api::models::ClassificationResponse {
    let high = results.iter().filter(|r| r.confidence >= 0.85).count();
    tariffpath_api::models::ClassificationResponse {
        results,
        search_terms: vec!["brake".to_string(), "pads".to_string()],
        high_confidence_count: high,
        recommends_professional_review: high == 0,
        professional_referral: None,
        disclaimers: vec![],
    }
}

fn referral_system() -> ReferralSystem {
    ReferralSystem::new(
        ClassificationConfig::from_env(),
        UsmcaConfig::from_env(),
        TariffConfig::from_env(),
    )
}

#[test]
fn strong_case_sails_through_without_referral() {
    // Classification well above the professional threshold
    let classification = classification_from(vec![scored("870830", 0.92), scored("870840", 0.55)]);

    // Fully North American bill of materials under the default RVC rule
    let rule = QualificationRule {
        hs_code: Some("870830".to_string()),
        kind: RuleKind::RegionalContent { threshold: 62.5 },
        required_documentation: vec!["USMCA Certificate of Origin".to_string()],
        source: RuleSource::DatabaseLookup,
    };
    let qualification = evaluate(
        &rule,
        &[component("MX", 70.0), component("US", 30.0)],
        &members(),
        "MX",
        &UsmcaConfig::from_env(),
    );
    assert!(qualification.qualified);

    // Modest savings under every guard threshold
    let savings = build_savings(&rates(8.0, 4.0), 250_000.0, Some("MX"), &TariffConfig::from_env());
    assert_eq!(savings.supplier_country.as_deref(), Some("MX"));

    let eval = referral_system().evaluate(&classification, Some(&qualification), Some(&savings));
    assert!(!eval.requires_professional);
    assert!(eval.referral_code.is_none());
}

#[test]
fn near_miss_qualification_escalates_whole_case() {
    let classification = classification_from(vec![scored("870830", 0.92)]);

    let rule = QualificationRule {
        hs_code: None,
        kind: RuleKind::RegionalContent { threshold: 62.5 },
        required_documentation: vec![],
        source: RuleSource::DatabaseLookup,
    };
    // 58% regional content: not qualified, but only 4.5% short
    let qualification = evaluate(
        &rule,
        &[component("MX", 58.0), component("CN", 42.0)],
        &members(),
        "MX",
        &UsmcaConfig::from_env(),
    );
    assert!(!qualification.qualified);

    let eval = referral_system().evaluate(&classification, Some(&qualification), None);
    assert!(eval.requires_professional);
    assert!(eval.severity >= Severity::Medium);
    assert!(eval.reasons.iter().any(|r| r.contains("away from USMCA qualification")));
    assert!(eval.referral_code.as_deref().unwrap().starts_with("REF_"));
}

#[test]
fn emergency_rates_taint_savings_and_force_referral() {
    let classification = classification_from(vec![scored("999999", 0.9)]);

    let mut fallback_rates = rates(3.0, 0.0);
    fallback_rates.match_type = RateMatch::EmergencyFallback;
    fallback_rates.disclaimers =
        vec!["No database rates available - using conservative estimate".to_string()];

    let volume = parse_trade_volume(&VolumeInput::Text("$1M - $5M".to_string()), 500_000.0);
    assert_eq!(volume, 3_000_000.0);

    let savings = build_savings(&fallback_rates, volume, None, &TariffConfig::from_env());
    assert_eq!(savings.match_type, RateMatch::EmergencyFallback);
    assert!(savings
        .warnings
        .iter()
        .any(|w| w.contains("No database rates available")));

    let eval = referral_system().evaluate(&classification, None, Some(&savings));
    assert!(eval.requires_professional);
    assert_eq!(eval.severity, Severity::High);
}

#[test]
fn selection_preserves_ranking_and_drops_weak_candidates() {
    let config = ClassificationConfig::from_env();
    let selected = select_results(
        vec![
            scored("870830", 0.9),
            scored("870840", 0.45),
            scored("392690", 0.12),
        ],
        &config,
    );

    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0].hs_code, "870830");
    assert_eq!(selected[1].hs_code, "870840");
}

#[test]
fn empty_selection_becomes_referral_response() {
    let config = ClassificationConfig::from_env();
    let selected = select_results(vec![scored("870830", 0.1)], &config);
    assert!(selected.is_empty());

    let response = referral_response(
        "No candidates met the minimum confidence threshold",
        vec!["brake".to_string()],
    );
    assert!(!response.is_success());
    assert!(response.recommends_professional_review);
    assert!(response.professional_referral.is_some());

    // A failed classification alone forces referral at high severity
    let eval = referral_system().evaluate(&response, None, None);
    assert!(eval.requires_professional);
    assert_eq!(eval.severity, Severity::High);
}

#[test]
fn wholly_obtained_rule_rejects_foreign_components() {
    let rule = QualificationRule {
        hs_code: None,
        kind: RuleKind::WhollyObtained,
        required_documentation: vec![],
        source: RuleSource::DatabaseLookup,
    };
    let qualification = evaluate(
        &rule,
        &[component("US", 95.0), component("CN", 5.0)],
        &members(),
        "US",
        &UsmcaConfig::from_env(),
    );

    assert!(!qualification.qualified);
    assert_eq!(
        qualification.reason,
        "Product does not meet wholly obtained requirements"
    );

    // Gap-based escalation does not apply to non-RVC failures with high content
    let eval = referral_system().evaluate(
        &classification_from(vec![scored("020110", 0.9)]),
        Some(&qualification),
        None,
    );
    assert!(eval
        .reasons
        .iter()
        .any(|r| r.contains("does not currently qualify")));
}
