/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use proptest::prelude::*;
use tariffpath_api::config::{ClassificationConfig, TariffConfig};
use tariffpath_api::models::{
    CatalogCandidate, RateMatch, SearchStrategy, TariffRateRecord, VolumeInput,
};
use tariffpath_api::scoring::{data_quality_ratio, deterministic_score, term_match_ratio};
use tariffpath_api::search::generate_term_combinations;
use tariffpath_api::tariff::{build_savings, normalize_hs_code, parse_trade_volume};
use tariffpath_api::terms::extract_search_terms;

fn candidate(description: String, mfn: Option<f64>, usmca: Option<f64>) -> CatalogCandidate {
    CatalogCandidate {
        hs_code: "850440".to_string(),
        product_description: description,
        mfn_tariff_rate: mfn,
        usmca_tariff_rate: usmca,
        usmca_eligible: None,
        strategy: SearchStrategy::SingleTerm,
        matched_terms: vec![],
        matched_business_type: None,
    }
}

fn rate_record(mfn: f64, usmca: f64) -> TariffRateRecord {
    TariffRateRecord {
        hs_code: "850440".to_string(),
        actual_hs_code: "850440".to_string(),
        mfn_rate: mfn,
        usmca_rate: usmca,
        effective_date: None,
        match_type: RateMatch::Exact,
        disclaimers: vec![],
    }
}

// Property: term extraction never panics and obeys its bounds
proptest! {
    #[test]
    fn term_extraction_never_panics(description in "\\PC*") {
        let config = ClassificationConfig::from_env();
        let _ = extract_search_terms(&description, &config);
    }

    #[test]
    fn extracted_terms_are_bounded_and_normalized(description in "[a-zA-Z0-9 ,.!-]{3,200}") {
        let config = ClassificationConfig::from_env();
        if let Ok(terms) = extract_search_terms(&description, &config) {
            prop_assert!(terms.len() <= config.max_search_terms);
            for term in &terms {
                prop_assert!(term.chars().count() >= 3);
                prop_assert!(term.chars().all(|c| c.is_alphanumeric()));
                prop_assert_eq!(term.clone(), term.to_lowercase());
            }
        }
    }
}

// Property: scoring ratios stay in the unit interval
proptest! {
    #[test]
    fn term_match_ratio_in_unit_interval(
        description in "[a-z ]{0,120}",
        terms in proptest::collection::vec("[a-z]{3,10}", 0..8)
    ) {
        let terms: Vec<String> = terms.into_iter().collect();
        let ratio = term_match_ratio(&description, &terms);
        prop_assert!((0.0..=1.0).contains(&ratio));
    }

    #[test]
    fn data_quality_ratio_in_unit_interval(
        description in "[a-z ]{0,120}",
        mfn in proptest::option::of(0.0f64..100.0),
        usmca in proptest::option::of(0.0f64..100.0)
    ) {
        let config = ClassificationConfig::from_env();
        let ratio = data_quality_ratio(&candidate(description, mfn, usmca), &config);
        prop_assert!((0.0..=1.0).contains(&ratio));
    }

    #[test]
    fn deterministic_confidence_monotonic_in_term_ratio(
        r1 in 0.0f64..=1.0,
        r2 in 0.0f64..=1.0,
        quality in 0.0f64..=1.0,
        usmca in any::<bool>(),
        business_type in any::<bool>()
    ) {
        let config = ClassificationConfig::from_env();
        let (lower, higher) = if r1 <= r2 { (r1, r2) } else { (r2, r1) };

        let a = deterministic_score(
            lower, quality, usmca, business_type, SearchStrategy::SingleTerm, &config,
        );
        let b = deterministic_score(
            higher, quality, usmca, business_type, SearchStrategy::SingleTerm, &config,
        );

        // More matched terms never lowers confidence, raw or clamped
        prop_assert!(a <= b);
        prop_assert!(
            a.clamp(config.min_confidence, config.max_confidence)
                <= b.clamp(config.min_confidence, config.max_confidence)
        );
    }
}

// Property: volume parsing never panics and always yields a usable number
proptest! {
    #[test]
    fn volume_text_parsing_never_panics(text in "\\PC*") {
        let volume = parse_trade_volume(&VolumeInput::Text(text), 500_000.0);
        prop_assert!(volume.is_finite());
        prop_assert!(volume > 0.0);
    }

    #[test]
    fn volume_numbers_pass_through_or_default(n in proptest::num::f64::ANY) {
        let volume = parse_trade_volume(&VolumeInput::Number(n), 500_000.0);
        if n.is_finite() && n > 0.0 {
            prop_assert_eq!(volume, n);
        } else {
            prop_assert_eq!(volume, 500_000.0);
        }
    }
}

// Property: savings stay inside the validation guard's bounds
proptest! {
    #[test]
    fn savings_bounds_hold(
        mfn in 0.0f64..120.0,
        usmca in 0.0f64..120.0,
        volume in 1_000.0f64..100_000_000.0
    ) {
        let config = TariffConfig::from_env();
        let result = build_savings(&rate_record(mfn, usmca), volume, None, &config);

        prop_assert!(result.annual_savings >= 0.0);
        prop_assert!(result.savings_percentage >= 0.0);
        prop_assert!(result.savings_percentage <= config.max_savings_percentage);
        prop_assert!((result.monthly_savings - result.annual_savings / 12.0).abs() < 1e-6);
        // Savings can never exceed the full MFN duty on the volume
        prop_assert!(result.annual_savings <= volume * mfn / 100.0 + 1e-6);
    }
}

// Property: code normalization and combination generation are total
proptest! {
    #[test]
    fn normalize_hs_code_never_panics(code in "\\PC*") {
        if let Ok(normalized) = normalize_hs_code(&code) {
            prop_assert!(normalized.len() >= 2);
            prop_assert!(normalized.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn term_combinations_respect_cap(
        terms in proptest::collection::vec("[a-z]{3,8}", 0..10),
        max in 0usize..8
    ) {
        let terms: Vec<String> = terms.into_iter().collect();
        let combos = generate_term_combinations(&terms, max);
        prop_assert!(combos.len() <= max);
        for combo in &combos {
            prop_assert!(combo.len() == 2 || combo.len() == 3);
        }
    }
}
