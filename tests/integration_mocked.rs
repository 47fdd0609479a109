/// Integration tests with a mocked AI scoring oracle
/// Tests the scoring paths without hitting a real external service
use std::sync::Arc;
use tariffpath_api::config::{ClassificationConfig, OracleConfig};
use tariffpath_api::models::{CatalogCandidate, ConfidenceSource, SearchStrategy};
use tariffpath_api::scoring::{AiScorer, ConfidenceScorer, TextScorer};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create oracle config pointing at the mock server
fn create_test_oracle_config(base_url: String) -> OracleConfig {
    OracleConfig {
        api_key: Some("test_key".to_string()),
        base_url,
        model: "claude-3-haiku-20240307".to_string(),
        max_tokens: 1000,
        timeout_ms: 5_000,
    }
}

fn candidate(code: &str, description: &str) -> CatalogCandidate {
    CatalogCandidate {
        hs_code: code.to_string(),
        product_description: description.to_string(),
        mfn_tariff_rate: Some(5.0),
        usmca_tariff_rate: Some(0.0),
        usmca_eligible: Some(true),
        strategy: SearchStrategy::SingleTerm,
        matched_terms: vec!["cable".to_string()],
        matched_business_type: None,
    }
}

#[tokio::test]
async fn test_oracle_successful_scoring() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "content": [
            {"type": "text", "text": "[85, 60]"}
        ]
    });

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test_key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let scorer = AiScorer::new(&create_test_oracle_config(mock_server.uri())).unwrap();
    let candidates = vec![
        candidate("854442", "Insulated electric conductors fitted with connectors"),
        candidate("392690", "Other articles of plastics"),
    ];

    let scores = scorer
        .score_text_match("usb charging cable", &candidates)
        .await
        .unwrap();

    assert_eq!(scores, vec![85, 60]);
    assert_eq!(scorer.source_tag(), ConfidenceSource::AiClaude);
}

#[tokio::test]
async fn test_oracle_count_mismatch_is_error() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "content": [{"type": "text", "text": "[85]"}]
    });

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let scorer = AiScorer::new(&create_test_oracle_config(mock_server.uri())).unwrap();
    let candidates = vec![
        candidate("854442", "Insulated electric conductors"),
        candidate("392690", "Other articles of plastics"),
    ];

    let result = scorer.score_text_match("cable", &candidates).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_oracle_out_of_range_scores_are_error() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "content": [{"type": "text", "text": "[150]"}]
    });

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let scorer = AiScorer::new(&create_test_oracle_config(mock_server.uri())).unwrap();
    let result = scorer
        .score_text_match("cable", &[candidate("854442", "Conductors")])
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_scorer_falls_back_when_oracle_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let oracle: Arc<dyn TextScorer> =
        Arc::new(AiScorer::new(&create_test_oracle_config(mock_server.uri())).unwrap());
    let scorer = ConfidenceScorer::new(ClassificationConfig::from_env(), Some(oracle));

    let results = scorer
        .score(
            vec![candidate("854442", "Insulated electric conductors")],
            &["cable".to_string()],
            None,
            "usb charging cable",
        )
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].confidence_source,
        ConfidenceSource::DatabaseFallback
    );
    assert!(results[0].confidence > 0.0);
}

#[tokio::test]
async fn test_scorer_uses_oracle_scores_when_available() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "content": [{"type": "text", "text": "[90]"}]
    });

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let oracle: Arc<dyn TextScorer> =
        Arc::new(AiScorer::new(&create_test_oracle_config(mock_server.uri())).unwrap());
    let scorer = ConfidenceScorer::new(ClassificationConfig::from_env(), Some(oracle));

    let results = scorer
        .score(
            vec![candidate(
                "854442",
                "Insulated electric conductors fitted with connectors, for a voltage not exceeding 1000 V",
            )],
            &["cable".to_string()],
            None,
            "usb charging cable",
        )
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].confidence_source, ConfidenceSource::AiClaude);
    // 0.90 base plus bonuses, clamped to the configured maximum
    assert!(results[0].confidence >= 0.90);
    assert!(results[0].confidence <= 0.98);
}

#[tokio::test]
async fn test_oracle_malformed_text_is_error() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "content": [{"type": "text", "text": "I think the first code fits best."}]
    });

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let scorer = AiScorer::new(&create_test_oracle_config(mock_server.uri())).unwrap();
    let result = scorer
        .score_text_match("cable", &[candidate("854442", "Conductors")])
        .await;

    assert!(result.is_err());
}

#[test]
fn test_oracle_requires_api_key() {
    let mut config = create_test_oracle_config("https://api.anthropic.com".to_string());
    config.api_key = None;
    assert!(AiScorer::new(&config).is_err());
}
