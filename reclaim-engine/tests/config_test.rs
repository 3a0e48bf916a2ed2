//! Config loading and defaults integration tests

use std::time::Duration;

use reclaim_core::DecisionPolicy;
use reclaim_engine::cli::validate;
use reclaim_engine::{NotifyStrategy, ReclaimConfig};

#[test]
fn test_empty_yaml_uses_defaults() {
    let config = ReclaimConfig::from_yaml("{}").expect("valid YAML");

    assert_eq!(config.matching.match_threshold, 60);
    assert_eq!(config.matching.strong_match_threshold, 75);
    assert_eq!(config.matching.notify_strategy, NotifyStrategy::FirstEncountered);
    assert_eq!(config.verification.min_questions, 2);
    assert_eq!(config.verification.max_questions, 5);
    assert_eq!(config.agent.models(), vec!["gemini-2.5-flash", "gemini-2.0-flash"]);
    assert_eq!(config.timeouts.store(), Duration::from_secs(5));
    assert!(config.notify.webhook_url.is_none());
    assert_eq!(config.chat.user_prefix, "app_");
    assert!(validate(&config).is_ok());
}

#[test]
fn test_config_with_all_sections() {
    let yaml = r#"
matching:
  match_threshold: 55
  strong_match_threshold: 80
  notify_strategy: highest_score
  lookup_concurrency: 2
verification:
  policy:
    kind: exact_count
    min_questions: 3
  containment: either
  min_questions: 3
  max_questions: 4
agent:
  base_url: "http://localhost:11434/v1"
  primary_model: "local-model"
  fallback_model: null
  request_timeout_ms: 1500
timeouts:
  store_ms: 250
  notify_ms: 750
  chat_ms: 500
notify:
  webhook_url: "http://mail-relay.internal/send"
  verify_url_base: "https://reclaim.campus.edu/verify-ownership"
chat:
  base_url: "https://chat.internal"
  user_prefix: "rc_"
"#;

    let config = ReclaimConfig::from_yaml(yaml).expect("valid YAML");

    assert_eq!(config.matching.match_threshold, 55);
    assert_eq!(config.matching.notify_strategy, NotifyStrategy::HighestScore);
    assert_eq!(config.matching.lookup_concurrency, 2);
    assert_eq!(
        config.verification.policy,
        DecisionPolicy::ExactCount { min_questions: 3 }
    );
    assert_eq!(config.agent.models(), vec!["local-model"]);
    assert_eq!(config.agent.request_timeout(), Duration::from_millis(1500));
    assert_eq!(config.timeouts.notify(), Duration::from_millis(750));
    assert_eq!(
        config.notify.webhook_url.as_deref(),
        Some("http://mail-relay.internal/send")
    );
    assert_eq!(config.chat.user_prefix, "rc_");
    assert!(validate(&config).is_ok());
}

#[test]
fn test_yaml_round_trip_preserves_thresholds() {
    let mut config = ReclaimConfig::default();
    config.matching.strong_match_threshold = 90;

    let reloaded = ReclaimConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
    assert_eq!(reloaded.matching.strong_match_threshold, 90);
}

#[test]
fn test_unknown_strategy_is_rejected() {
    let yaml = "matching:\n  notify_strategy: loudest\n";
    assert!(ReclaimConfig::from_yaml(yaml).is_err());
}
