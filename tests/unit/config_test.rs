//! Tests for configuration validation

use std::time::Duration;

use unified_scheduler::config::{MaintenanceConfig, ResilienceConfig, SchedulerConfig};
use unified_scheduler::core::DeadLetterPolicy;

#[test]
fn test_default_config_is_valid() {
    let config = SchedulerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.startup_timeout(), Duration::from_secs(10));
    assert_eq!(config.resilience.failure_threshold, 5);
    assert_eq!(config.resilience.success_threshold, 2);
    assert_eq!(config.resilience.dead_letter_policy, DeadLetterPolicy::WhenOpen);
    assert!(config.timer_max_concurrency >= 2);
}

#[test]
fn test_resilience_config_maps_to_breaker_config() {
    let resilience = ResilienceConfig {
        failure_threshold: 3,
        recovery_timeout_secs: 15,
        success_threshold: 1,
        ..ResilienceConfig::default()
    };
    let breaker = resilience.circuit_breaker();
    assert_eq!(breaker.failure_threshold, 3);
    assert_eq!(breaker.recovery_timeout, Duration::from_secs(15));
    assert_eq!(breaker.success_threshold, 1);
}

#[test]
fn test_resilience_config_invalid_values() {
    let zero_success = ResilienceConfig {
        success_threshold: 0,
        ..ResilienceConfig::default()
    };
    assert!(zero_success.validate().is_err());

    let zero_capacity = ResilienceConfig {
        dead_letter_max_size: 0,
        ..ResilienceConfig::default()
    };
    assert!(zero_capacity.validate().is_err());
}

#[test]
fn test_maintenance_config_invalid_values() {
    let zero_interval = MaintenanceConfig {
        metrics_interval_secs: 0,
        ..MaintenanceConfig::default()
    };
    assert!(zero_interval.validate().unwrap_err().contains("metrics_interval_secs"));

    let bad_cron = MaintenanceConfig {
        credential_rotation_cron: "at three".into(),
        ..MaintenanceConfig::default()
    };
    assert!(bad_cron.validate().is_err());
}

#[test]
fn test_scheduler_config_from_json() {
    let config = SchedulerConfig::from_json_str(
        r#"{
            "startup_timeout_secs": 3,
            "resilience": { "failure_threshold": 2, "dead_letter_policy": "always" },
            "maintenance": { "credential_rotation_cron": "0 4 * * 1" }
        }"#,
    )
    .unwrap();
    assert_eq!(config.startup_timeout_secs, 3);
    assert_eq!(config.shutdown_grace_secs, 5);
    assert_eq!(config.resilience.failure_threshold, 2);
    assert_eq!(config.resilience.dead_letter_policy, DeadLetterPolicy::Always);
    assert_eq!(config.maintenance.health_probe_interval_secs, 30);

    assert!(SchedulerConfig::from_json_str(r#"{"submission_timeout_secs": 0}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

// Environment variables are process-wide, so every env case lives in one test.
#[test]
fn test_scheduler_config_from_env() {
    std::env::set_var("UNIFIED_SCHEDULER_FAILURE_THRESHOLD", "9");
    std::env::set_var("UNIFIED_SCHEDULER_DEAD_LETTER_POLICY", "never");
    std::env::set_var("UNIFIED_SCHEDULER_HEALTH_PROBE_INTERVAL_SECS", "12");
    let config = SchedulerConfig::from_env().unwrap();
    assert_eq!(config.resilience.failure_threshold, 9);
    assert_eq!(config.resilience.dead_letter_policy, DeadLetterPolicy::Never);
    assert_eq!(config.maintenance.health_probe_interval_secs, 12);

    std::env::set_var("UNIFIED_SCHEDULER_FAILURE_THRESHOLD", "many");
    let err = SchedulerConfig::from_env().unwrap_err();
    assert!(format!("{err:#}").contains("UNIFIED_SCHEDULER_FAILURE_THRESHOLD"));

    std::env::set_var("UNIFIED_SCHEDULER_FAILURE_THRESHOLD", "0");
    assert!(SchedulerConfig::from_env().is_err());

    for key in [
        "UNIFIED_SCHEDULER_FAILURE_THRESHOLD",
        "UNIFIED_SCHEDULER_DEAD_LETTER_POLICY",
        "UNIFIED_SCHEDULER_HEALTH_PROBE_INTERVAL_SECS",
    ] {
        std::env::remove_var(key);
    }
}
