//! Scheduler configuration structures.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, CircuitBreakerConfig, DeadLetterPolicy, Trigger};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "UNIFIED_SCHEDULER_";

/// Circuit breaker and dead-letter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Consecutive failures that trip a breaker.
    pub failure_threshold: u32,
    /// Seconds a breaker stays OPEN before probing.
    pub recovery_timeout_secs: u64,
    /// Probe successes needed to close a breaker.
    pub success_threshold: u32,
    /// Dead-letter queue capacity.
    pub dead_letter_max_size: usize,
    /// When failed protected operations are archived.
    pub dead_letter_policy: DeadLetterPolicy,
    /// Seconds an archived entry is kept before TTL cleanup.
    pub dead_letter_retention_secs: u64,
    /// Retry attempts per entry before the drain stops retrying it.
    pub dead_letter_max_retries: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            success_threshold: 2,
            dead_letter_max_size: 10_000,
            dead_letter_policy: DeadLetterPolicy::WhenOpen,
            dead_letter_retention_secs: 7 * 24 * 3600,
            dead_letter_max_retries: 3,
        }
    }
}

impl ResilienceConfig {
    /// Breaker defaults derived from this config.
    pub const fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            success_threshold: self.success_threshold,
        }
    }

    /// Retention window for archived entries.
    pub const fn dead_letter_retention(&self) -> Duration {
        Duration::from_secs(self.dead_letter_retention_secs)
    }

    /// Validate resilience values.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".into());
        }
        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".into());
        }
        if self.dead_letter_max_size == 0 {
            return Err("dead_letter_max_size must be greater than 0".into());
        }
        if self.dead_letter_retention_secs == 0 {
            return Err("dead_letter_retention_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Intervals of the scheduler's own maintenance tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Backend health probe interval.
    pub health_probe_interval_secs: u64,
    /// Metrics snapshot interval.
    pub metrics_interval_secs: u64,
    /// Cleanup sweep interval.
    pub cleanup_interval_secs: u64,
    /// Dead-letter drain interval.
    pub dead_letter_drain_interval_secs: u64,
    /// Cron expression for the credential rotation check.
    pub credential_rotation_cron: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            health_probe_interval_secs: 30,
            metrics_interval_secs: 60,
            cleanup_interval_secs: 3600,
            dead_letter_drain_interval_secs: 300,
            credential_rotation_cron: "0 3 * * *".into(),
        }
    }
}

impl MaintenanceConfig {
    /// Validate maintenance values.
    pub fn validate(&self) -> Result<(), String> {
        for (name, secs) in [
            ("health_probe_interval_secs", self.health_probe_interval_secs),
            ("metrics_interval_secs", self.metrics_interval_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            (
                "dead_letter_drain_interval_secs",
                self.dead_letter_drain_interval_secs,
            ),
        ] {
            if secs == 0 {
                return Err(format!("{name} must be greater than 0"));
            }
        }
        Trigger::cron(self.credential_rotation_cron.clone())
            .compile()
            .map(|_| ())
            .map_err(|e| format!("credential_rotation_cron: {e}"))
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds `start` waits for each backend before treating it as failed.
    pub startup_timeout_secs: u64,
    /// Seconds `stop` waits for running timer tasks before aborting them.
    pub shutdown_grace_secs: u64,
    /// Seconds a hand-off to the durable queue or DAG backend may take.
    pub submission_timeout_secs: u64,
    /// Concurrent timer task bodies; defaults to twice the CPU count.
    pub timer_max_concurrency: usize,
    /// Resilience layer settings.
    pub resilience: ResilienceConfig,
    /// Maintenance task settings.
    pub maintenance: MaintenanceConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 10,
            shutdown_grace_secs: 5,
            submission_timeout_secs: 5,
            timer_max_concurrency: num_cpus::get().max(1) * 2,
            resilience: ResilienceConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Startup timeout as a duration.
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Shutdown grace period as a duration.
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Submission timeout as a duration.
    pub const fn submission_timeout(&self) -> Duration {
        Duration::from_secs(self.submission_timeout_secs)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if self.startup_timeout_secs == 0 {
            return Err("startup_timeout_secs must be greater than 0".into());
        }
        if self.submission_timeout_secs == 0 {
            return Err("submission_timeout_secs must be greater than 0".into());
        }
        if self.timer_max_concurrency == 0 {
            return Err("timer_max_concurrency must be greater than 0".into());
        }
        self.resilience
            .validate()
            .map_err(|e| format!("resilience invalid: {e}"))?;
        self.maintenance
            .validate()
            .map_err(|e| format!("maintenance invalid: {e}"))
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `UNIFIED_SCHEDULER_*` environment variables,
    /// after loading a `.env` file if one exists.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is fine; real environment variables still apply.
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        override_from_env(&mut cfg.startup_timeout_secs, "STARTUP_TIMEOUT_SECS")?;
        override_from_env(&mut cfg.shutdown_grace_secs, "SHUTDOWN_GRACE_SECS")?;
        override_from_env(&mut cfg.submission_timeout_secs, "SUBMISSION_TIMEOUT_SECS")?;
        override_from_env(&mut cfg.timer_max_concurrency, "TIMER_MAX_CONCURRENCY")?;

        let r = &mut cfg.resilience;
        override_from_env(&mut r.failure_threshold, "FAILURE_THRESHOLD")?;
        override_from_env(&mut r.recovery_timeout_secs, "RECOVERY_TIMEOUT_SECS")?;
        override_from_env(&mut r.success_threshold, "SUCCESS_THRESHOLD")?;
        override_from_env(&mut r.dead_letter_max_size, "DEAD_LETTER_MAX_SIZE")?;
        override_from_env(&mut r.dead_letter_retention_secs, "DEAD_LETTER_RETENTION_SECS")?;
        override_from_env(&mut r.dead_letter_max_retries, "DEAD_LETTER_MAX_RETRIES")?;
        if let Some(raw) = env_value("DEAD_LETTER_POLICY") {
            r.dead_letter_policy = serde_json::from_value(serde_json::Value::String(raw.clone()))
                .with_context(|| format!("{ENV_PREFIX}DEAD_LETTER_POLICY: `{raw}`"))?;
        }

        let m = &mut cfg.maintenance;
        override_from_env(&mut m.health_probe_interval_secs, "HEALTH_PROBE_INTERVAL_SECS")?;
        override_from_env(&mut m.metrics_interval_secs, "METRICS_INTERVAL_SECS")?;
        override_from_env(&mut m.cleanup_interval_secs, "CLEANUP_INTERVAL_SECS")?;
        override_from_env(
            &mut m.dead_letter_drain_interval_secs,
            "DEAD_LETTER_DRAIN_INTERVAL_SECS",
        )?;
        if let Some(expr) = env_value("CREDENTIAL_ROTATION_CRON") {
            m.credential_rotation_cron = expr;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn override_from_env<T>(slot: &mut T, key: &str) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = env_value(key) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_PREFIX}{key}: `{raw}`"))?;
    }
    Ok(())
}
