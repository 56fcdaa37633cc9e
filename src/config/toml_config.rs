use crate::core::catalog_reader::CatalogReaderConfig;
use crate::core::circuit_breaker::CircuitBreakerConfig;
use crate::core::consumer::RetryPolicy;
use crate::utils::error::{PlannerError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_one_of, validate_positive_number, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Planner settings loaded from TOML. Every section and key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub catalog: CatalogConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub broker: BrokerConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub timeout_ms: u64,
    pub cache_ttl_seconds: u64,
    pub cache_key_prefix: String,
    pub max_batch_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            cache_ttl_seconds: 600,
            cache_key_prefix: "project-id-cache".to_string(),
            max_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub failure_window_seconds: u64,
    pub cool_down_seconds: u64,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_seconds: 60,
            cool_down_seconds: 30,
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub topic: String,
    pub dead_letter_topic: String,
    pub partition_count: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            topic: "capital-maximization-query-events".to_string(),
            dead_letter_topic: "capital-maximization-query-events-dlq".to_string(),
            partition_count: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay_seconds: u64,
    pub fail_fast_on_structural: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_seconds: 2,
            fail_fast_on_structural: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `compact` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "compact".to_string(),
        }
    }
}

impl PlannerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| PlannerError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; unset variables are left
    /// as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| PlannerError::Internal {
            message: format!("env var pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn catalog_reader_config(&self) -> CatalogReaderConfig {
        CatalogReaderConfig {
            timeout: Duration::from_millis(self.catalog.timeout_ms),
            cache_ttl: Duration::from_secs(self.catalog.cache_ttl_seconds),
            cache_key_prefix: self.catalog.cache_key_prefix.clone(),
            max_batch_size: self.catalog.max_batch_size,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        let cb = &self.circuit_breaker;
        CircuitBreakerConfig::default()
            .with_failure_threshold(cb.failure_threshold)
            .with_failure_window(Duration::from_secs(cb.failure_window_seconds))
            .with_cool_down(Duration::from_secs(cb.cool_down_seconds))
            .with_half_open_max_calls(cb.half_open_max_calls)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            delay: Duration::from_secs(self.retry.delay_seconds),
            fail_fast_on_structural: self.retry.fail_fast_on_structural,
        }
    }

    pub fn json_logs(&self) -> bool {
        self.logging.format == "json"
    }
}

impl Validate for PlannerConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("catalog.timeout_ms", self.catalog.timeout_ms, 1)?;
        validate_positive_number(
            "catalog.max_batch_size",
            self.catalog.max_batch_size as u64,
            1,
        )?;
        validate_non_empty_string("catalog.cache_key_prefix", &self.catalog.cache_key_prefix)?;

        validate_positive_number(
            "circuit_breaker.failure_threshold",
            self.circuit_breaker.failure_threshold as u64,
            1,
        )?;
        validate_positive_number(
            "circuit_breaker.half_open_max_calls",
            self.circuit_breaker.half_open_max_calls as u64,
            1,
        )?;

        validate_non_empty_string("broker.topic", &self.broker.topic)?;
        validate_non_empty_string("broker.dead_letter_topic", &self.broker.dead_letter_topic)?;
        validate_positive_number(
            "broker.partition_count",
            self.broker.partition_count as u64,
            1,
        )?;
        if self.broker.topic == self.broker.dead_letter_topic {
            return Err(PlannerError::InvalidConfigValueError {
                field: "broker.dead_letter_topic".to_string(),
                value: self.broker.dead_letter_topic.clone(),
                reason: "Dead-letter topic must differ from the request topic".to_string(),
            });
        }

        validate_one_of("logging.format", &self.logging.format, &["compact", "json"])?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PlannerConfig::from_toml_str("").unwrap();

        assert_eq!(config.catalog.timeout_ms, 2000);
        assert_eq!(config.broker.partition_count, 10);
        assert_eq!(config.broker.topic, "capital-maximization-query-events");
        assert_eq!(config.retry.max_retries, 3);
        assert!(!config.retry.fail_fast_on_structural);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_sections_and_conversions() {
        let toml_content = r#"
[catalog]
timeout_ms = 500

[circuit_breaker]
failure_threshold = 2
cool_down_seconds = 5

[retry]
delay_seconds = 1
fail_fast_on_structural = true

[logging]
format = "json"
"#;

        let config = PlannerConfig::from_toml_str(toml_content).unwrap();
        let reader = config.catalog_reader_config();
        let breaker = config.circuit_breaker_config();
        let retry = config.retry_policy();

        assert_eq!(reader.timeout, Duration::from_millis(500));
        assert_eq!(reader.cache_ttl, Duration::from_secs(600));
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.cool_down, Duration::from_secs(5));
        assert_eq!(breaker.failure_window, Duration::from_secs(60));
        assert_eq!(retry.delay, Duration::from_secs(1));
        assert!(retry.fail_fast_on_structural);
        assert!(config.json_logs());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ROI_PLANNER_TEST_TOPIC", "requests-from-env");

        let toml_content = r#"
[broker]
topic = "${ROI_PLANNER_TEST_TOPIC}"
"#;

        let config = PlannerConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.broker.topic, "requests-from-env");

        std::env::remove_var("ROI_PLANNER_TEST_TOPIC");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            "[broker]\npartition_count = 0",
            "[circuit_breaker]\nfailure_threshold = 0",
            "[broker]\ntopic = \"  \"",
            "[broker]\ntopic = \"same\"\ndead_letter_topic = \"same\"",
            "[logging]\nformat = \"xml\"",
        ];

        for case in cases {
            let config = PlannerConfig::from_toml_str(case).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", case);
        }
    }

    #[test]
    fn test_malformed_toml() {
        let err = PlannerConfig::from_toml_str("[catalog\ntimeout_ms = ").unwrap_err();
        assert!(matches!(err, PlannerError::ConfigError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[broker]\npartition_count = 4\n")
            .unwrap();

        let config = PlannerConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.broker.partition_count, 4);
    }
}
