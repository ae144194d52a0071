//! Configuration for the transaction manager
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{TxMgrError, TxMgrResult};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Submission and confirmation parameters, fixed per manager instance
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Delay between successive submission attempts for the same logical
    /// transaction, in milliseconds
    pub resubmission_timeout_ms: u64,
    /// Delay between receipt polls while waiting for a variant to mine,
    /// in milliseconds
    pub receipt_query_interval_ms: u64,
    /// Minimum number of on-chain confirmations before a receipt is accepted
    pub num_confirmations: u64,
    /// Number of consecutive nonce-too-low send errors that triggers
    /// a fatal abort
    pub safe_abort_nonce_too_low_count: u64,
}

impl Config {
    /// Load configuration from the file named by `TXMGR_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("TXMGR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/txmgr.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Config = toml::from_str(&expand_env_vars(&config_str))
            .with_context(|| "Failed to parse configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    ///
    /// Zero confirmation or abort counts are programmer errors; zero timer
    /// periods would stall the driver and are rejected for the same reason.
    pub fn validate(&self) -> TxMgrResult<()> {
        if self.num_confirmations == 0 {
            return Err(TxMgrError::Config(
                "num_confirmations must be > 0".to_string(),
            ));
        }
        if self.safe_abort_nonce_too_low_count == 0 {
            return Err(TxMgrError::Config(
                "safe_abort_nonce_too_low_count must be > 0".to_string(),
            ));
        }
        if self.resubmission_timeout_ms == 0 {
            return Err(TxMgrError::Config(
                "resubmission_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.receipt_query_interval_ms == 0 {
            return Err(TxMgrError::Config(
                "receipt_query_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay between submission attempts
    pub fn resubmission_timeout(&self) -> Duration {
        Duration::from_millis(self.resubmission_timeout_ms)
    }

    /// Delay between receipt polls
    pub fn receipt_query_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_query_interval_ms)
    }
}

/// Expand `${VAR}` placeholders against the process environment before the
/// TOML is parsed; an unset variable expands to the empty string
fn expand_env_vars(raw: &str) -> String {
    let placeholder =
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern");

    placeholder
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            resubmission_timeout_ms: 3_000,
            receipt_query_interval_ms: 500,
            num_confirmations: 6,
            safe_abort_nonce_too_low_count: 3,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
        assert_eq!(
            valid_config().resubmission_timeout(),
            Duration::from_secs(3)
        );
        assert_eq!(
            valid_config().receipt_query_interval(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_zero_confirmations_rejected() {
        let mut config = valid_config();
        config.num_confirmations = 0;
        assert!(matches!(config.validate(), Err(TxMgrError::Config(_))));
    }

    #[test]
    fn test_zero_abort_count_rejected() {
        let mut config = valid_config();
        config.safe_abort_nonce_too_low_count = 0;
        assert!(matches!(config.validate(), Err(TxMgrError::Config(_))));
    }

    #[test]
    fn test_zero_timers_rejected() {
        let mut config = valid_config();
        config.resubmission_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.receipt_query_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_parse() {
        let config: Config = toml::from_str(
            r#"
            resubmission_timeout_ms = 2000
            receipt_query_interval_ms = 250
            num_confirmations = 1
            safe_abort_nonce_too_low_count = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.resubmission_timeout_ms, 2000);
        assert_eq!(config.num_confirmations, 1);
    }

    #[test]
    fn test_env_placeholders_expand_before_parse() {
        env::set_var("TXMGR_TEST_CONFIRMATIONS", "6");
        let raw = r#"
            resubmission_timeout_ms = 3000
            receipt_query_interval_ms = 500
            num_confirmations = ${TXMGR_TEST_CONFIRMATIONS}
            safe_abort_nonce_too_low_count = 3
        "#;

        let config: Config = toml::from_str(&expand_env_vars(raw)).unwrap();
        assert_eq!(config.num_confirmations, 6);
    }

    #[test]
    fn test_unset_env_placeholder_expands_empty() {
        env::remove_var("TXMGR_UNSET_FOR_TEST");
        assert_eq!(
            expand_env_vars("label = \"${TXMGR_UNSET_FOR_TEST}\""),
            "label = \"\""
        );
    }
}
