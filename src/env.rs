//! Environment variable names used by this crate for convenient
//! configuration of the default pipeline.
//!
//! These are purely helpers; the core types never read the environment
//! themselves. See [`PipelineConfig::from_env`](crate::config::PipelineConfig::from_env).

use crate::error::LogError;
use std::str::FromStr;

/// Minimum level of the root logger, e.g. `debug` or `WARN`.
pub const LOG_PIPELINE_LEVEL_ENV: &str = "LOG_PIPELINE_LEVEL";

/// Capacity of the default write engine's queue.
pub const LOG_PIPELINE_QUEUE_CAPACITY_ENV: &str = "LOG_PIPELINE_QUEUE_CAPACITY";

/// When set, the root logger also ships records to this network DSN,
/// e.g. `unix:///tmp/collector.sock?timeout=100&chan=1024`.
pub const LOG_PIPELINE_NET_DSN_ENV: &str = "LOG_PIPELINE_NET_DSN";

/// Upper bound for a record's message, in bytes.
pub const LOG_PIPELINE_MAX_MESSAGE_BYTES_ENV: &str = "LOG_PIPELINE_MAX_MESSAGE_BYTES";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable if it is set and non-empty.
///
/// **Returns**
/// - `Ok(None)` when the variable is unset or blank.
/// - `Err(LogError::InvalidConfig)` naming the variable when the value
///   does not parse.
pub fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, LogError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| LogError::InvalidConfig {
                    key: key.to_string(),
                    value,
                })
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_values_and_skips_blank_ones() {
        std::env::set_var("LOG_PIPELINE_TEST_NUMBER", " 42 ");
        std::env::set_var("LOG_PIPELINE_TEST_BLANK", "");
        std::env::set_var("LOG_PIPELINE_TEST_BAD", "many");

        assert_eq!(env_parse::<usize>("LOG_PIPELINE_TEST_NUMBER").unwrap(), Some(42));
        assert_eq!(env_parse::<usize>("LOG_PIPELINE_TEST_BLANK").unwrap(), None);
        assert_eq!(env_parse::<usize>("LOG_PIPELINE_TEST_UNSET").unwrap(), None);
        assert!(matches!(
            env_parse::<usize>("LOG_PIPELINE_TEST_BAD"),
            Err(LogError::InvalidConfig { key, .. }) if key == "LOG_PIPELINE_TEST_BAD"
        ));
        assert_eq!(env_or("LOG_PIPELINE_TEST_UNSET", "fallback"), "fallback");
    }
}
