//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("env var pattern is valid");
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables.
    ///
    /// - `${VAR_NAME}` keeps the placeholder when the variable is unset
    /// - `${VAR_NAME:-default}` falls back to `default`
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex_lite::Captures<'_>| {
                match std::env::var(&caps[1]) {
                    Ok(value) => value,
                    Err(_) => match caps.get(2) {
                        Some(default) => default.as_str().to_string(),
                        None => caps[0].to_string(),
                    },
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("UPLOAD_BENCH_TEST_VAR", "test_value");
        let expanded = ConfigLoader::expand_env_vars("key: ${UPLOAD_BENCH_TEST_VAR}");
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("UPLOAD_BENCH_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_default() {
        std::env::remove_var("UPLOAD_BENCH_MISSING");
        let expanded = ConfigLoader::expand_env_vars("region: ${UPLOAD_BENCH_MISSING:-eu-west-1}");
        assert_eq!(expanded, "region: eu-west-1");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_keeps_unset_placeholder() {
        std::env::remove_var("UPLOAD_BENCH_MISSING");
        let expanded = ConfigLoader::expand_env_vars("key: ${UPLOAD_BENCH_MISSING}");
        assert_eq!(expanded, "key: ${UPLOAD_BENCH_MISSING}");
    }
}
