use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Pull list base URL is an http(s) URL
/// - Storage bucket is set
/// - Cache batch size and sync count are positive
/// - Matcher threshold is a finite, non-negative number
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let base_url = config.pulldb.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "pulldb.base_url must be an http(s) URL, got {:?}",
            config.pulldb.base_url
        )));
    }

    if config.storage.bucket.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.bucket cannot be empty".to_string(),
        ));
    }

    if config.cache.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "cache.batch_size cannot be 0".to_string(),
        ));
    }

    if config.sync.count == 0 {
        return Err(ConfigError::ValidationError(
            "sync.count cannot be 0".to_string(),
        ));
    }

    let threshold = config.matcher.threshold;
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "matcher.threshold must be a non-negative number, got {}",
            threshold
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[pulldb]
base_url = "https://pulldb.example.com"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_bad_base_url_fails() {
        let mut config = base_config();
        config.pulldb.base_url = "pulldb.example.com".to_string();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_batch_size_fails() {
        let mut config = base_config();
        config.cache.batch_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_negative_threshold_fails() {
        let mut config = base_config();
        config.matcher.threshold = -0.1;
        assert!(validate_config(&config).is_err());

        config.matcher.threshold = f64::NAN;
        assert!(validate_config(&config).is_err());
    }
}
