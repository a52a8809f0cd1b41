use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Cache TTLs are positive
/// - Retry ceiling and page size are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.cache.on_deck_ttl_secs <= 0 {
        return Err(ConfigError::ValidationError(
            "cache.on_deck_ttl_secs must be positive".to_string(),
        ));
    }
    if config.cache.hubs_ttl_secs <= 0 {
        return Err(ConfigError::ValidationError(
            "cache.hubs_ttl_secs must be positive".to_string(),
        ));
    }
    if config.cache.metadata_ttl_secs <= 0 {
        return Err(ConfigError::ValidationError(
            "cache.metadata_ttl_secs must be positive".to_string(),
        ));
    }
    if config.sync.retry_ceiling == 0 {
        return Err(ConfigError::ValidationError(
            "sync.retry_ceiling cannot be 0".to_string(),
        ));
    }
    if config.library.page_size == 0 {
        return Err(ConfigError::ValidationError(
            "library.page_size cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_ttl_fails() {
        let mut config = Config::default();
        config.cache.on_deck_ttl_secs = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_retry_ceiling_fails() {
        let mut config = Config::default();
        config.sync.retry_ceiling = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_page_size_fails() {
        let mut config = Config::default();
        config.library.page_size = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
