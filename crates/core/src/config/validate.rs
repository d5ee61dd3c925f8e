use super::{types::Config, ConfigError, ImageSelectorKind};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Concurrency bound is at least 1
/// - Confirmation timeout and poll interval are positive
/// - At least one export target, each with its connection section
/// - LLM API key is set
/// - At least one image candidate, and a Gemini key when Gemini picks the frame
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.scheduler.max_concurrent_jobs == 0 {
        return Err(invalid("scheduler.max_concurrent_jobs must be at least 1"));
    }

    if config.confirmation.timeout_secs == 0 {
        return Err(invalid("confirmation.timeout_secs must be positive"));
    }
    if config.confirmation.poll_interval_ms == 0 {
        return Err(invalid("confirmation.poll_interval_ms must be positive"));
    }

    if config.export.targets.is_empty() {
        return Err(invalid("export.targets must list at least one target"));
    }
    for target in &config.export.targets {
        match config.export.target_config(*target) {
            None => {
                return Err(ConfigError::ValidationError(format!(
                    "export.targets includes '{}' but [export.{}] is missing",
                    target, target
                )))
            }
            Some(manager) if manager.host.trim().is_empty() => {
                return Err(ConfigError::ValidationError(format!(
                    "export.{}.host cannot be empty",
                    target
                )))
            }
            Some(_) => {}
        }
    }

    if config.llm.api_key.is_empty() {
        return Err(invalid(
            "llm.api_key is required (set it in [llm] or RECIPES_LLM__API_KEY)",
        ));
    }

    if config.images.candidate_count == 0 {
        return Err(invalid("images.candidate_count must be at least 1"));
    }
    if config.images.selector == ImageSelectorKind::Gemini && config.gemini.api_key.is_empty() {
        return Err(invalid(
            "gemini.api_key is required when images.selector = \"gemini\"",
        ));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::ExportTarget;
    use crate::config::RecipeManagerConfig;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.llm.api_key = "sk-test".to_string();
        config.export.tandoor = Some(RecipeManagerConfig {
            host: "http://tandoor.local".to_string(),
            api_key: "token".to_string(),
            timeout_secs: 120,
        });
        config
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = valid_config();
        config.scheduler.max_concurrent_jobs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_confirmation_timeout_fails() {
        let mut config = valid_config();
        config.confirmation.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_target_without_section_fails() {
        let mut config = valid_config();
        config.export.targets.push(ExportTarget::Mealie);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("[export.mealie]"));
    }

    #[test]
    fn test_validate_no_targets_fails() {
        let mut config = valid_config();
        config.export.targets.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_missing_llm_key_fails() {
        let mut config = valid_config();
        config.llm.api_key.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_image_settings() {
        let mut config = valid_config();
        config.images.candidate_count = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.images.selector = ImageSelectorKind::Gemini;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("gemini.api_key"));

        config.gemini.api_key = "g-key".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
