use crate::config::{Mode, TranslatorConfig};
use crate::error::{I18nError, RateLimitError};
use crate::queue::QueueConfig;
use crate::rate_limit_config::RateLimiterConfig;

/// Validates configuration objects before a component is built from them
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a locale code
    pub fn validate_locale(locale: &str) -> Result<(), I18nError> {
        if locale.trim().is_empty() {
            return Err(I18nError::BadConfiguration(
                "Locale code cannot be empty".to_string(),
            ));
        }

        if locale.contains(['/', '\\']) || locale.contains("..") {
            return Err(I18nError::BadConfiguration(format!(
                "Locale code '{}' must not contain path separators",
                locale
            )));
        }

        Ok(())
    }

    /// Validates translator configuration
    pub fn validate_translator(config: &TranslatorConfig) -> Result<(), I18nError> {
        Self::validate_locale(&config.default_locale)?;

        if let Mode::FileBacked { base_path } = &config.mode {
            if base_path.as_os_str().is_empty() {
                return Err(I18nError::BadConfiguration(
                    "base_path is required in file-backed mode".to_string(),
                ));
            }
        }

        for (locale, _) in &config.local_resources {
            Self::validate_locale(locale)?;
        }

        Ok(())
    }

    /// Validates rate limiter configuration
    pub fn validate_rate_limiter(config: &RateLimiterConfig) -> Result<(), RateLimitError> {
        config.validate().map_err(RateLimitError::BadArgument)
    }

    /// Validates task queue configuration
    pub fn validate_queue(config: &QueueConfig) -> Result<(), String> {
        if config.max_pending == Some(0) {
            return Err("max_pending must be greater than 0 when set".to_string());
        }

        Ok(())
    }

    /// Validates a task identifier
    pub fn validate_task_id(id: &str) -> Result<(), String> {
        if id.is_empty() {
            return Err("Task id cannot be empty".to_string());
        }

        Ok(())
    }
}
