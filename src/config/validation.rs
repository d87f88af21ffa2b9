use crate::config::types::{
    CarrefourConfig, Config, MercadonaConfig, OutputConfig, ScrapingConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

const MAX_BATCH_SIZE: usize = 10_000;
const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scraping_config(&config.scraping)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    if let Some(mercadona) = &config.mercadona {
        validate_mercadona_config(mercadona)?;
    }
    if let Some(carrefour) = &config.carrefour {
        validate_carrefour_config(carrefour)?;
    }
    Ok(())
}

fn validate_scraping_config(config: &ScrapingConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 || config.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, config.batch_size
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.retry_attempts > MAX_RETRY_ATTEMPTS {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be <= {}, got {}",
            MAX_RETRY_ATTEMPTS, config.retry_attempts
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent name cannot be empty".to_string(),
        ));
    }

    if !config
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "user-agent name must contain only alphanumeric characters and hyphens, got '{}'",
            config.name
        )));
    }

    validate_email(&config.contact_email)
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_mercadona_config(config: &MercadonaConfig) -> Result<(), ConfigError> {
    validate_http_url("mercadona.base-url", &config.base_url)?;
    validate_http_url("mercadona.api-url", &config.api_url)?;

    if config.postal_code.len() != 5 || !config.postal_code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::Validation(format!(
            "mercadona.postal-code must be 5 digits, got '{}'",
            config.postal_code
        )));
    }

    Ok(())
}

fn validate_carrefour_config(config: &CarrefourConfig) -> Result<(), ConfigError> {
    validate_http_url("carrefour.base-url", &config.base_url)?;

    for entry in &config.categories {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "carrefour category name cannot be empty".to_string(),
            ));
        }
        if !entry.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "carrefour category path must start with '/', got '{}'",
                entry.path
            )));
        }
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("{} '{}': {}", field, value, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
