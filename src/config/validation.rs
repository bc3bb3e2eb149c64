use super::models::Config;
use crate::products::ProductRegistry;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be at least 1")]
    ZeroCeiling { field: &'static str },

    #[error("batch.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Invalid portal base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Unknown product section [products.{name}] (available: {available})")]
    UnknownProduct { name: String, available: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_ceilings(config)?;
    validate_portal(config)?;
    validate_products(config)?;
    Ok(())
}

fn validate_ceilings(config: &Config) -> Result<(), ValidationError> {
    if config.polling.max_attempts == 0 {
        return Err(ValidationError::ZeroCeiling {
            field: "polling.max_attempts",
        });
    }

    if config.submission.max_attempts == 0 {
        return Err(ValidationError::ZeroCeiling {
            field: "submission.max_attempts",
        });
    }

    if config.batch.concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }

    Ok(())
}

fn validate_portal(config: &Config) -> Result<(), ValidationError> {
    let url = &config.portal.base_url;
    let parsed = reqwest::Url::parse(url).map_err(|e| ValidationError::InvalidBaseUrl {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidBaseUrl {
            url: url.clone(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    Ok(())
}

fn validate_products(config: &Config) -> Result<(), ValidationError> {
    let registry = ProductRegistry::with_defaults();

    for name in config.products.keys() {
        if !registry.contains(name) {
            return Err(ValidationError::UnknownProduct {
                name: name.clone(),
                available: registry.names().join(", "),
            });
        }
    }

    Ok(())
}
