use super::models::Config;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid print service URL '{url}': {reason}")]
    InvalidServiceUrl { url: String, reason: String },

    #[error("'{field}' must not be empty")]
    EmptyField { field: &'static str },

    #[error("Polling interval must be positive")]
    ZeroPollInterval,

    #[error("Polling timeout ({timeout}) is shorter than the polling interval ({interval})")]
    TimeoutShorterThanInterval { timeout: String, interval: String },

    #[error("{field} must be a positive number, got {value}")]
    NonPositive { field: &'static str, value: f64 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_service(config)?;
    validate_polling(config)?;
    validate_print(config)?;
    Ok(())
}

fn validate_service(config: &Config) -> Result<(), ValidationError> {
    let service = &config.service;

    let url = Url::parse(&service.url).map_err(|e| ValidationError::InvalidServiceUrl {
        url: service.url.clone(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::InvalidServiceUrl {
            url: service.url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if service.layout.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "service.layout" });
    }
    if service.format.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "service.format" });
    }
    if service.token_param.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: "service.token_param",
        });
    }

    Ok(())
}

/// The deadline must leave room for at least one status request
fn validate_polling(config: &Config) -> Result<(), ValidationError> {
    let polling = &config.polling;

    if polling.interval.as_duration().is_zero() {
        return Err(ValidationError::ZeroPollInterval);
    }

    if polling.timeout < polling.interval {
        return Err(ValidationError::TimeoutShorterThanInterval {
            timeout: polling.timeout.to_string(),
            interval: polling.interval.to_string(),
        });
    }

    Ok(())
}

fn validate_print(config: &Config) -> Result<(), ValidationError> {
    positive("page.width", config.page.width)?;
    positive("page.height", config.page.height)?;
    positive("print.scale", config.print.scale)?;
    positive("print.dpi", config.print.dpi as f64)?;
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NonPositive { field, value })
    }
}
