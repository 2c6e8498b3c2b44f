//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs after flags are overlaid, before anything is bound

use std::fmt;
use std::net::SocketAddr;

use crate::components::auth::PROVIDERS;
use crate::config::schema::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn non_empty(errors: &mut Vec<ValidationError>, field: &'static str, value: &Option<String>) {
    if matches!(value, Some(v) if v.trim().is_empty()) {
        errors.push(ValidationError::new(field, "must not be empty"));
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    non_empty(&mut errors, "server.name", &config.server.name);
    non_empty(&mut errors, "server.id", &config.server.id);
    non_empty(&mut errors, "server.version", &config.server.version);
    non_empty(&mut errors, "auth.namespace", &config.auth.namespace);
    non_empty(&mut errors, "store.database", &config.store.database);
    non_empty(&mut errors, "store.table", &config.store.table);

    if let Some(address) = &config.server.address {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "server.address",
                format!("invalid socket address {address:?}"),
            ));
        }
    }

    if let Some(provider) = &config.auth.provider {
        if !PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "auth.provider",
                format!("unknown provider {provider:?}, expected one of {PROVIDERS:?}"),
            ));
        }
    }

    if config.auth.token_expiry_secs == Some(0) {
        errors.push(ValidationError::new("auth.token_expiry_secs", "must be greater than 0"));
    }

    if let Some(endpoints) = &config.auth.public_endpoints {
        for endpoint in endpoints.iter().filter(|e| !e.contains('.')) {
            errors.push(ValidationError::new(
                "auth.public_endpoints",
                format!("{endpoint:?} is not of the form Handler.Method"),
            ));
        }
    }

    if config.client.timeout_secs == Some(0) {
        errors.push(ValidationError::new("client.timeout_secs", "must be greater than 0"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
