//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeConfig → Result<(), Vec<ValidationError>>
//! - Runs after CLI/env overrides are applied

use thiserror::Error;

use crate::config::schema::RuntimeConfig;
use crate::net::Network;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("health.addr must not be empty")]
    EmptyHealthAddr,
    #[error("health.addr {0:?} must be host:port")]
    HealthAddrWithoutPort(String),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("observability.otlp_endpoint {0:?} must be host:port")]
    InvalidOtlpEndpoint(String),
}

pub fn validate_config(config: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let addr = &config.health.addr;
    if addr.is_empty() {
        errors.push(ValidationError::EmptyHealthAddr);
    } else if config.health.network != Network::Unix && !has_port(addr) {
        errors.push(ValidationError::HealthAddrWithoutPort(addr.clone()));
    }

    let timeouts = [
        ("server.read_timeout_secs", config.server.read_timeout_secs),
        ("server.write_timeout_secs", config.server.write_timeout_secs),
        ("server.shutdown_grace_secs", config.server.shutdown_grace_secs),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(field));
        }
    }

    if !has_port(&config.observability.otlp_endpoint) {
        errors.push(ValidationError::InvalidOtlpEndpoint(
            config.observability.otlp_endpoint.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn has_port(addr: &str) -> bool {
    addr.rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok())
}
