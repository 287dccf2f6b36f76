//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, intervals > 0)
//! - Check that bind addresses parse
//! - Detect duplicate component names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("app.stop_timeout_secs must be greater than zero")]
    ZeroStopTimeout,

    #[error("{section}.name must not be empty")]
    EmptyName { section: &'static str },

    #[error("component name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("{section}.bind_address '{address}' is not a valid socket address")]
    InvalidAddress {
        section: &'static str,
        address: String,
    },

    #[error("{section}.{field} must be greater than zero")]
    Zero {
        section: &'static str,
        field: &'static str,
    },
}

/// Check the configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.app.stop_timeout_secs == 0 {
        errors.push(ValidationError::ZeroStopTimeout);
    }

    let mut names = HashSet::new();
    let mut check_name = |section: &'static str, name: &str, errors: &mut Vec<ValidationError>| {
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyName { section });
        } else if !names.insert(name.to_string()) {
            errors.push(ValidationError::DuplicateName(name.to_string()));
        }
    };

    if config.http.enabled {
        check_name("http", &config.http.name, &mut errors);
        check_address("http", &config.http.bind_address, &mut errors);
        if config.http.request_timeout_secs == 0 {
            errors.push(ValidationError::Zero {
                section: "http",
                field: "request_timeout_secs",
            });
        }
    }

    if config.rpc.enabled {
        check_name("rpc", &config.rpc.name, &mut errors);
        check_address("rpc", &config.rpc.bind_address, &mut errors);
        if config.rpc.max_connections == 0 {
            errors.push(ValidationError::Zero {
                section: "rpc",
                field: "max_connections",
            });
        }
    }

    if config.worker.enabled {
        check_name("worker", &config.worker.name, &mut errors);
        if config.worker.interval_ms == 0 {
            errors.push(ValidationError::Zero {
                section: "worker",
                field: "interval_ms",
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(section: &'static str, address: &str, errors: &mut Vec<ValidationError>) {
    if address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            section,
            address: address.to_string(),
        });
    }
}
