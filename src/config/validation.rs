//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses parse and rule names are unique
//! - Compile every rule matcher exactly as registration would
//! - Check status codes and header names/values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: InterceptorConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use http::{HeaderName, HeaderValue, StatusCode};
use thiserror::Error;

use crate::config::schema::{InterceptorConfig, RuleConfig};
use crate::error::InterceptError;
use crate::routing::Matcher;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address `{value}`")]
    InvalidAddress { field: &'static str, value: String },

    #[error("listener.default_scheme must not be empty")]
    EmptyScheme,

    #[error("rules[{index}]: name must not be empty")]
    EmptyRuleName { index: usize },

    #[error("rule `{0}` is defined more than once")]
    DuplicateRule(String),

    #[error("rule `{rule}`: {source}")]
    InvalidMatcher {
        rule: String,
        #[source]
        source: InterceptError,
    },

    #[error("rule `{rule}`: invalid status code {status}")]
    InvalidStatus { rule: String, status: u16 },

    #[error("rule `{rule}`: invalid header `{header}`")]
    InvalidHeader { rule: String, header: String },
}

pub fn validate_config(config: &InterceptorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.listener.default_scheme.trim().is_empty() {
        errors.push(ValidationError::EmptyScheme);
    }

    let mut names = HashSet::new();
    for (index, rule) in config.rules.iter().enumerate() {
        if rule.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRuleName { index });
        } else if !names.insert(rule.name.as_str()) {
            errors.push(ValidationError::DuplicateRule(rule.name.clone()));
        }
        validate_rule(&mut errors, rule);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_rule(errors: &mut Vec<ValidationError>, rule: &RuleConfig) {
    if let Err(source) = Matcher::try_from(&rule.matcher) {
        errors.push(ValidationError::InvalidMatcher {
            rule: rule.name.clone(),
            source,
        });
    }

    let status = rule.response.status;
    if StatusCode::from_u16(status).is_err() {
        errors.push(ValidationError::InvalidStatus {
            rule: rule.name.clone(),
            status,
        });
    }

    let headers = rule
        .response
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(std::iter::once(("content-type", rule.response.mime_type.as_str())));
    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::InvalidHeader {
                rule: rule.name.clone(),
                header: name.to_string(),
            });
        }
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
