//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the interceptor.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sink::CachePolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InterceptorConfig {
    /// HTTP front end settings.
    pub listener: ListenerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Static interception rules, in match-priority order.
    pub rules: Vec<RuleConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Scheme assumed for origin-form requests that carry only a path.
    pub default_scheme: String,

    /// Forward unmatched requests to their origin instead of answering 404.
    pub passthrough: bool,

    /// How long to wait for a handler to commit the response head.
    pub response_timeout_secs: u64,

    /// Largest request body buffered for handlers, in bytes.
    pub max_request_body: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            default_scheme: "http".to_string(),
            passthrough: false,
            response_timeout_secs: 30,
            max_request_body: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A rule answered with a fixed response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Rule identifier for logging.
    pub name: String,

    pub matcher: MatcherConfig,

    #[serde(default)]
    pub response: StaticResponseConfig,
}

/// Declarative matcher. Predicates cannot be expressed in a file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatcherConfig {
    Scheme { scheme: String },
    Host { host: String },
    HostAndPath { host: String, path: String },
    HostAndPathPrefix { host: String, prefix: String },
    PathPattern { pattern: String },
    UrlPattern { pattern: String },
}

/// Fixed response body and head.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticResponseConfig {
    pub status: u16,
    pub mime_type: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    pub cache_policy: CachePolicy,
}

impl Default for StaticResponseConfig {
    fn default() -> Self {
        Self {
            status: 200,
            mime_type: "text/plain; charset=utf-8".to_string(),
            body: String::new(),
            headers: BTreeMap::new(),
            cache_policy: CachePolicy::Allowed,
        }
    }
}
