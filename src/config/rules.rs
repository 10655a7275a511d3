//! Installation of file-declared rules.
//!
//! # Responsibilities
//! - Compile each `MatcherConfig` into a [`Matcher`]
//! - Build a handler that answers with the configured static response
//! - Append rules to a registry in file order
//!
//! # Design Decisions
//! - Rule order in the file is match priority, the same as programmatic registration
//! - Header values are parsed once at install time, not per request

use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;

use crate::config::schema::{MatcherConfig, RuleConfig, StaticResponseConfig};
use crate::dispatch::Handler;
use crate::error::InterceptError;
use crate::routing::{Matcher, RuleRegistry};

impl TryFrom<&MatcherConfig> for Matcher {
    type Error = InterceptError;

    fn try_from(config: &MatcherConfig) -> Result<Self, Self::Error> {
        match config {
            MatcherConfig::Scheme { scheme } => Matcher::scheme(scheme),
            MatcherConfig::Host { host } => Matcher::host(host),
            MatcherConfig::HostAndPath { host, path } => Matcher::host_and_path(host, path),
            MatcherConfig::HostAndPathPrefix { host, prefix } => {
                Matcher::host_and_path_prefix(host, prefix)
            }
            MatcherConfig::PathPattern { pattern } => Matcher::path_pattern(pattern),
            MatcherConfig::UrlPattern { pattern } => Matcher::url_pattern(pattern),
        }
    }
}

/// Handler that answers every request with `response`.
pub fn static_responder(name: &str, response: &StaticResponseConfig) -> Result<Handler, InterceptError> {
    let status = StatusCode::from_u16(response.status)
        .map_err(|_| InterceptError::InvalidRule(format!("invalid status code {}", response.status)))?;
    let rule = Arc::<str>::from(name);
    let body = Bytes::from(response.body.clone());
    let mime_type = Arc::<str>::from(response.mime_type.as_str());
    let headers: Arc<[(String, String)]> = response
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let cache_policy = response.cache_policy;

    Ok(Handler::new(move |_request, sink| {
        let result = sink
            .set_headers(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .and_then(|()| sink.set_cache_policy(cache_policy))
            .and_then(|()| sink.respond_with_data_status(body.clone(), &mime_type, status));
        if let Err(e) = result {
            tracing::warn!(rule = %rule, load_id = %sink.load_id(), error = %e, "Static response failed");
        }
    }))
}

/// Append `rules` to `registry` in order. Returns the number installed.
///
/// Stops at the first rule that fails to compile; earlier rules stay registered.
pub fn install_rules(registry: &RuleRegistry, rules: &[RuleConfig]) -> Result<usize, InterceptError> {
    for rule in rules {
        let matcher = Matcher::try_from(&rule.matcher)?;
        let handler = static_responder(&rule.name, &rule.response)?;
        let sequence = registry.register(matcher, handler);
        tracing::info!(rule = %rule.name, sequence, "Installed configured rule");
    }
    Ok(rules.len())
}
