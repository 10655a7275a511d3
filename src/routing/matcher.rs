//! Request matching logic.
//!
//! # Responsibilities
//! - Match scheme (case-insensitive)
//! - Match host (exact, case-insensitive)
//! - Match host plus exact path, or host plus path prefix (path case-sensitive)
//! - Match a regular expression against the path or the full URL
//! - Match an arbitrary caller-supplied predicate
//!
//! # Design Decisions
//! - Closed enum: every matcher kind is known and testable by variant
//! - Validation happens in the constructors, never at match time
//! - Matching is pure; evaluating twice yields the same answer

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::InterceptError;
use crate::request::InterceptedRequest;

type PredicateFn = dyn Fn(&InterceptedRequest) -> bool + Send + Sync;

/// Caller-supplied request predicate.
#[derive(Clone)]
pub struct Predicate(Arc<PredicateFn>);

impl Predicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&InterceptedRequest) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    fn eval(&self, req: &InterceptedRequest) -> bool {
        (self.0)(req)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// A condition deciding whether a rule applies to a request.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// URL scheme equals (stored lowercase).
    Scheme(String),
    /// URL host equals (stored lowercase).
    Host(String),
    /// Host equals and path equals exactly.
    HostAndPath { host: String, path: String },
    /// Host equals and path starts with the prefix.
    HostAndPathPrefix { host: String, prefix: String },
    /// Regex searched in the URL path.
    PathPattern(Regex),
    /// Regex searched in the full serialized URL.
    UrlPattern(Regex),
    /// Opaque predicate.
    Predicate(Predicate),
}

impl Matcher {
    pub fn scheme(scheme: &str) -> Result<Self, InterceptError> {
        let scheme = scheme.trim().trim_end_matches("://").trim_end_matches(':');
        if scheme.is_empty() {
            return Err(InterceptError::InvalidRule("scheme must not be empty".into()));
        }
        let valid = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid {
            return Err(InterceptError::InvalidRule(format!(
                "`{}` is not a valid URL scheme",
                scheme
            )));
        }
        Ok(Matcher::Scheme(scheme.to_ascii_lowercase()))
    }

    pub fn host(host: &str) -> Result<Self, InterceptError> {
        Ok(Matcher::Host(normalize_host(host)?))
    }

    pub fn host_and_path(host: &str, path: &str) -> Result<Self, InterceptError> {
        Ok(Matcher::HostAndPath {
            host: normalize_host(host)?,
            path: validate_path(path)?,
        })
    }

    pub fn host_and_path_prefix(host: &str, prefix: &str) -> Result<Self, InterceptError> {
        Ok(Matcher::HostAndPathPrefix {
            host: normalize_host(host)?,
            prefix: validate_path(prefix)?,
        })
    }

    /// Regex over the URL path. Compiled now so a bad pattern is rejected up front.
    pub fn path_pattern(pattern: &str) -> Result<Self, InterceptError> {
        Ok(Matcher::PathPattern(compile(pattern)?))
    }

    /// Regex over the full URL, e.g. `^https?://cdn\.example\.com/.*\.png$`.
    pub fn url_pattern(pattern: &str) -> Result<Self, InterceptError> {
        Ok(Matcher::UrlPattern(compile(pattern)?))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&InterceptedRequest) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(Predicate::new(f))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Matcher::Scheme(_) => "scheme",
            Matcher::Host(_) => "host",
            Matcher::HostAndPath { .. } => "host_and_path",
            Matcher::HostAndPathPrefix { .. } => "host_and_path_prefix",
            Matcher::PathPattern(_) => "path_pattern",
            Matcher::UrlPattern(_) => "url_pattern",
            Matcher::Predicate(_) => "predicate",
        }
    }

    /// Returns true if the request satisfies this matcher.
    pub fn matches(&self, req: &InterceptedRequest) -> bool {
        match self {
            Matcher::Scheme(scheme) => req.scheme().eq_ignore_ascii_case(scheme),
            Matcher::Host(host) => host_eq(req, host),
            Matcher::HostAndPath { host, path } => host_eq(req, host) && req.path() == path,
            Matcher::HostAndPathPrefix { host, prefix } => {
                host_eq(req, host) && req.path().starts_with(prefix.as_str())
            }
            Matcher::PathPattern(re) => re.is_match(req.path()),
            Matcher::UrlPattern(re) => re.is_match(req.url().as_str()),
            Matcher::Predicate(p) => p.eval(req),
        }
    }
}

fn host_eq(req: &InterceptedRequest, expected: &str) -> bool {
    req.host()
        .map(|h| h.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn normalize_host(host: &str) -> Result<String, InterceptError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(InterceptError::InvalidRule("host must not be empty".into()));
    }
    if host.contains(['/', '?', '#', ' ']) {
        return Err(InterceptError::InvalidRule(format!(
            "`{}` is not a bare host name",
            host
        )));
    }
    // Requests are compared on host alone, so a port could never match.
    let ipv6_literal = host.starts_with('[') && host.ends_with(']');
    if host.contains(':') && !ipv6_literal {
        return Err(InterceptError::InvalidRule(format!(
            "host `{}` must not carry a port",
            host
        )));
    }
    Ok(host.to_ascii_lowercase())
}

fn validate_path(path: &str) -> Result<String, InterceptError> {
    if !path.starts_with('/') {
        return Err(InterceptError::InvalidRule(format!(
            "path `{}` must start with `/`",
            path
        )));
    }
    Ok(path.to_string())
}

fn compile(pattern: &str) -> Result<Regex, InterceptError> {
    Regex::new(pattern).map_err(|source| InterceptError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(url: &str) -> InterceptedRequest {
        InterceptedRequest::get(url).unwrap()
    }

    #[test]
    fn test_scheme_matcher() {
        let matcher = Matcher::scheme("myapp").unwrap();
        assert!(matcher.matches(&req("myapp://assets/logo.png")));
        assert!(matcher.matches(&req("MYAPP://assets/logo.png")));
        assert!(!matcher.matches(&req("https://assets/logo.png")));

        // Trailing separators are tolerated.
        let matcher = Matcher::scheme("https://").unwrap();
        assert!(matcher.matches(&req("https://example.com/")));
    }

    #[test]
    fn test_host_matcher() {
        let matcher = Matcher::host("Example.COM").unwrap();
        assert!(matcher.matches(&req("https://example.com/anything")));
        assert!(matcher.matches(&req("http://EXAMPLE.com"))); // Case insensitive
        assert!(!matcher.matches(&req("https://other.com/")));
        assert!(!matcher.matches(&req("https://sub.example.com/")));
    }

    #[test]
    fn test_host_and_path_matcher() {
        let matcher = Matcher::host_and_path("api.example.com", "/ping").unwrap();
        assert!(matcher.matches(&req("https://api.example.com/ping")));
        assert!(matcher.matches(&req("https://api.example.com/ping?x=1")));
        assert!(!matcher.matches(&req("https://api.example.com/ping/more")));
        assert!(!matcher.matches(&req("https://api.example.com/PING"))); // Path is case sensitive
        assert!(!matcher.matches(&req("https://web.example.com/ping")));
    }

    #[test]
    fn test_path_prefix_matcher() {
        let matcher = Matcher::host_and_path_prefix("example.com", "/api").unwrap();
        assert!(matcher.matches(&req("http://example.com/api/v1")));
        assert!(matcher.matches(&req("http://example.com/api")));
        assert!(!matcher.matches(&req("http://example.com/images")));
        assert!(!matcher.matches(&req("http://other.com/api/v1")));
    }

    #[test]
    fn test_pattern_matchers() {
        let path = Matcher::path_pattern(r"\.png$").unwrap();
        assert!(path.matches(&req("https://cdn.example.com/img/a.png")));
        assert!(path.matches(&req("https://cdn.example.com/img/a.png?size=2"))); // Query is not part of the path
        assert!(!path.matches(&req("https://cdn.example.com/img/a.jpg")));

        let url = Matcher::url_pattern(r"^https://cdn\.example\.com/").unwrap();
        assert!(url.matches(&req("https://cdn.example.com/img/a.png")));
        assert!(!url.matches(&req("http://cdn.example.com/img/a.png")));
    }

    #[test]
    fn test_predicate_matcher() {
        let matcher = Matcher::predicate(|r| r.query().map_or(false, |q| q.contains("mock=1")));
        assert!(matcher.matches(&req("https://example.com/?mock=1")));
        assert!(!matcher.matches(&req("https://example.com/")));
        assert_eq!(matcher.kind(), "predicate");
    }

    #[test]
    fn test_invalid_rules_rejected() {
        assert!(matches!(Matcher::host(""), Err(InterceptError::InvalidRule(_))));
        assert!(matches!(
            Matcher::host("example.com/path"),
            Err(InterceptError::InvalidRule(_))
        ));
        assert!(matches!(Matcher::scheme(" "), Err(InterceptError::InvalidRule(_))));
        assert!(matches!(Matcher::scheme("1http"), Err(InterceptError::InvalidRule(_))));
        assert!(matches!(
            Matcher::host_and_path("example.com", "ping"),
            Err(InterceptError::InvalidRule(_))
        ));
    }

    #[test]
    fn test_host_with_port_rejected() {
        assert!(matches!(
            Matcher::host("api.local:8080"),
            Err(InterceptError::InvalidRule(_))
        ));
        assert!(matches!(
            Matcher::host_and_path_prefix("[::1]:3000", "/api"),
            Err(InterceptError::InvalidRule(_))
        ));

        // Port in the request is ignored; the bare host still matches.
        let matcher = Matcher::host("api.local").unwrap();
        assert!(matcher.matches(&req("http://api.local:8080/v1")));
    }

    #[test]
    fn test_ipv6_literal_host() {
        let matcher = Matcher::host("[::1]").unwrap();
        assert!(matcher.matches(&req("http://[::1]:8080/")));
        assert!(!matcher.matches(&req("http://127.0.0.1:8080/")));
    }

    #[test]
    fn test_invalid_pattern_rejected_at_construction() {
        let err = Matcher::path_pattern("([unclosed").unwrap_err();
        assert!(matches!(err, InterceptError::InvalidPattern { .. }));
        assert!(Matcher::url_pattern("*bad").is_err());
    }

    #[test]
    fn test_matching_is_repeatable() {
        let matcher = Matcher::host_and_path_prefix("example.com", "/a").unwrap();
        let r = req("https://example.com/a/b");
        assert_eq!(matcher.matches(&r), matcher.matches(&r));
    }
}
