//! Body encoders and content metadata for the one-shot responders.

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";
pub const IMAGE_PNG: &str = "image/png";

/// Whether the rendering surface may cache the delivered content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    #[default]
    Allowed,
    AllowedInMemoryOnly,
    NotAllowed,
}

impl CachePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePolicy::Allowed => "allowed",
            CachePolicy::AllowedInMemoryOnly => "allowed_in_memory_only",
            CachePolicy::NotAllowed => "not_allowed",
        }
    }
}

pub fn json_body<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(value).map(Bytes::from)
}

/// Minimal plain-text error body. Falls back to the status line when `text` is empty.
pub fn error_body(status: StatusCode, text: &str) -> Bytes {
    if !text.is_empty() {
        return Bytes::copy_from_slice(text.as_bytes());
    }
    match status.canonical_reason() {
        Some(reason) => Bytes::from(format!("{} {}", status.as_u16(), reason)),
        None => Bytes::from(status.as_u16().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body_is_compact() {
        assert_eq!(json_body(&json!({"ok": true})).unwrap(), r#"{"ok":true}"#);
    }

    #[test]
    fn test_error_body_fallback() {
        assert_eq!(error_body(StatusCode::NOT_FOUND, "gone"), "gone");
        assert_eq!(error_body(StatusCode::NOT_FOUND, ""), "404 Not Found");
    }

    #[test]
    fn test_cache_policy_serde() {
        let policy: CachePolicy = serde_json::from_str(r#""not_allowed""#).unwrap();
        assert_eq!(policy, CachePolicy::NotAllowed);
        assert_eq!(CachePolicy::default(), CachePolicy::Allowed);
    }
}
