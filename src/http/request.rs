//! Conversion of inbound HTTP requests into intercepted requests.
//!
//! # Responsibilities
//! - Reconstruct the absolute URL the rendering surface asked for
//! - Carry method, headers and the buffered body across
//!
//! # Design Decisions
//! - Absolute-form targets (proxy style) are used verbatim, custom schemes included
//! - Origin-form targets take the `Host` header and the configured default scheme

use bytes::Bytes;
use http::header::HOST;
use http::request::Parts;
use http::{HeaderMap, Uri};
use thiserror::Error;
use url::Url;

use crate::request::InterceptedRequest;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request target has no host")]
    MissingHost,

    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub fn to_intercepted(
    parts: &Parts,
    body: Bytes,
    default_scheme: &str,
) -> Result<InterceptedRequest, RequestError> {
    let url = request_url(&parts.uri, &parts.headers, default_scheme)?;
    Ok(InterceptedRequest::new(parts.method.clone(), url)
        .with_headers(parts.headers.clone())
        .with_body(body))
}

pub fn request_url(uri: &Uri, headers: &HeaderMap, default_scheme: &str) -> Result<Url, RequestError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(Url::parse(&uri.to_string())?);
    }

    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())
        .ok_or(RequestError::MissingHost)?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Ok(Url::parse(&format!("{}://{}{}", default_scheme, host, path))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Method, Request};

    #[test]
    fn test_origin_form_uses_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("api.local:8080"));
        let uri: Uri = "/v1/items?page=2".parse().unwrap();

        let url = request_url(&uri, &headers, "http").unwrap();
        assert_eq!(url.as_str(), "http://api.local:8080/v1/items?page=2");
    }

    #[test]
    fn test_absolute_form_keeps_custom_scheme() {
        let uri: Uri = "app://bundle/index.html".parse().unwrap();
        let url = request_url(&uri, &HeaderMap::new(), "http").unwrap();
        assert_eq!(url.scheme(), "app");
        assert_eq!(url.host_str(), Some("bundle"));
        assert_eq!(url.path(), "/index.html");
    }

    #[test]
    fn test_missing_host() {
        let uri: Uri = "/".parse().unwrap();
        assert!(matches!(
            request_url(&uri, &HeaderMap::new(), "http"),
            Err(RequestError::MissingHost)
        ));
    }

    #[test]
    fn test_to_intercepted_carries_body() {
        let (parts, ()) = Request::builder()
            .method(Method::POST)
            .uri("http://api.local/submit")
            .header("x-trace", "abc")
            .body(())
            .unwrap()
            .into_parts();

        let req = to_intercepted(&parts, Bytes::from_static(b"payload"), "http").unwrap();
        assert_eq!(*req.method(), Method::POST);
        assert_eq!(req.header("x-trace"), Some("abc"));
        assert_eq!(req.body().map(|b| b.as_ref()), Some(&b"payload"[..]));

        let empty = to_intercepted(&parts, Bytes::new(), "http").unwrap();
        assert!(empty.body().is_none());
    }
}
