//! Intercepted request model.
//!
//! # Responsibilities
//! - Carry the method, URL, headers and optional body of a captured load
//! - Expose the URL components matchers look at (scheme, host, path, query)
//!
//! # Design Decisions
//! - Immutable once built; handlers receive it behind an `Arc`
//! - Headers use `http::HeaderMap`, so lookups are case-insensitive

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

/// A request captured by the loading hook.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl InterceptedRequest {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Parse `url` and build a `GET` request for it.
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append a single header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach a body. Empty bodies are stored as `None`.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}
