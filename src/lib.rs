//! In-process request interception for an embedded rendering surface.
//!
//! Rules pair a [`Matcher`] with a [`Handler`]; the [`DispatchEngine`] offers
//! every load to the rules in registration order and hands the first match a
//! [`ResponseSink`] through which the response head and body are delivered
//! back to the host's [`LoadingHook`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hook;
pub mod http;
pub mod observability;
pub mod request;
pub mod routing;
pub mod sink;

pub use config::schema::InterceptorConfig;
pub use dispatch::{DispatchEngine, Handler, Outcome};
pub use error::{InterceptError, SinkError};
pub use hook::{ChannelHook, FailureKind, LoadEvent, LoadHandle, LoadId, LoadingHook, ResponseHead};
pub use crate::http::HttpServer;
pub use request::InterceptedRequest;
pub use routing::{Matcher, RuleRegistry};
pub use sink::{CachePolicy, ResponseSink, SinkState, UpstreamMetadata};
