//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → request.rs (absolute URL, headers, buffered body)
//!     → DispatchEngine::notify_request_started
//!         Handled   → response.rs (head, then streamed chunks)
//!         Unhandled → passthrough client or 404
//!     → Send to client
//!
//! client disconnect → response.rs drops the body → notify_load_cancelled
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer, X_REQUEST_ID};
