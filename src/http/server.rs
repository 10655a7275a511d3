//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with a single catch-all handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Offer every request to the dispatch engine
//! - Forward unhandled requests upstream when passthrough is enabled
//! - Bind server to listener and shut down on Ctrl+C

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use http::request::Parts;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::config::ListenerConfig;
use crate::dispatch::{DispatchEngine, Outcome};
use crate::hook::{ChannelHook, LoadId};
use crate::http::{request, response};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DispatchEngine>,
    pub client: Client<HttpConnector, Body>,
    pub listener: ListenerConfig,
}

/// HTTP front end for the interceptor.
pub struct HttpServer {
    router: Router,
    config: ListenerConfig,
}

impl HttpServer {
    pub fn new(config: ListenerConfig, engine: Arc<DispatchEngine>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            engine,
            client,
            listener: config.clone(),
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// A handler that has not committed a head within the response timeout
    /// gets 504; dropping the pending future cancels its load.
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(intercept_handler))
            .route("/", any(intercept_handler))
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                Duration::from_secs(config.response_timeout_secs),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The configured router, for serving or driving in-process.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            passthrough = self.config.passthrough,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }
}

/// Catch-all handler: intercept, otherwise pass through or 404.
async fn intercept_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let request_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let body = match axum::body::to_bytes(body, state.listener.max_request_body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let intercepted = match request::to_intercepted(&parts, body.clone(), &state.listener.default_scheme) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(request_id = %request_id, uri = %parts.uri, error = %e, "Unroutable request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let url = intercepted.url().clone();

    let (hook, events) = ChannelHook::new();
    let load = hook.into_handle(LoadId::new());
    let load_id = load.id();
    tracing::debug!(
        request_id = %request_id,
        load_id = %load_id,
        method = %parts.method,
        url = %url,
        "Offering request to interceptor"
    );

    match state.engine.notify_request_started(intercepted, load) {
        Outcome::Handled(sink) => {
            // Only the handler may keep the sink alive.
            drop(sink);
            response::stream_load(state.engine.clone(), load_id, events).await
        }
        Outcome::Unhandled => forward(&state, parts, body, &url, &request_id).await,
    }
}

async fn forward(state: &AppState, parts: Parts, body: Bytes, url: &Url, request_id: &str) -> Response {
    if !state.listener.passthrough {
        return (StatusCode::NOT_FOUND, "No interception rule matched").into_response();
    }
    if url.scheme() != "http" {
        tracing::warn!(request_id = %request_id, url = %url, "Passthrough supports plain HTTP only");
        return (StatusCode::BAD_GATEWAY, "Cannot forward this scheme").into_response();
    }

    let uri: Uri = match url.as_str().parse() {
        Ok(uri) => uri,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid upstream URL").into_response(),
    };

    let mut req = Request::builder().method(parts.method).uri(uri);
    if let Some(headers) = req.headers_mut() {
        for (k, v) in parts.headers.iter() {
            if *k != header::CONNECTION && k.as_str() != "proxy-connection" {
                headers.append(k.clone(), v.clone());
            }
        }
    }
    let req = match req.body(Body::from(body)) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    match state.client.request(req).await {
        Ok(response) => {
            tracing::debug!(request_id = %request_id, url = %url, status = %response.status(), "Forwarded request");
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, url = %url, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
