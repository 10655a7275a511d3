//! Shared utilities for integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::mpsc::UnboundedReceiver;

use webview_proxy::config::ListenerConfig;
use webview_proxy::{
    ChannelHook, DispatchEngine, HttpServer, InterceptedRequest, LoadEvent, LoadHandle, LoadId,
    RuleRegistry,
};

/// A fresh load backed by a channel hook.
#[allow(dead_code)]
pub fn new_load() -> (LoadHandle, UnboundedReceiver<LoadEvent>) {
    let (hook, rx) = ChannelHook::new();
    (hook.into_handle(LoadId::new()), rx)
}

#[allow(dead_code)]
pub fn get(url: &str) -> InterceptedRequest {
    InterceptedRequest::get(url).unwrap()
}

/// Everything delivered so far, without waiting.
#[allow(dead_code)]
pub fn drain(rx: &mut UnboundedReceiver<LoadEvent>) -> Vec<LoadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the next delivery, failing the test if nothing arrives in time.
#[allow(dead_code)]
pub async fn next_event(rx: &mut UnboundedReceiver<LoadEvent>) -> Option<LoadEvent> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a load event")
}

/// Collect deliveries until the hook side closes.
#[allow(dead_code)]
pub async fn collect(rx: &mut UnboundedReceiver<LoadEvent>) -> Vec<LoadEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(rx).await {
        events.push(event);
    }
    events
}

/// Router over `registry` with test-friendly listener settings.
#[allow(dead_code)]
pub fn router(registry: Arc<RuleRegistry>, passthrough: bool) -> (Router, Arc<DispatchEngine>) {
    let config = ListenerConfig {
        passthrough,
        response_timeout_secs: 5,
        ..ListenerConfig::default()
    };
    router_with(registry, config)
}

/// Router over `registry` with explicit listener settings.
#[allow(dead_code)]
pub fn router_with(registry: Arc<RuleRegistry>, config: ListenerConfig) -> (Router, Arc<DispatchEngine>) {
    let engine = Arc::new(DispatchEngine::new(registry));
    (HttpServer::new(config, engine.clone()).into_router(), engine)
}

/// Start a mock origin that answers every connection with a fixed body.
#[allow(dead_code)]
pub async fn start_mock_origin(response: &'static str) -> std::net::SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}
