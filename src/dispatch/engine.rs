//! Dispatch engine.
//!
//! # Responsibilities
//! - Look up the first matching rule for an intercepted request
//! - Create the response sink bound to the request and its load
//! - Invoke the rule's handler and return without waiting for the response
//! - Route host cancellation to the bound sink
//!
//! # Design Decisions
//! - No I/O and no blocking; the handler decides where its work runs
//! - `Unhandled` is a normal outcome meaning "let the real network serve it"
//! - The sink is bound for cancellation before the handler runs, so a
//!   cancellation racing a synchronous handler is never lost

use std::sync::Arc;

use crate::dispatch::bridge::CancellationBridge;
use crate::hook::{LoadHandle, LoadId};
use crate::observability::metrics;
use crate::request::InterceptedRequest;
use crate::routing::RuleRegistry;
use crate::sink::ResponseSink;

/// Result of offering a request to the engine.
#[derive(Debug)]
pub enum Outcome {
    /// A rule matched; the handler now owns the response.
    Handled(ResponseSink),
    /// No rule matched.
    Unhandled,
}

impl Outcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, Outcome::Handled(_))
    }

    pub fn sink(&self) -> Option<&ResponseSink> {
        match self {
            Outcome::Handled(sink) => Some(sink),
            Outcome::Unhandled => None,
        }
    }
}

pub struct DispatchEngine {
    registry: Arc<RuleRegistry>,
    bridge: CancellationBridge,
}

impl DispatchEngine {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self {
            registry,
            bridge: CancellationBridge::new(),
        }
    }

    /// Engine over the process-wide registry.
    pub fn global() -> Self {
        Self::new(RuleRegistry::global().clone())
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Offer `request` to the registered rules.
    pub fn intercept(
        &self,
        request: impl Into<Arc<InterceptedRequest>>,
        load: LoadHandle,
    ) -> Outcome {
        let request = request.into();
        let load_id = load.id();

        let Some(entry) = self.registry.first_match(&request) else {
            tracing::debug!(load_id = %load_id, url = %request.url(), "No interception rule matched");
            metrics::record_intercept("unhandled");
            return Outcome::Unhandled;
        };

        tracing::debug!(
            load_id = %load_id,
            url = %request.url(),
            sequence = entry.sequence(),
            matcher = entry.matcher().kind(),
            "Request intercepted"
        );
        metrics::record_intercept("handled");

        let sink = ResponseSink::new(request.clone(), load);
        self.bridge.bind(&sink);
        entry.handler().invoke(request, sink.clone());
        Outcome::Handled(sink)
    }

    /// Inbound hook entry point for a new load.
    pub fn notify_request_started(
        &self,
        request: impl Into<Arc<InterceptedRequest>>,
        load: LoadHandle,
    ) -> Outcome {
        self.intercept(request, load)
    }

    /// Inbound hook entry point for an aborted load. Safe to call any number of times.
    pub fn notify_load_cancelled(&self, id: LoadId) -> bool {
        self.bridge.cancel(id)
    }

    /// Loads whose sink is still open.
    pub fn in_flight(&self) -> usize {
        self.bridge.in_flight()
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("rules", &self.registry.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
