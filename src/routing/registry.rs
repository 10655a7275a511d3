//! Rule storage and lookup.
//!
//! # Responsibilities
//! - Store registration entries in insertion order
//! - Assign strictly increasing sequence numbers
//! - Return the first entry whose matcher accepts a request
//!
//! # Design Decisions
//! - Append-only: no unregister, entries are immutable once added
//! - Readers load an `ArcSwap` snapshot and never block on writers
//! - Writers serialize on one mutex so sequence order equals list order
//! - First match wins; a later, more specific rule is never consulted

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use arc_swap::ArcSwap;

use crate::dispatch::handler::Handler;
use crate::error::InterceptError;
use crate::observability::metrics;
use crate::request::InterceptedRequest;
use crate::routing::matcher::Matcher;

/// A matcher paired with its handler.
#[derive(Debug)]
pub struct RuleEntry {
    sequence: u64,
    matcher: Matcher,
    handler: Handler,
}

impl RuleEntry {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// Ordered, append-only rule collection.
pub struct RuleRegistry {
    entries: ArcSwap<Vec<Arc<RuleEntry>>>,
    next_sequence: Mutex<u64>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            next_sequence: Mutex::new(1),
        }
    }

    /// Process-wide registry for hosts that do not inject their own.
    pub fn global() -> &'static Arc<RuleRegistry> {
        static GLOBAL: OnceLock<Arc<RuleRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(RuleRegistry::new()))
    }

    /// Append a rule with an already validated matcher. Returns its sequence number.
    pub fn register(&self, matcher: Matcher, handler: Handler) -> u64 {
        let mut next = self.next_sequence.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = *next;
        *next += 1;

        let kind = matcher.kind();
        let current = self.entries.load();
        let mut updated = Vec::with_capacity(current.len() + 1);
        updated.extend(current.iter().cloned());
        updated.push(Arc::new(RuleEntry {
            sequence,
            matcher,
            handler,
        }));
        let count = updated.len();
        self.entries.store(Arc::new(updated));
        drop(next);

        metrics::record_rule_count(count);
        tracing::debug!(sequence, matcher = kind, "Interception rule registered");
        sequence
    }

    pub fn register_scheme(&self, scheme: &str, handler: Handler) -> Result<(), InterceptError> {
        self.register(Matcher::scheme(scheme)?, handler);
        Ok(())
    }

    pub fn register_host(&self, host: &str, handler: Handler) -> Result<(), InterceptError> {
        self.register(Matcher::host(host)?, handler);
        Ok(())
    }

    pub fn register_host_and_path(
        &self,
        host: &str,
        path: &str,
        handler: Handler,
    ) -> Result<(), InterceptError> {
        self.register(Matcher::host_and_path(host, path)?, handler);
        Ok(())
    }

    pub fn register_host_and_path_prefix(
        &self,
        host: &str,
        prefix: &str,
        handler: Handler,
    ) -> Result<(), InterceptError> {
        self.register(Matcher::host_and_path_prefix(host, prefix)?, handler);
        Ok(())
    }

    /// Regex over the full URL.
    pub fn register_pattern(&self, pattern: &str, handler: Handler) -> Result<(), InterceptError> {
        self.register(Matcher::url_pattern(pattern)?, handler);
        Ok(())
    }

    /// Regex over the URL path only.
    pub fn register_path_pattern(&self, pattern: &str, handler: Handler) -> Result<(), InterceptError> {
        self.register(Matcher::path_pattern(pattern)?, handler);
        Ok(())
    }

    pub fn register_predicate<F>(&self, predicate: F, handler: Handler)
    where
        F: Fn(&InterceptedRequest) -> bool + Send + Sync + 'static,
    {
        self.register(Matcher::predicate(predicate), handler);
    }

    /// The entry with the smallest sequence number whose matcher accepts `req`.
    pub fn first_match(&self, req: &InterceptedRequest) -> Option<Arc<RuleEntry>> {
        self.entries
            .load()
            .iter()
            .find(|entry| entry.matcher.matches(req))
            .cloned()
    }

    /// Current entries in sequence order.
    pub fn snapshot(&self) -> Arc<Vec<Arc<RuleEntry>>> {
        self.entries.load_full()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn noop() -> Handler {
        Handler::new(|_req, _sink| {})
    }

    fn req(url: &str) -> InterceptedRequest {
        InterceptedRequest::get(url).unwrap()
    }

    #[test]
    fn test_sequences_strictly_increase() {
        let registry = RuleRegistry::new();
        let a = registry.register(Matcher::host("a.com").unwrap(), noop());
        let b = registry.register(Matcher::host("b.com").unwrap(), noop());
        let c = registry.register(Matcher::host("c.com").unwrap(), noop());
        assert!(a < b && b < c);

        let seqs: Vec<u64> = registry.snapshot().iter().map(|e| e.sequence()).collect();
        assert_eq!(seqs, vec![a, b, c]);
    }

    #[test]
    fn test_first_match_wins() {
        let registry = RuleRegistry::new();
        registry.register_host("api.example.com", noop()).unwrap();
        registry
            .register_host_and_path("api.example.com", "/ping", noop())
            .unwrap();

        let entry = registry.first_match(&req("https://api.example.com/ping")).unwrap();
        assert_eq!(entry.matcher().kind(), "host");
        assert_eq!(entry.sequence(), 1);
    }

    #[test]
    fn test_no_match() {
        let registry = RuleRegistry::new();
        assert!(registry.is_empty());
        registry.register_scheme("myapp", noop()).unwrap();
        assert!(registry.first_match(&req("https://example.com/")).is_none());
    }

    #[test]
    fn test_unrelated_append_does_not_change_outcome() {
        let registry = RuleRegistry::new();
        registry.register_host_and_path_prefix("example.com", "/api", noop()).unwrap();
        let r = req("https://example.com/api/users");
        let before = registry.first_match(&r).map(|e| e.sequence());

        registry.register_host("other.com", noop()).unwrap();
        registry.register_path_pattern(r"^/static/", noop()).unwrap();
        let after = registry.first_match(&r).map(|e| e.sequence());
        assert_eq!(before, after);
    }

    #[test]
    fn test_rejected_rule_is_not_added() {
        let registry = RuleRegistry::new();
        assert!(registry.register_pattern("(unclosed", noop()).is_err());
        assert!(registry.register_host("", noop()).is_err());
        assert_eq!(registry.len(), 0);

        // A rejected rule does not consume a sequence number.
        let seq = registry.register(Matcher::scheme("app").unwrap(), noop());
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_concurrent_registration_and_lookup() {
        let registry = Arc::new(RuleRegistry::new());
        let mut workers = Vec::new();
        for t in 0..4 {
            let registry = registry.clone();
            workers.push(thread::spawn(move || {
                for i in 0..50 {
                    registry
                        .register_host(&format!("h{}-{}.com", t, i), noop())
                        .unwrap();
                    let _ = registry.first_match(&req("https://h0-0.com/"));
                }
            }));
        }
        for w in workers {
            w.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 200);
        assert!(snapshot.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
        assert!(registry.first_match(&req("https://h3-49.com/")).is_some());
    }
}
