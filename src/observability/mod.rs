//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! registry, engine, sinks, HTTP adapter
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Every event carries the load ID so one load can be followed end to end
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
