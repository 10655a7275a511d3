//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → InterceptorConfig (validated, immutable)
//!     → rules.rs installs [[rules]] into a RuleRegistry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only declarative matchers are configurable; predicates are code-only

pub mod loader;
pub mod rules;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use rules::install_rules;
pub use validation::{validate_config, ValidationError};
pub use schema::{InterceptorConfig, ListenerConfig, LogFormat, ObservabilityConfig, RuleConfig};
