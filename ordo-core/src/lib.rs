//! # Ordo Core
//!
//! Core functionality for the ordo sequenced WebAPI acceptance testing engine.
//!
//! This crate provides the building blocks for ordo, including:
//! - Immutable request construction with `{name}` placeholders
//! - Response matching against declarative assertions
//! - Expansion of parameterized scenario templates
//! - The sequencer running scenarios in order with a per-run variable store
//! - Configuration management and reporting
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | scenario templates  | ---> | expand (rows)       | ---> | runner (sequencer)  |
//! | request + asserts   |      | one per row         |      | + event channel     |
//! +---------------------+      +---------------------+      +---------------------+
//!                                                              |    ^          |
//!                                                  bind vars   |    |  publish | events
//!                                                              v    |          v
//! +---------------------+      +---------------------+      +---------------------+
//! | config + filters    | ---> | HTTP transport      |      | reporter (output)   |
//! | ordo.toml, ORDO_*   |      | retry + log capture |      | List/Null/etc.      |
//! +---------------------+      +---------------------+      +---------------------+
//!                                         |
//!                                         v
//!                              +---------------------+
//!                              | assertion + extract |
//!                              | -> variable store   |
//!                              +---------------------+
//! ```
//!
//! Most users should use the main `ordo` crate rather than importing `ordo-core` directly.

pub mod assertion;
pub mod config;
pub mod error;
pub mod expand;
pub mod field;
pub mod http;
pub mod masking;
pub mod reporter;
pub mod request;
pub mod runner;
pub mod scenario;
pub mod template;

// Re-export error handling crates
pub use eyre;
pub use serde_json;

/// Type alias for project names in ordo configuration.
///
/// Each project is one target environment with its own base URL,
/// timeout and retry policy.
pub type ProjectName = String;

// Re-export key functionality
pub use assertion::{evaluate, Assertion, AssertionFailure, MatchResult, Predicate, Violation};
pub use config::{get_ordo_config, Config, ProjectConfig};
pub use error::{ConfigError, Error, Result};
pub use expand::{expand, ParameterSet};
pub use http::{HttpClient, ResponseRecord, Transport, TransportError};
pub use reporter::{ListReporter, NullReporter, Reporter, ReporterType};
pub use request::{Endpoint, Method, RequestBuilder, RequestDescriptor};
pub use runner::{
    Failure, Filter, Outcome, RunReport, ScenarioIgnoreFilter, ScenarioInfo, ScenarioNameFilter,
    ScenarioReport, Sequencer, State, Summary,
};
pub use scenario::{ExtractionRule, Order, Scenario, ScenarioTemplate, Variables};
