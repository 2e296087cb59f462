//! # Ordo - Sequenced WebAPI Acceptance Testing
//!
//! Ordo runs an ordered list of HTTP scenarios against a service. Each scenario
//! sends one request, checks the response against declarative assertions and
//! may keep fields of it as variables for the scenarios that follow.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ordo::{Assertion, RequestBuilder, Scenario};
//!
//! #[tokio::main]
//! async fn main() -> ordo::eyre::Result<()> {
//!     let scenarios = vec![
//!         Scenario::new(1, "create_pet", RequestBuilder::post("/pet").body(r#"{"name": "doggie"}"#))
//!             .expect(Assertion::status(200))
//!             .extract("id", "petId"),
//!         Scenario::new(2, "get_pet", RequestBuilder::get("/pet/{petId}"))
//!             .expect(Assertion::field_eq("name", "doggie")),
//!     ];
//!     ordo::App::new().run(scenarios).await
//! }
//! ```
//!
//! ## Parameterized Scenarios
//!
//! A template expands into one scenario per row ahead of execution:
//!
//! ```rust
//! use ordo::{expand, Assertion, ParameterSet, Predicate, RequestBuilder, Scenario};
//!
//! let template = Scenario::new(
//!     3,
//!     "find_by_status",
//!     RequestBuilder::get("/pet/findByStatus").query("status", "{status}"),
//! )
//! .expect(Assertion::all("status", Predicate::Equals("{status}".into())));
//!
//! let scenarios = expand(&template, &ParameterSet::values("status", ["pending", "sold"])).unwrap();
//! assert_eq!(scenarios[1].name, "find_by_status::sold");
//! ```

mod app;

// Re-export crates needed to write scenarios and reporters
pub use async_trait;
pub use eyre;
pub use pretty_assertions;
pub use serde_json;

// Re-export main application struct
pub use app::App;

// Re-export core functionality
pub use ordo_core::{
    assertion,
    config::{get_ordo_config, Config, ProjectConfig},
    expand::{expand, ParameterSet},
    http,
    reporter::{ListReporter, NullReporter, Reporter, ReporterType},
    request::{Method, RequestBuilder},
    runner::{self, Failure, Outcome, RunReport, Sequencer},
    scenario::{Order, Scenario, ScenarioTemplate, Variables},
    Assertion, Predicate,
};
