//! tlsmatrix core library: parameter derivation, constraint feasibility,
//! variant expansion, scheduling and verdict aggregation for TLS
//! compliance tests.

#[path = "model/capabilities.rs"]
mod capabilities;
#[path = "model/catalog.rs"]
mod catalog;
#[path = "runtime/clock.rs"]
mod clock;
#[path = "model/combination.rs"]
mod combination;
#[path = "platform/config.rs"]
mod config;
#[path = "model/constraint.rs"]
mod constraint;
#[path = "runtime/context.rs"]
mod context;
#[path = "model/derivation.rs"]
mod derivation;
#[path = "platform/duration.rs"]
mod duration;
#[path = "platform/envinfo.rs"]
mod envinfo;
#[path = "platform/error.rs"]
mod error;
#[path = "runtime/executor.rs"]
mod executor;
#[path = "runtime/expansion.rs"]
mod expansion;
#[path = "model/feasibility.rs"]
mod feasibility;
#[path = "model/parameter.rs"]
mod parameter;
#[path = "runtime/pipeline.rs"]
mod pipeline;
#[path = "cmd/plan.rs"]
mod plan;
#[path = "runtime/registry.rs"]
mod registry;
#[path = "model/reporting.rs"]
mod reporting;
#[path = "runtime/scheduler.rs"]
mod scheduler;
#[path = "model/scope.rs"]
mod scope;
#[path = "runtime/solver.rs"]
mod solver;
#[path = "model/tls.rs"]
mod tls;
#[path = "runtime/verdict.rs"]
mod verdict;
#[path = "model/workflow.rs"]
mod workflow;

pub use capabilities::*;
pub use catalog::*;
pub use clock::*;
pub use combination::*;
pub use config::*;
pub use constraint::*;
pub use context::*;
pub use derivation::*;
pub use duration::*;
pub use envinfo::*;
pub use error::*;
pub use executor::*;
pub use expansion::*;
pub use feasibility::*;
pub use parameter::*;
pub use pipeline::*;
pub use plan::*;
pub use registry::*;
pub use reporting::*;
pub use scheduler::*;
pub use scope::*;
pub use solver::*;
pub use tls::*;
pub use verdict::*;
pub use workflow::*;
