//! Planning context, configuration, errors and whole-tree passes
//!
//! # Error categories
//!
//! - User input: the query cannot be planned as written; surfaced as a
//!   compilation failure
//! - Planner bug: an internal invariant broke; never the user's fault
//!
//! No error is recovered locally. The first one aborts planning of the query.
//!
//! # Passes
//!
//! - `finalize`: post-order walk that validates vindex leaves and resolves
//!   aggregator offsets
//! - `ExplainPlan`: deterministic rendering of a tree or of a rejection

mod config;
mod context;
mod errors;
mod explain;
mod finalize;

pub use config::PlannerConfig;
pub use context::PlanningContext;
pub use errors::{Category, PlannerError, PlannerErrorCode, PlannerResult};
pub use explain::{ExplainNode, ExplainPlan};
pub use finalize::finalize;
