//! shardplan - logical operator planning for a sharded SQL query router
//!
//! A query is planned as a tree of operators (`operators::PlanOp`). Columns
//! are requested from the top and pushed down; each operator answers with
//! the offset the value will occupy in its output row. Before the plan leaves
//! the planner, `planner::finalize` resolves aggregator offsets and validates
//! vindex leaves.
//!
//! The transaction throttling gate (`throttler`) sits beside the planner and
//! is consumed by the execution layer.

pub mod observability;
pub mod operators;
pub mod planner;
pub mod semantics;
pub mod sql;
pub mod throttler;
