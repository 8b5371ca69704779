//! SQL expression model
//!
//! Parsing happens upstream; this module only holds the already-built
//! expression nodes the planner reasons about, plus the structural helpers
//! the operators need (conjunct splitting, value detection, rendering).

mod ast;

pub use ast::{
    is_simple_tuple, is_value, split_and_expression, weight_string_for, AggrFunc, AggrName,
    AliasedExpr, ColName, ComparisonExpr, ComparisonOp, Expr, FuncExpr, Literal,
};
