//! Semantic analysis results consumed by the planner
//!
//! Each table reference in a query gets one bit in a `TableSet`. The
//! `SemanticTables` trait is the only door through which operators learn
//! about tables and column types.

mod sem_table;
mod table_set;

pub use sem_table::{
    rewrite_derived_table_expression, ColumnType, SemTable, SemanticTables, TableInfo,
};
pub use table_set::{TableSet, MAX_TABLES};
