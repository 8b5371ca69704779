//! Logical operator tree
//!
//! A plan is a tree of `PlanOp` nodes. Every node owns its inputs; nothing is
//! shared between plans. Expressions inside the nodes are `Arc`-shared and
//! never mutated, so cloning a node copies only its containers.
//!
//! # Column offsets
//!
//! `add_column` hands out zero-based offsets into the operator's output. An
//! offset, once returned, stays valid for the rest of planning. Parents
//! predict the offset a child will return and treat a mismatch as an
//! invariant violation.
//!
//! # Substitution
//!
//! `add_predicate` and `add_column` may answer with a replacement: the
//! operator that should take the receiver's place in the tree, already
//! wrapping the receiver where that applies. `PlanOp` installs a replacement
//! into its own slot before returning, so a parent forwarding into its
//! `PlanOp` input sees the substitution done and never gets one back.
//! Callers holding a bare variant install it themselves.

mod aggr;
mod aggregator;
mod filter;
mod helpers;
mod horizon;
mod projection;
mod route;
mod table;
mod vindex;

pub use aggr::{AggregateOpcode, Aggr, GroupBy};
pub use aggregator::Aggregator;
pub use filter::Filter;
pub use horizon::Horizon;
pub use projection::Projection;
pub use route::{Route, RouteOpcode};
pub use table::Table;
pub use vindex::{Vindex, VindexOpcode, VindexTable, VINDEX_UNSUPPORTED};

use std::sync::Arc;

use crate::planner::{PlannerResult, PlanningContext};
use crate::semantics::TableSet;
use crate::sql::{AliasedExpr, Expr};

/// Ordering guarantee an operator's output carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Expression as written in the query
    pub inner: Arc<Expr>,
    /// Canonical form used for comparison
    pub simplified: Arc<Expr>,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(expr: Expr) -> Self {
        let expr = Arc::new(expr);
        Self {
            inner: Arc::clone(&expr),
            simplified: expr,
            descending: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            descending: true,
            ..Self::asc(expr)
        }
    }
}

/// Offset of a column made available by `add_column`
#[derive(Debug)]
pub struct AddedColumn {
    pub offset: usize,
    /// Operator to put in place of the one that was asked
    pub replacement: Option<PlanOp>,
}

impl AddedColumn {
    /// Column served by the receiver itself
    pub fn at(offset: usize) -> Self {
        Self {
            offset,
            replacement: None,
        }
    }
}

/// Capability set shared by every operator
pub trait Operator {
    fn inputs(&self) -> Vec<&PlanOp>;

    fn inputs_mut(&mut self) -> Vec<&mut PlanOp>;

    /// Replaces the inputs; fails if the count does not match the arity
    fn set_inputs(&mut self, inputs: Vec<PlanOp>) -> PlannerResult<()>;

    /// Same configuration, independent containers, the given inputs
    fn clone_with(&self, inputs: Vec<PlanOp>) -> PlannerResult<PlanOp>;

    /// Incorporates a filter. `Some` is the operator replacing this one.
    fn add_predicate(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: &Expr,
    ) -> PlannerResult<Option<PlanOp>>;

    /// Makes `expr` available as an output column and returns its offset
    fn add_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: AliasedExpr,
        reuse: bool,
        add_to_group_by: bool,
    ) -> PlannerResult<AddedColumn>;

    fn get_columns(&mut self) -> PlannerResult<Vec<AliasedExpr>>;

    fn get_select_exprs(&mut self) -> PlannerResult<Vec<AliasedExpr>> {
        self.get_columns()
    }

    fn get_ordering(&self) -> PlannerResult<Vec<OrderBy>>;

    /// Base tables contributing to this operator's output
    fn tables_used(&self) -> Vec<String>;

    fn short_description(&self) -> String;

    /// Table identifier this operator introduces, if it stands for a table
    fn introduces_table_id(&self) -> TableSet {
        TableSet::empty()
    }
}

/// Node of a logical plan
#[derive(Debug, Clone)]
pub enum PlanOp {
    Table(Table),
    Filter(Filter),
    Vindex(Vindex),
    Projection(Projection),
    Route(Route),
    Horizon(Horizon),
    Aggregator(Aggregator),
}

macro_rules! dispatch {
    ($self:expr, $op:ident => $body:expr) => {
        match $self {
            PlanOp::Table($op) => $body,
            PlanOp::Filter($op) => $body,
            PlanOp::Vindex($op) => $body,
            PlanOp::Projection($op) => $body,
            PlanOp::Route($op) => $body,
            PlanOp::Horizon($op) => $body,
            PlanOp::Aggregator($op) => $body,
        }
    };
}

impl PlanOp {
    /// Variant name, as shown in explain output
    pub fn name(&self) -> &'static str {
        match self {
            PlanOp::Table(_) => "Table",
            PlanOp::Filter(_) => "Filter",
            PlanOp::Vindex(_) => "Vindex",
            PlanOp::Projection(_) => "Projection",
            PlanOp::Route(_) => "Route",
            PlanOp::Horizon(_) => "Horizon",
            PlanOp::Aggregator(_) => "Aggregator",
        }
    }

    /// Visits every node, inputs before their parent
    pub fn visit_post_order<F>(&mut self, visit: &mut F) -> PlannerResult<()>
    where
        F: FnMut(&mut PlanOp) -> PlannerResult<()>,
    {
        for input in self.inputs_mut() {
            input.visit_post_order(visit)?;
        }
        visit(self)
    }

    /// Number of nodes in the subtree
    pub fn count(&self) -> usize {
        1 + self.inputs().iter().map(|op| op.count()).sum::<usize>()
    }

    pub fn as_aggregator(&self) -> Option<&Aggregator> {
        match self {
            PlanOp::Aggregator(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_aggregator_mut(&mut self) -> Option<&mut Aggregator> {
        match self {
            PlanOp::Aggregator(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_filter(&self) -> Option<&Filter> {
        match self {
            PlanOp::Filter(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_vindex(&self) -> Option<&Vindex> {
        match self {
            PlanOp::Vindex(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_projection(&self) -> Option<&Projection> {
        match self {
            PlanOp::Projection(p) => Some(p),
            _ => None,
        }
    }
}

impl Operator for PlanOp {
    fn inputs(&self) -> Vec<&PlanOp> {
        dispatch!(self, op => op.inputs())
    }

    fn inputs_mut(&mut self) -> Vec<&mut PlanOp> {
        dispatch!(self, op => op.inputs_mut())
    }

    fn set_inputs(&mut self, inputs: Vec<PlanOp>) -> PlannerResult<()> {
        dispatch!(self, op => op.set_inputs(inputs))
    }

    fn clone_with(&self, inputs: Vec<PlanOp>) -> PlannerResult<PlanOp> {
        dispatch!(self, op => op.clone_with(inputs))
    }

    /// Installs any replacement in place; never returns one
    fn add_predicate(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: &Expr,
    ) -> PlannerResult<Option<PlanOp>> {
        let replacement = dispatch!(self, op => op.add_predicate(ctx, expr))?;
        if let Some(next) = replacement {
            *self = next;
        }
        Ok(None)
    }

    /// Installs any replacement in place; never returns one
    fn add_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: AliasedExpr,
        reuse: bool,
        add_to_group_by: bool,
    ) -> PlannerResult<AddedColumn> {
        let added = dispatch!(self, op => op.add_column(ctx, expr, reuse, add_to_group_by))?;
        if let Some(next) = added.replacement {
            *self = next;
        }
        Ok(AddedColumn::at(added.offset))
    }

    fn get_columns(&mut self) -> PlannerResult<Vec<AliasedExpr>> {
        dispatch!(self, op => op.get_columns())
    }

    fn get_ordering(&self) -> PlannerResult<Vec<OrderBy>> {
        dispatch!(self, op => op.get_ordering())
    }

    fn tables_used(&self) -> Vec<String> {
        dispatch!(self, op => op.tables_used())
    }

    fn short_description(&self) -> String {
        dispatch!(self, op => op.short_description())
    }

    fn introduces_table_id(&self) -> TableSet {
        dispatch!(self, op => op.introduces_table_id())
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for PlanOp {
                fn from(op: $variant) -> Self {
                    PlanOp::$variant(op)
                }
            }
        )*
    };
}

impl_from_variant!(Table, Filter, Vindex, Projection, Route, Horizon, Aggregator);

/// Takes exactly one input out of `inputs`
pub(crate) fn single_input(operator: &str, inputs: Vec<PlanOp>) -> PlannerResult<PlanOp> {
    let got = inputs.len();
    let mut iter = inputs.into_iter();
    match (iter.next(), iter.next()) {
        (Some(op), None) => Ok(op),
        _ => Err(crate::planner::PlannerError::arity(operator, 1, got)),
    }
}

/// Checks that a leaf received no inputs
pub(crate) fn no_inputs(operator: &str, inputs: &[PlanOp]) -> PlannerResult<()> {
    if inputs.is_empty() {
        Ok(())
    } else {
        Err(crate::planner::PlannerError::arity(operator, 0, inputs.len()))
    }
}
