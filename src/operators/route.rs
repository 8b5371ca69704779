//! Route: the shard boundary
//!
//! Everything below a `Route` runs on the shards it targets; everything above
//! it runs centrally on the merged results.

use std::fmt;

use crate::planner::{PlannerResult, PlanningContext};
use crate::sql::{AliasedExpr, Expr};

use super::helpers::can_reuse_column;
use super::{single_input, AddedColumn, Operator, OrderBy, PlanOp};

const NAME: &str = "Route";

/// How a route picks its target shards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOpcode {
    /// Every shard of the keyspace
    Scatter,
    /// Exactly one shard, through a unique vindex
    EqualUnique,
    /// Shards matching one value of a non-unique vindex
    Equal,
    /// Shards matching any of a list of values
    In,
    /// Shards named explicitly by the query
    ByDestination,
}

impl RouteOpcode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOpcode::Scatter => "Scatter",
            RouteOpcode::EqualUnique => "EqualUnique",
            RouteOpcode::Equal => "Equal",
            RouteOpcode::In => "IN",
            RouteOpcode::ByDestination => "ByDestination",
        }
    }
}

impl fmt::Display for RouteOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    source: Box<PlanOp>,
    opcode: RouteOpcode,
    keyspace: String,
}

impl Route {
    pub fn new(source: PlanOp, opcode: RouteOpcode, keyspace: impl Into<String>) -> Self {
        Self {
            source: Box::new(source),
            opcode,
            keyspace: keyspace.into(),
        }
    }

    pub fn opcode(&self) -> RouteOpcode {
        self.opcode
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn source(&self) -> &PlanOp {
        &self.source
    }
}

impl Operator for Route {
    fn inputs(&self) -> Vec<&PlanOp> {
        vec![&self.source]
    }

    fn inputs_mut(&mut self) -> Vec<&mut PlanOp> {
        vec![&mut self.source]
    }

    fn set_inputs(&mut self, inputs: Vec<PlanOp>) -> PlannerResult<()> {
        self.source = Box::new(single_input(NAME, inputs)?);
        Ok(())
    }

    fn clone_with(&self, inputs: Vec<PlanOp>) -> PlannerResult<PlanOp> {
        Ok(PlanOp::Route(Route::new(
            single_input(NAME, inputs)?,
            self.opcode,
            self.keyspace.clone(),
        )))
    }

    fn add_predicate(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: &Expr,
    ) -> PlannerResult<Option<PlanOp>> {
        self.source.add_predicate(ctx, expr)
    }

    fn add_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: AliasedExpr,
        reuse: bool,
        add_to_group_by: bool,
    ) -> PlannerResult<AddedColumn> {
        if reuse {
            let columns = self.source.get_columns()?;
            if let Some(offset) = can_reuse_column(ctx, &columns, &expr.expr) {
                return Ok(AddedColumn::at(offset));
            }
        }

        // shard-side operators directly below take the column as-is
        match self.source.as_mut() {
            PlanOp::Aggregator(aggr) => aggr
                .add_column_without_pushing(expr, add_to_group_by)
                .map(AddedColumn::at),
            PlanOp::Projection(proj) => Ok(AddedColumn::at(proj.append(expr))),
            source => source.add_column(ctx, expr, reuse, add_to_group_by),
        }
    }

    fn get_columns(&mut self) -> PlannerResult<Vec<AliasedExpr>> {
        self.source.get_columns()
    }

    fn get_ordering(&self) -> PlannerResult<Vec<OrderBy>> {
        self.source.get_ordering()
    }

    /// Keyspace-qualified
    fn tables_used(&self) -> Vec<String> {
        self.source
            .tables_used()
            .into_iter()
            .map(|table| format!("{}.{}", self.keyspace, table))
            .collect()
    }

    fn short_description(&self) -> String {
        format!("{} on {}", self.opcode, self.keyspace)
    }
}
