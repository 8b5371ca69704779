//! Base table leaf

use crate::planner::{PlannerResult, PlanningContext};
use crate::semantics::TableSet;
use crate::sql::{AliasedExpr, ColName, Expr};

use super::filter::Filter;
use super::helpers::{add_column_to_leaf, col_names_to_exprs, ColNameColumns};
use super::{no_inputs, AddedColumn, Operator, OrderBy, PlanOp};

const NAME: &str = "Table";

/// Scan of one base table
#[derive(Debug, Clone)]
pub struct Table {
    table_id: TableSet,
    name: String,
    columns: Vec<ColName>,
}

impl Table {
    pub fn new(table_id: TableSet, name: impl Into<String>) -> Self {
        Self {
            table_id,
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ColNameColumns for Table {
    fn col_names(&self) -> &[ColName] {
        &self.columns
    }

    fn push_col_name(&mut self, col: ColName) {
        self.columns.push(col);
    }
}

impl Operator for Table {
    fn inputs(&self) -> Vec<&PlanOp> {
        Vec::new()
    }

    fn inputs_mut(&mut self) -> Vec<&mut PlanOp> {
        Vec::new()
    }

    fn set_inputs(&mut self, inputs: Vec<PlanOp>) -> PlannerResult<()> {
        no_inputs(NAME, &inputs)
    }

    fn clone_with(&self, inputs: Vec<PlanOp>) -> PlannerResult<PlanOp> {
        no_inputs(NAME, &inputs)?;
        Ok(PlanOp::Table(self.clone()))
    }

    /// A scan does not filter; the table is wrapped in a `Filter` instead
    fn add_predicate(
        &mut self,
        _ctx: &PlanningContext<'_>,
        expr: &Expr,
    ) -> PlannerResult<Option<PlanOp>> {
        let filter = Filter::new(PlanOp::Table(self.clone()), vec![expr.clone()]);
        Ok(Some(PlanOp::Filter(filter)))
    }

    fn add_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: AliasedExpr,
        _reuse: bool,
        add_to_group_by: bool,
    ) -> PlannerResult<AddedColumn> {
        if add_to_group_by {
            return Err(ctx.invariant_violation("tried to add group by to a table"));
        }
        add_column_to_leaf(ctx, self, &expr.expr).map(AddedColumn::at)
    }

    fn get_columns(&mut self) -> PlannerResult<Vec<AliasedExpr>> {
        Ok(col_names_to_exprs(&self.columns))
    }

    fn get_ordering(&self) -> PlannerResult<Vec<OrderBy>> {
        Ok(Vec::new())
    }

    fn tables_used(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn short_description(&self) -> String {
        self.name.clone()
    }

    fn introduces_table_id(&self) -> TableSet {
        self.table_id
    }
}
