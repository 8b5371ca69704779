//! Horizon: the select list of a derived table, not yet broken into
//! projection, ordering and aggregation

use crate::planner::{PlannerResult, PlanningContext};
use crate::semantics::{rewrite_derived_table_expression, TableSet};
use crate::sql::{AliasedExpr, Expr};

use super::helpers::{can_reuse_column, join_columns};
use super::{single_input, AddedColumn, Operator, OrderBy, PlanOp};

const NAME: &str = "Horizon";

#[derive(Debug, Clone)]
pub struct Horizon {
    source: Box<PlanOp>,
    columns: Vec<AliasedExpr>,
    ordering: Vec<OrderBy>,
    table_id: Option<TableSet>,
    alias: Option<String>,
}

impl Horizon {
    pub fn new(source: PlanOp, columns: Vec<AliasedExpr>) -> Self {
        Self {
            source: Box::new(source),
            columns,
            ordering: Vec::new(),
            table_id: None,
            alias: None,
        }
    }

    pub fn with_ordering(mut self, ordering: Vec<OrderBy>) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn as_derived(mut self, table_id: TableSet, alias: impl Into<String>) -> Self {
        self.table_id = Some(table_id);
        self.alias = Some(alias.into());
        self
    }
}

impl Operator for Horizon {
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
        Ok(PlanOp::Horizon(Horizon {
            source: Box::new(single_input(NAME, inputs)?),
            columns: self.columns.clone(),
            ordering: self.ordering.clone(),
            table_id: self.table_id,
            alias: self.alias.clone(),
        }))
    }

    /// Predicates on derived columns are rewritten before moving below
    fn add_predicate(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: &Expr,
    ) -> PlannerResult<Option<PlanOp>> {
        match self.table_id {
            Some(id) => {
                let derived = ctx.sem_table.table_info_for(id)?;
                let rewritten = rewrite_derived_table_expression(expr, derived);
                self.source.add_predicate(ctx, &rewritten)
            }
            None => self.source.add_predicate(ctx, expr),
        }
    }

    fn add_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: AliasedExpr,
        _reuse: bool,
        _add_to_group_by: bool,
    ) -> PlannerResult<AddedColumn> {
        can_reuse_column(ctx, &self.columns, &expr.expr)
            .map(AddedColumn::at)
            .ok_or_else(|| ctx.invariant_violation(format!("horizon not planned: {}", expr)))
    }

    fn get_columns(&mut self) -> PlannerResult<Vec<AliasedExpr>> {
        Ok(self.columns.clone())
    }

    fn get_ordering(&self) -> PlannerResult<Vec<OrderBy>> {
        Ok(self.ordering.clone())
    }

    fn tables_used(&self) -> Vec<String> {
        self.source.tables_used()
    }

    fn short_description(&self) -> String {
        let columns = join_columns(&self.columns);
        match &self.alias {
            Some(alias) if columns.is_empty() => format!("derived[{}]", alias),
            Some(alias) => format!("derived[{}] {}", alias, columns),
            None => columns,
        }
    }

    fn introduces_table_id(&self) -> TableSet {
        self.table_id.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::Table;
    use crate::planner::PlannerConfig;
    use crate::semantics::{ColumnType, SemTable};

    #[test]
    fn test_serves_only_existing_columns() {
        let mut sem = SemTable::new();
        let user = sem.add_table("user", None).unwrap();
        sem.add_column(user, "id", ColumnType::Numeric).unwrap();
        sem.add_column(user, "name", ColumnType::text()).unwrap();
        let config = PlannerConfig::quiet();
        let ctx = PlanningContext::new(&sem, &config);

        let mut horizon = Horizon::new(
            Table::new(user, "user").into(),
            vec![AliasedExpr::new(Expr::col("id"))],
        );

        assert_eq!(
            horizon
                .add_column(&ctx, AliasedExpr::new(Expr::col("id")), true, false)
                .unwrap()
                .offset,
            0
        );
        let err = horizon
            .add_column(&ctx, AliasedExpr::new(Expr::col("name")), true, false)
            .unwrap_err();
        assert!(err.is_planner_bug());
        assert!(err.message().starts_with("horizon not planned"));
    }

    #[test]
    fn test_predicate_rewritten_through_derived_table() {
        let mut sem = SemTable::new();
        let user = sem.add_table("user", None).unwrap();
        sem.add_column(user, "id", ColumnType::Numeric).unwrap();
        let dt = sem
            .add_derived_table("dt", vec![("uid".to_string(), Expr::qualified_col("user", "id"))])
            .unwrap();
        let config = PlannerConfig::quiet();
        let ctx = PlanningContext::new(&sem, &config);

        let mut horizon = Horizon::new(Table::new(user, "user").into(), Vec::new())
            .as_derived(dt, "dt");
        horizon
            .add_predicate(&ctx, &Expr::eq(Expr::qualified_col("dt", "uid"), Expr::int(3)))
            .unwrap();

        assert_eq!(horizon.short_description(), "derived[dt]");
        let inputs = horizon.inputs();
        let PlanOp::Filter(filter) = inputs[0] else {
            panic!("expected the table below the horizon to be filtered");
        };
        assert_eq!(filter.predicates(), &[Expr::eq(Expr::qualified_col("user", "id"), Expr::int(3))]);
        assert!(matches!(filter.source(), PlanOp::Table(_)));
    }
}
