//! Projection: an ordered select list over one source

use crate::planner::{PlannerResult, PlanningContext};
use crate::sql::{AliasedExpr, Expr};

use super::helpers::{can_reuse_column, join_columns};
use super::{single_input, AddedColumn, Operator, OrderBy, PlanOp};

const NAME: &str = "Projection";

#[derive(Debug, Clone)]
pub struct Projection {
    source: Box<PlanOp>,
    columns: Vec<AliasedExpr>,
}

impl Projection {
    pub fn new(source: PlanOp) -> Self {
        Self {
            source: Box::new(source),
            columns: Vec::new(),
        }
    }

    pub fn with_columns(source: PlanOp, columns: Vec<AliasedExpr>) -> Self {
        Self {
            source: Box::new(source),
            columns,
        }
    }

    pub fn columns(&self) -> &[AliasedExpr] {
        &self.columns
    }

    /// Appends a column unconditionally and returns its offset
    pub fn append(&mut self, expr: AliasedExpr) -> usize {
        self.columns.push(expr);
        self.columns.len() - 1
    }
}

impl Operator for Projection {
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
        Ok(PlanOp::Projection(Projection::with_columns(
            single_input(NAME, inputs)?,
            self.columns.clone(),
        )))
    }

    fn add_predicate(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: &Expr,
    ) -> PlannerResult<Option<PlanOp>> {
        self.source.add_predicate(ctx, expr)
    }

    /// Reuses an equal column only when `reuse` is set; otherwise appends
    fn add_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: AliasedExpr,
        reuse: bool,
        _add_to_group_by: bool,
    ) -> PlannerResult<AddedColumn> {
        if reuse {
            if let Some(offset) = can_reuse_column(ctx, &self.columns, &expr.expr) {
                return Ok(AddedColumn::at(offset));
            }
        }
        Ok(AddedColumn::at(self.append(expr)))
    }

    fn get_columns(&mut self) -> PlannerResult<Vec<AliasedExpr>> {
        Ok(self.columns.clone())
    }

    fn get_ordering(&self) -> PlannerResult<Vec<OrderBy>> {
        self.source.get_ordering()
    }

    fn tables_used(&self) -> Vec<String> {
        self.source.tables_used()
    }

    fn short_description(&self) -> String {
        join_columns(&self.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::Table;
    use crate::planner::PlannerConfig;
    use crate::semantics::{ColumnType, SemTable};

    #[test]
    fn test_reuse_only_when_asked() {
        let mut sem = SemTable::new();
        let user = sem.add_table("user", None).unwrap();
        sem.add_column(user, "id", ColumnType::Numeric).unwrap();
        let config = PlannerConfig::quiet();
        let ctx = PlanningContext::new(&sem, &config);

        let mut proj = Projection::new(Table::new(user, "user").into());
        let id = AliasedExpr::new(Expr::col("id"));

        assert_eq!(proj.add_column(&ctx, id.clone(), true, false).unwrap().offset, 0);
        assert_eq!(proj.add_column(&ctx, id.clone(), true, false).unwrap().offset, 0);
        assert_eq!(proj.add_column(&ctx, id, false, false).unwrap().offset, 1);
        assert_eq!(proj.short_description(), "id, id");
    }

    #[test]
    fn test_clone_keeps_columns_independent() {
        let user = crate::semantics::TableSet::single(0);
        let mut proj = Projection::new(Table::new(user, "user").into());
        proj.append(AliasedExpr::new(Expr::col("id")));

        let mut copy = proj
            .clone_with(vec![Table::new(user, "user").into()])
            .unwrap();
        if let PlanOp::Projection(p) = &mut copy {
            p.append(AliasedExpr::new(Expr::col("name")));
        }

        assert_eq!(proj.columns().len(), 1);
        assert_eq!(copy.get_columns().unwrap().len(), 2);
        assert_eq!(copy.tables_used(), vec!["user".to_string()]);
    }
}
