//! Filter: predicates applied to one source

use crate::planner::{PlannerResult, PlanningContext};
use crate::sql::{AliasedExpr, Expr};

use super::{single_input, AddedColumn, Operator, OrderBy, PlanOp};

const NAME: &str = "Filter";

#[derive(Debug, Clone)]
pub struct Filter {
    source: Box<PlanOp>,
    predicates: Vec<Expr>,
}

impl Filter {
    pub fn new(source: PlanOp, predicates: Vec<Expr>) -> Self {
        Self {
            source: Box::new(source),
            predicates,
        }
    }

    pub fn source(&self) -> &PlanOp {
        &self.source
    }

    pub fn predicates(&self) -> &[Expr] {
        &self.predicates
    }
}

impl Operator for Filter {
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
        Ok(PlanOp::Filter(Filter::new(
            single_input(NAME, inputs)?,
            self.predicates.clone(),
        )))
    }

    fn add_predicate(
        &mut self,
        _ctx: &PlanningContext<'_>,
        expr: &Expr,
    ) -> PlannerResult<Option<PlanOp>> {
        self.predicates.push(expr.clone());
        Ok(None)
    }

    fn add_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: AliasedExpr,
        reuse: bool,
        add_to_group_by: bool,
    ) -> PlannerResult<AddedColumn> {
        self.source.add_column(ctx, expr, reuse, add_to_group_by)
    }

    fn get_columns(&mut self) -> PlannerResult<Vec<AliasedExpr>> {
        self.source.get_columns()
    }

    fn get_ordering(&self) -> PlannerResult<Vec<OrderBy>> {
        self.source.get_ordering()
    }

    fn tables_used(&self) -> Vec<String> {
        self.source.tables_used()
    }

    fn short_description(&self) -> String {
        let preds: Vec<String> = self.predicates.iter().map(ToString::to_string).collect();
        preds.join(" and ")
    }
}
