//! Column helpers shared by several operators

use crate::planner::{PlannerError, PlannerResult, PlanningContext};
use crate::sql::{AliasedExpr, ColName, Expr};

/// Offset of the first column semantically equal to `expr`
pub(crate) fn can_reuse_column(
    ctx: &PlanningContext<'_>,
    columns: &[AliasedExpr],
    expr: &Expr,
) -> Option<usize> {
    columns
        .iter()
        .position(|col| ctx.sem_table.equals_expr_with_deps(expr, &col.expr))
}

/// Leaf operators whose output is a plain list of column references
pub(crate) trait ColNameColumns {
    fn col_names(&self) -> &[ColName];
    fn push_col_name(&mut self, col: ColName);
}

/// Reuse-or-append for leaves that can only produce columns
pub(crate) fn add_column_to_leaf(
    ctx: &PlanningContext<'_>,
    op: &mut impl ColNameColumns,
    expr: &Expr,
) -> PlannerResult<usize> {
    let Some(col) = expr.as_column() else {
        return Err(PlannerError::unsupported_query(format!(
            "cannot add '{}' expression to a table/vindex",
            expr
        )));
    };

    let existing = op.col_names().iter().position(|c| {
        ctx.sem_table
            .equals_expr_with_deps(&Expr::Column(c.clone()), expr)
    });
    if let Some(offset) = existing {
        return Ok(offset);
    }

    let offset = op.col_names().len();
    op.push_col_name(col.clone());
    Ok(offset)
}

pub(crate) fn col_names_to_exprs(cols: &[ColName]) -> Vec<AliasedExpr> {
    cols.iter()
        .map(|c| AliasedExpr::new(Expr::Column(c.clone())))
        .collect()
}

pub(crate) fn join_columns(columns: &[AliasedExpr]) -> String {
    columns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
