//! Vindex lookup leaf
//!
//! Answers a query against a vindex itself (`select ... from vindex_table
//! where id = ?`). It needs exactly one routing value and knows nothing else.

use std::fmt;

use crate::planner::{PlannerError, PlannerResult, PlanningContext};
use crate::semantics::TableSet;
use crate::sql::{
    is_simple_tuple, is_value, split_and_expression, AliasedExpr, ColName, ComparisonOp, Expr,
};

use super::helpers::{add_column_to_leaf, col_names_to_exprs, ColNameColumns};
use super::{no_inputs, AddedColumn, Operator, OrderBy, PlanOp};

/// Prefix of every predicate rejection
pub const VINDEX_UNSUPPORTED: &str =
    "WHERE clause for vindex function must be of the form id = <val> or id in(<val>,...)";

const NAME: &str = "Vindex";

/// Routing opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VindexOpcode {
    #[default]
    None,
    /// Map the routing value through the vindex
    Map,
}

impl fmt::Display for VindexOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VindexOpcode::None => write!(f, "None"),
            VindexOpcode::Map => write!(f, "Map"),
        }
    }
}

/// Table the vindex is queried through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VindexTable {
    pub table_id: TableSet,
    pub name: String,
    pub alias: Option<String>,
    /// Accepted predicates
    pub predicates: Vec<Expr>,
}

impl VindexTable {
    pub fn new(table_id: TableSet, name: impl Into<String>) -> Self {
        Self {
            table_id,
            name: name.into(),
            alias: None,
            predicates: Vec::new(),
        }
    }
}

/// Vindex lookup operator
#[derive(Debug, Clone)]
pub struct Vindex {
    opcode: VindexOpcode,
    table: VindexTable,
    /// Name of the vindex routed through
    vindex: String,
    solved: TableSet,
    columns: Vec<ColName>,
    value: Option<Expr>,
}

fn unsupported(reason: &str) -> PlannerError {
    PlannerError::unsupported_push_down(format!("{} ({})", VINDEX_UNSUPPORTED, reason))
}

impl Vindex {
    pub fn new(table: VindexTable, vindex: impl Into<String>) -> Self {
        let solved = table.table_id;
        Self {
            opcode: VindexOpcode::None,
            table,
            vindex: vindex.into(),
            solved,
            columns: Vec::new(),
            value: None,
        }
    }

    pub fn opcode(&self) -> VindexOpcode {
        self.opcode
    }

    /// Routing value taken from the accepted predicate
    pub fn value(&self) -> Option<&Expr> {
        self.value.as_ref()
    }

    pub fn table(&self) -> &VindexTable {
        &self.table
    }

    pub fn get_col_names(&self) -> &[ColName] {
        &self.columns
    }

    pub fn add_col(&mut self, col: ColName) {
        self.columns.push(col);
    }

    /// Fails unless a routing predicate was accepted
    pub fn check_valid(&self) -> PlannerResult<()> {
        if self.table.predicates.is_empty() {
            return Err(unsupported("where clause missing"));
        }
        Ok(())
    }

    fn accept(&mut self, ctx: &PlanningContext<'_>, expr: &Expr) -> PlannerResult<()> {
        if ctx.sem_table.recursive_deps(expr).num_tables() > 1 {
            return Err(unsupported("multiple tables involved"));
        }
        if self.opcode != VindexOpcode::None {
            return Err(unsupported("multiple filters"));
        }

        let Expr::Comparison(comparison) = expr else {
            return Err(unsupported("not a comparison"));
        };
        if !matches!(comparison.op, ComparisonOp::Eq | ComparisonOp::In) {
            return Err(unsupported("not equality"));
        }
        let Expr::Column(col) = comparison.left.as_ref() else {
            return Err(unsupported("lhs is not a column"));
        };
        let routing = &ctx.config.vindex_routing_column;
        if !col.name_equals(routing) {
            return Err(unsupported(&format!("lhs is not {}", routing)));
        }
        if !is_value(&comparison.right) && !is_simple_tuple(&comparison.right) {
            return Err(unsupported("rhs is not a value"));
        }

        self.value = Some(comparison.right.as_ref().clone());
        self.opcode = VindexOpcode::Map;
        self.table.predicates.push(expr.clone());
        Ok(())
    }
}

impl ColNameColumns for Vindex {
    fn col_names(&self) -> &[ColName] {
        &self.columns
    }

    fn push_col_name(&mut self, col: ColName) {
        self.add_col(col);
    }
}

impl Operator for Vindex {
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
        Ok(PlanOp::Vindex(self.clone()))
    }

    /// The routing value is held by the leaf itself; it is never replaced
    fn add_predicate(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: &Expr,
    ) -> PlannerResult<Option<PlanOp>> {
        for conjunct in split_and_expression(expr) {
            self.accept(ctx, conjunct)?;
        }
        Ok(None)
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

    /// Not keyspace-qualified
    fn tables_used(&self) -> Vec<String> {
        vec![self.table.name.clone()]
    }

    fn short_description(&self) -> String {
        self.vindex.clone()
    }

    fn introduces_table_id(&self) -> TableSet {
        self.solved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{PlannerConfig, PlannerErrorCode};
    use crate::semantics::{ColumnType, SemTable};

    fn fixture() -> (SemTable, TableSet, TableSet) {
        let mut sem = SemTable::new();
        let t = sem.add_table("user_index", None).unwrap();
        sem.add_column(t, "id", ColumnType::Numeric).unwrap();
        sem.add_column(t, "keyspace_id", ColumnType::Unknown).unwrap();
        let other = sem.add_table("music", None).unwrap();
        sem.add_column(other, "music_id", ColumnType::Numeric).unwrap();
        (sem, t, other)
    }

    fn vindex(t: TableSet) -> Vindex {
        Vindex::new(VindexTable::new(t, "user_index"), "hash")
    }

    fn reason(err: &PlannerError) -> &str {
        let msg = err.message();
        &msg[VINDEX_UNSUPPORTED.len()..]
    }

    #[test]
    fn test_accepts_equality() {
        let (sem, t, _) = fixture();
        let config = PlannerConfig::quiet();
        let ctx = PlanningContext::new(&sem, &config);
        let mut v = vindex(t);

        v.add_predicate(&ctx, &Expr::eq(Expr::col("id"), Expr::int(5)))
            .unwrap();
        assert_eq!(v.opcode(), VindexOpcode::Map);
        assert_eq!(v.value(), Some(&Expr::int(5)));
        assert!(v.check_valid().is_ok());
    }

    #[test]
    fn test_accepts_in_list() {
        let (sem, t, _) = fixture();
        let config = PlannerConfig::quiet();
        let ctx = PlanningContext::new(&sem, &config);
        let mut v = vindex(t);

        let values = vec![Expr::int(1), Expr::bind_var("v2")];
        v.add_predicate(&ctx, &Expr::in_list(Expr::col("id"), values.clone()))
            .unwrap();
        assert_eq!(v.value(), Some(&Expr::Tuple(values)));
    }

    #[test]
    fn test_rejections() {
        let (sem, t, _) = fixture();
        let config = PlannerConfig::quiet();
        let ctx = PlanningContext::new(&sem, &config);

        let cases = vec![
            (
                Expr::eq(Expr::col("id"), Expr::col("music_id")),
                " (multiple tables involved)",
            ),
            (Expr::or(Expr::col("id"), Expr::col("id")), " (not a comparison)"),
            (
                Expr::comparison(ComparisonOp::Lt, Expr::col("id"), Expr::int(1)),
                " (not equality)",
            ),
            (Expr::eq(Expr::int(1), Expr::col("id")), " (lhs is not a column)"),
            (Expr::eq(Expr::col("keyspace_id"), Expr::int(1)), " (lhs is not id)"),
            (
                Expr::eq(Expr::col("id"), Expr::function("abs", vec![Expr::int(1)])),
                " (rhs is not a value)",
            ),
        ];

        for (expr, expected) in cases {
            let mut v = vindex(t);
            let err = v.add_predicate(&ctx, &expr).unwrap_err();
            assert_eq!(err.code(), PlannerErrorCode::UnsupportedPushDown, "{}", expr);
            assert_eq!(reason(&err), expected, "{}", expr);
            assert_eq!(v.opcode(), VindexOpcode::None);
        }
    }

    #[test]
    fn test_second_predicate_rejected() {
        let (sem, t, _) = fixture();
        let config = PlannerConfig::quiet();
        let ctx = PlanningContext::new(&sem, &config);
        let mut v = vindex(t);

        v.add_predicate(&ctx, &Expr::eq(Expr::col("id"), Expr::int(5)))
            .unwrap();
        let err = v
            .add_predicate(&ctx, &Expr::eq(Expr::col("id"), Expr::int(7)))
            .unwrap_err();
        assert_eq!(reason(&err), " (multiple filters)");
        assert_eq!(v.value(), Some(&Expr::int(5)));
    }

    #[test]
    fn test_check_valid_without_predicate() {
        let (_, t, _) = fixture();
        let err = vindex(t).check_valid().unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::UnsupportedPushDown);
        assert_eq!(reason(&err), " (where clause missing)");
    }

    #[test]
    fn test_add_column() {
        let (sem, t, _) = fixture();
        let config = PlannerConfig::quiet();
        let ctx = PlanningContext::new(&sem, &config);
        let mut v = vindex(t);

        let first = v
            .add_column(&ctx, AliasedExpr::new(Expr::col("keyspace_id")), true, false)
            .unwrap();
        let again = v
            .add_column(&ctx, AliasedExpr::new(Expr::col("keyspace_id")), true, false)
            .unwrap();
        assert_eq!(first.offset, again.offset);
        assert_eq!(v.get_col_names().len(), 1);

        let err = v
            .add_column(&ctx, AliasedExpr::new(Expr::col("id")), true, true)
            .unwrap_err();
        assert!(err.is_planner_bug());

        let err = v
            .add_column(&ctx, AliasedExpr::new(Expr::int(1)), true, false)
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::UnsupportedQueryShape);
    }

    #[test]
    fn test_leaf_properties() {
        let (_, t, _) = fixture();
        let v = vindex(t);
        assert_eq!(v.tables_used(), vec!["user_index".to_string()]);
        assert!(v.get_ordering().unwrap().is_empty());
        assert!(v.inputs().is_empty());
        assert_eq!(v.introduces_table_id(), t);
        assert_eq!(v.short_description(), "hash");
        assert!(v.clone_with(vec![PlanOp::Vindex(vindex(t))]).is_err());
    }
}
