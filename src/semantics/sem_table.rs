//! Semantic information about the tables of one query
//!
//! The operator tree never inspects table metadata directly. It asks a
//! `SemanticTables` implementation four questions: which tables an expression
//! depends on, whether two expressions are equal once dependencies are taken
//! into account, whether comparing an expression needs a weight-string
//! projection, and what a derived table's columns are made of.

use crate::planner::{PlannerError, PlannerResult};
use crate::sql::{ColName, Expr};

use super::table_set::{TableSet, MAX_TABLES};

/// Read-only semantic view of a query, consumed by the planner
pub trait SemanticTables {
    /// Union of the tables every column in `expr` resolves to
    fn recursive_deps(&self, expr: &Expr) -> TableSet;

    /// Structural equality where columns are compared by name and dependency
    fn equals_expr_with_deps(&self, a: &Expr, b: &Expr) -> bool;

    /// True if cross-shard comparison of `expr` needs its weight string
    fn needs_weight_string(&self, expr: &Expr) -> bool;

    /// Table information for a single-table identifier
    fn table_info_for(&self, id: TableSet) -> PlannerResult<&TableInfo>;
}

/// Column type as far as comparison is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Numeric,
    /// Textual value; a known collation lets the router compare it directly
    Text { collation: Option<String> },
    Unknown,
}

impl ColumnType {
    pub fn text() -> Self {
        ColumnType::Text { collation: None }
    }

    pub fn collated(collation: impl Into<String>) -> Self {
        ColumnType::Text {
            collation: Some(collation.into()),
        }
    }

    fn needs_weight_string(&self) -> bool {
        match self {
            ColumnType::Numeric => false,
            ColumnType::Text { collation } => collation.is_none(),
            ColumnType::Unknown => true,
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnDef {
    name: String,
    typ: ColumnType,
}

#[derive(Debug, Clone)]
enum TableKind {
    Real { columns: Vec<ColumnDef> },
    /// Derived table: each output column maps to the expression producing it
    Derived { columns: Vec<(String, Expr)> },
}

/// Information about one table reference
#[derive(Debug, Clone)]
pub struct TableInfo {
    id: TableSet,
    name: String,
    alias: Option<String>,
    kind: TableKind,
}

impl TableInfo {
    pub fn id(&self) -> TableSet {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, TableKind::Derived { .. })
    }

    /// Expression underneath a derived table's column
    pub fn expr_for(&self, column: &str) -> Option<&Expr> {
        match &self.kind {
            TableKind::Derived { columns } => columns
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, expr)| expr),
            TableKind::Real { .. } => None,
        }
    }

    fn has_column(&self, column: &str) -> bool {
        match &self.kind {
            TableKind::Real { columns } => {
                columns.iter().any(|c| c.name.eq_ignore_ascii_case(column))
            }
            TableKind::Derived { columns } => {
                columns.iter().any(|(name, _)| name.eq_ignore_ascii_case(column))
            }
        }
    }

    fn column_type(&self, column: &str) -> Option<&ColumnType> {
        match &self.kind {
            TableKind::Real { columns } => columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(column))
                .map(|c| &c.typ),
            TableKind::Derived { .. } => None,
        }
    }

    fn answers_to(&self, qualifier: &str) -> bool {
        let visible = self.alias.as_deref().unwrap_or(&self.name);
        visible.eq_ignore_ascii_case(qualifier)
    }
}

/// Replaces references to a derived table's columns with the expressions
/// underneath them, so the result can be evaluated below the derived table.
pub fn rewrite_derived_table_expression(expr: &Expr, derived: &TableInfo) -> Expr {
    expr.rewrite_columns(&|col: &ColName| derived.expr_for(&col.name).cloned())
}

/// In-memory semantic table set
#[derive(Debug, Clone, Default)]
pub struct SemTable {
    tables: Vec<TableInfo>,
}

impl SemTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> PlannerResult<TableSet> {
        if self.tables.len() >= MAX_TABLES {
            return Err(PlannerError::unsupported_query(format!(
                "more than {} tables in one query",
                MAX_TABLES
            )));
        }
        Ok(TableSet::single(self.tables.len()))
    }

    /// Registers a base table and returns its identifier
    pub fn add_table(
        &mut self,
        name: impl Into<String>,
        alias: Option<&str>,
    ) -> PlannerResult<TableSet> {
        let id = self.next_id()?;
        self.tables.push(TableInfo {
            id,
            name: name.into(),
            alias: alias.map(str::to_string),
            kind: TableKind::Real {
                columns: Vec::new(),
            },
        });
        Ok(id)
    }

    /// Declares a column on a base table
    pub fn add_column(
        &mut self,
        table: TableSet,
        name: impl Into<String>,
        typ: ColumnType,
    ) -> PlannerResult<()> {
        let info = self
            .tables
            .iter_mut()
            .find(|t| t.id == table)
            .ok_or_else(|| PlannerError::unknown_table(table))?;
        match &mut info.kind {
            TableKind::Real { columns } => {
                columns.push(ColumnDef {
                    name: name.into(),
                    typ,
                });
                Ok(())
            }
            TableKind::Derived { .. } => Err(PlannerError::invariant_violation(format!(
                "cannot declare columns on derived table {}",
                info.name
            ))),
        }
    }

    /// Registers a derived table whose columns are the given expressions
    pub fn add_derived_table(
        &mut self,
        alias: impl Into<String>,
        columns: Vec<(String, Expr)>,
    ) -> PlannerResult<TableSet> {
        let id = self.next_id()?;
        let alias = alias.into();
        self.tables.push(TableInfo {
            id,
            name: alias.clone(),
            alias: Some(alias),
            kind: TableKind::Derived { columns },
        });
        Ok(id)
    }

    /// Tables a column reference resolves to
    pub fn resolve(&self, col: &ColName) -> TableSet {
        self.resolve_in(col, self.tables.len())
    }

    /// Resolution limited to the first `scope` registered tables
    fn resolve_in(&self, col: &ColName, scope: usize) -> TableSet {
        let visible = &self.tables[..scope];
        if let Some(qualifier) = &col.qualifier {
            return visible
                .iter()
                .find(|t| t.answers_to(qualifier))
                .map(|t| t.id)
                .unwrap_or_default();
        }
        visible
            .iter()
            .filter(|t| t.has_column(&col.name))
            .fold(TableSet::empty(), |acc, t| acc.merge(t.id))
    }

    fn needs_weight_string_in(&self, expr: &Expr, scope: usize) -> bool {
        match expr {
            Expr::Column(col) => self.column_needs_weight_string(col, scope),
            Expr::Literal(_) | Expr::Null => false,
            Expr::Comparison(_) | Expr::And(..) | Expr::Or(..) | Expr::Not(_) => false,
            Expr::Aggregate(_) | Expr::WeightString(_) => false,
            Expr::BindVar(_) | Expr::Tuple(_) | Expr::Function(_) => true,
        }
    }

    /// A derived table's columns are defined over the tables registered
    /// before it, so the underlying expression is resolved in that narrower
    /// scope. Each step shrinks the scope, which bounds the recursion.
    fn column_needs_weight_string(&self, col: &ColName, scope: usize) -> bool {
        let deps = self.resolve_in(col, scope);
        let Some((index, info)) = self.tables[..scope]
            .iter()
            .enumerate()
            .find(|(_, t)| t.id == deps)
        else {
            return true;
        };
        if let Some(underlying) = info.expr_for(&col.name) {
            return self.needs_weight_string_in(underlying, index);
        }
        info.column_type(&col.name)
            .map_or(true, ColumnType::needs_weight_string)
    }

    fn all_equal(&self, xs: &[Expr], ys: &[Expr]) -> bool {
        xs.len() == ys.len()
            && xs
                .iter()
                .zip(ys)
                .all(|(x, y)| self.equals_expr_with_deps(x, y))
    }
}

impl SemanticTables for SemTable {
    fn recursive_deps(&self, expr: &Expr) -> TableSet {
        let mut deps = TableSet::empty();
        expr.for_each_column(&mut |col| deps = deps.merge(self.resolve(col)));
        deps
    }

    fn equals_expr_with_deps(&self, a: &Expr, b: &Expr) -> bool {
        match (a, b) {
            (Expr::Column(x), Expr::Column(y)) => {
                x.name_equals(&y.name) && self.resolve(x) == self.resolve(y)
            }
            (Expr::Tuple(xs), Expr::Tuple(ys)) => self.all_equal(xs, ys),
            (Expr::Comparison(x), Expr::Comparison(y)) => {
                x.op == y.op
                    && self.equals_expr_with_deps(&x.left, &y.left)
                    && self.equals_expr_with_deps(&x.right, &y.right)
            }
            (Expr::And(l1, r1), Expr::And(l2, r2)) | (Expr::Or(l1, r1), Expr::Or(l2, r2)) => {
                self.equals_expr_with_deps(l1, l2) && self.equals_expr_with_deps(r1, r2)
            }
            (Expr::Not(x), Expr::Not(y)) | (Expr::WeightString(x), Expr::WeightString(y)) => {
                self.equals_expr_with_deps(x, y)
            }
            (Expr::Aggregate(x), Expr::Aggregate(y)) => {
                x.name == y.name && x.distinct == y.distinct && self.all_equal(&x.args, &y.args)
            }
            (Expr::Function(x), Expr::Function(y)) => {
                x.name.eq_ignore_ascii_case(&y.name) && self.all_equal(&x.args, &y.args)
            }
            _ => a == b,
        }
    }

    fn needs_weight_string(&self, expr: &Expr) -> bool {
        self.needs_weight_string_in(expr, self.tables.len())
    }

    fn table_info_for(&self, id: TableSet) -> PlannerResult<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| PlannerError::unknown_table(id))
    }
}
