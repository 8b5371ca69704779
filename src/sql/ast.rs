//! Expression AST consumed by the operator tree
//!
//! Expressions are immutable once built. Operators share them behind `Arc`
//! and only ever copy the containers that hold them.

use std::fmt;
use std::sync::Arc;

/// Column reference, optionally qualified by a table name or alias
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColName {
    /// Column name
    pub name: String,
    /// Table name or alias the column is qualified with
    pub qualifier: Option<String>,
}

impl ColName {
    /// Create an unqualified column reference
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
        }
    }

    /// Create a qualified column reference (`qualifier.name`)
    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// Column names compare case-insensitively
    pub fn name_equals(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    /// Decimal kept in its textual form
    Decimal(String),
    Str(String),
    Bool(bool),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    NullSafeEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Like,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::NullSafeEq => "<=>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::In => "in",
            ComparisonOp::NotIn => "not in",
            ComparisonOp::Like => "like",
        }
    }
}

/// `left <op> right`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComparisonExpr {
    pub op: ComparisonOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// Aggregate function names understood by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggrName {
    Count,
    CountStar,
    Sum,
    Min,
    Max,
    GroupConcat,
    AnyValue,
}

impl AggrName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggrName::Count | AggrName::CountStar => "count",
            AggrName::Sum => "sum",
            AggrName::Min => "min",
            AggrName::Max => "max",
            AggrName::GroupConcat => "group_concat",
            AggrName::AnyValue => "any_value",
        }
    }
}

/// Aggregate function invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggrFunc {
    pub name: AggrName,
    pub args: Vec<Expr>,
    pub distinct: bool,
}

impl AggrFunc {
    /// `count(*)`
    pub fn count_star() -> Self {
        Self {
            name: AggrName::CountStar,
            args: Vec::new(),
            distinct: false,
        }
    }

    pub fn new(name: AggrName, args: Vec<Expr>) -> Self {
        Self {
            name,
            args,
            distinct: false,
        }
    }

    /// `name(distinct args)`
    pub fn distinct(name: AggrName, args: Vec<Expr>) -> Self {
        Self {
            name,
            args,
            distinct: true,
        }
    }

    /// First argument, if any
    pub fn arg(&self) -> Option<&Expr> {
        self.args.first()
    }
}

/// Scalar function call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncExpr {
    pub name: String,
    pub args: Vec<Expr>,
}

/// SQL expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Column(ColName),
    Literal(Literal),
    Null,
    /// Bind variable (`:name`)
    BindVar(String),
    Tuple(Vec<Expr>),
    Comparison(ComparisonExpr),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Aggregate(AggrFunc),
    /// Byte-comparable form of the inner expression
    WeightString(Box<Expr>),
    Function(FuncExpr),
}

impl Expr {
    /// Unqualified column reference
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(ColName::new(name))
    }

    /// Qualified column reference
    pub fn qualified_col(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column(ColName::qualified(qualifier, name))
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Str(value.into()))
    }

    pub fn bind_var(name: impl Into<String>) -> Self {
        Expr::BindVar(name.into())
    }

    pub fn comparison(op: ComparisonOp, left: Expr, right: Expr) -> Self {
        Expr::Comparison(ComparisonExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// `left = right`
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::comparison(ComparisonOp::Eq, left, right)
    }

    /// `left in (values...)`
    pub fn in_list(left: Expr, values: Vec<Expr>) -> Self {
        Self::comparison(ComparisonOp::In, left, Expr::Tuple(values))
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    pub fn count_star() -> Self {
        Expr::Aggregate(AggrFunc::count_star())
    }

    /// Single-argument aggregate
    pub fn aggregate(name: AggrName, arg: Expr) -> Self {
        Expr::Aggregate(AggrFunc::new(name, vec![arg]))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function(FuncExpr {
            name: name.into(),
            args,
        })
    }

    /// Returns the column reference if this is one
    pub fn as_column(&self) -> Option<&ColName> {
        match self {
            Expr::Column(col) => Some(col),
            _ => None,
        }
    }

    /// Returns true if this expression contains an aggregate function
    pub fn contains_aggregation(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::Aggregate(_)) {
                found = true;
            }
        });
        found
    }

    /// Visits this expression and every sub-expression, parents first
    pub fn walk(&self, visit: &mut impl FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Null | Expr::BindVar(_) => {}
            Expr::Tuple(items) => items.iter().for_each(|e| e.walk(visit)),
            Expr::Comparison(cmp) => {
                cmp.left.walk(visit);
                cmp.right.walk(visit);
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.walk(visit);
                r.walk(visit);
            }
            Expr::Not(inner) | Expr::WeightString(inner) => inner.walk(visit),
            Expr::Aggregate(f) => f.args.iter().for_each(|e| e.walk(visit)),
            Expr::Function(f) => f.args.iter().for_each(|e| e.walk(visit)),
        }
    }

    /// Visits every column reference in this expression
    pub fn for_each_column(&self, visit: &mut impl FnMut(&ColName)) {
        self.walk(&mut |e| {
            if let Expr::Column(col) = e {
                visit(col);
            }
        });
    }

    /// Rebuilds the expression, replacing each column for which `rewrite`
    /// returns `Some`.
    pub fn rewrite_columns(&self, rewrite: &impl Fn(&ColName) -> Option<Expr>) -> Expr {
        let boxed = |e: &Expr| Box::new(e.rewrite_columns(rewrite));
        let all = |items: &[Expr]| -> Vec<Expr> {
            items.iter().map(|e| e.rewrite_columns(rewrite)).collect()
        };
        match self {
            Expr::Column(col) => rewrite(col).unwrap_or_else(|| self.clone()),
            Expr::Literal(_) | Expr::Null | Expr::BindVar(_) => self.clone(),
            Expr::Tuple(items) => Expr::Tuple(all(items)),
            Expr::Comparison(cmp) => Expr::Comparison(ComparisonExpr {
                op: cmp.op,
                left: boxed(&cmp.left),
                right: boxed(&cmp.right),
            }),
            Expr::And(l, r) => Expr::And(boxed(l), boxed(r)),
            Expr::Or(l, r) => Expr::Or(boxed(l), boxed(r)),
            Expr::Not(inner) => Expr::Not(boxed(inner)),
            Expr::WeightString(inner) => Expr::WeightString(boxed(inner)),
            Expr::Aggregate(f) => Expr::Aggregate(AggrFunc {
                name: f.name,
                args: all(&f.args),
                distinct: f.distinct,
            }),
            Expr::Function(f) => Expr::Function(FuncExpr {
                name: f.name.clone(),
                args: all(&f.args),
            }),
        }
    }
}

/// Wraps an expression in its weight-string projection
pub fn weight_string_for(expr: &Expr) -> Expr {
    Expr::WeightString(Box::new(expr.clone()))
}

/// Flattens nested ANDs into their conjuncts, left to right
pub fn split_and_expression(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect_conjuncts(expr, &mut out);
    out
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::And(l, r) => {
            collect_conjuncts(l, out);
            collect_conjuncts(r, out);
        }
        other => out.push(other),
    }
}

/// Literal, bind variable or NULL
pub fn is_value(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(_) | Expr::BindVar(_) | Expr::Null)
}

/// Tuple made only of values
pub fn is_simple_tuple(expr: &Expr) -> bool {
    match expr {
        Expr::Tuple(items) => items.iter().all(is_value),
        _ => false,
    }
}

/// Select expression with an optional alias
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasedExpr {
    /// Shared, immutable expression
    pub expr: Arc<Expr>,
    pub alias: Option<String>,
}

impl AliasedExpr {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr: Arc::new(expr),
            alias: None,
        }
    }

    pub fn with_alias(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr: Arc::new(expr),
            alias: Some(alias.into()),
        }
    }

    pub fn from_shared(expr: Arc<Expr>) -> Self {
        Self { expr, alias: None }
    }

    /// Alias text, empty when none was given
    pub fn alias_str(&self) -> &str {
        self.alias.as_deref().unwrap_or("")
    }

    /// Output name: the alias, else the column name for plain columns
    pub fn column_name(&self) -> String {
        match (&self.alias, self.expr.as_ref()) {
            (Some(alias), _) => alias.clone(),
            (None, Expr::Column(col)) => col.name.clone(),
            (None, other) => other.to_string(),
        }
    }
}

impl fmt::Display for ColName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Decimal(v) => write!(f, "{}", v),
            Literal::Str(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Literal::Bool(v) => write!(f, "{}", v),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Null => write!(f, "null"),
            Expr::BindVar(name) => write!(f, ":{}", name),
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Expr::Comparison(cmp) => {
                write!(f, "{} {} {}", cmp.left, cmp.op.as_str(), cmp.right)
            }
            Expr::And(l, r) => write!(f, "{} and {}", l, r),
            Expr::Or(l, r) => write!(f, "({} or {})", l, r),
            Expr::Not(inner) => write!(f, "not {}", inner),
            Expr::Aggregate(func) => {
                if func.name == AggrName::CountStar {
                    return write!(f, "count(*)");
                }
                write!(f, "{}(", func.name.as_str())?;
                if func.distinct {
                    write!(f, "distinct ")?;
                }
                write_list(f, &func.args)?;
                write!(f, ")")
            }
            Expr::WeightString(inner) => write!(f, "weight_string({})", inner),
            Expr::Function(func) => {
                write!(f, "{}(", func.name)?;
                write_list(f, &func.args)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for AliasedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} as {}", self.expr, alias),
            None => write!(f, "{}", self.expr),
        }
    }
}
