//! Grouping keys and aggregate invocations tracked by an `Aggregator`

use std::fmt;
use std::sync::Arc;

use crate::planner::{PlannerError, PlannerResult, PlanningContext};
use crate::sql::{AggrFunc, AggrName, AliasedExpr, Expr};

/// How an aggregation is finished across shards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOpcode {
    CountStar,
    /// Value of a non-aggregated column; any row of the group will do
    AnyValue,
    GroupConcat,
    Count,
    Sum,
    CountDistinct,
    SumDistinct,
    Min,
    Max,
}

impl AggregateOpcode {
    pub fn from_func(func: &AggrFunc) -> Self {
        match (func.name, func.distinct) {
            (AggrName::CountStar, _) => AggregateOpcode::CountStar,
            (AggrName::Count, true) => AggregateOpcode::CountDistinct,
            (AggrName::Count, false) => AggregateOpcode::Count,
            (AggrName::Sum, true) => AggregateOpcode::SumDistinct,
            (AggrName::Sum, false) => AggregateOpcode::Sum,
            (AggrName::Min, _) => AggregateOpcode::Min,
            (AggrName::Max, _) => AggregateOpcode::Max,
            (AggrName::GroupConcat, _) => AggregateOpcode::GroupConcat,
            (AggrName::AnyValue, _) => AggregateOpcode::AnyValue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOpcode::CountStar => "count_star",
            AggregateOpcode::AnyValue => "any_value",
            AggregateOpcode::GroupConcat => "group_concat",
            AggregateOpcode::Count => "count",
            AggregateOpcode::Sum => "sum",
            AggregateOpcode::CountDistinct => "count_distinct",
            AggregateOpcode::SumDistinct => "sum_distinct",
            AggregateOpcode::Min => "min",
            AggregateOpcode::Max => "max",
        }
    }

    /// True if finishing the aggregate compares argument values
    pub fn needs_comparable_values(&self) -> bool {
        matches!(
            self,
            AggregateOpcode::CountDistinct
                | AggregateOpcode::SumDistinct
                | AggregateOpcode::Min
                | AggregateOpcode::Max
        )
    }
}

impl fmt::Display for AggregateOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One grouping key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    /// Expression as written
    pub inner: Arc<Expr>,
    /// Canonical form used for deduplication and weight strings
    pub simplified: Arc<Expr>,
    pub aliased: AliasedExpr,
    /// Offset of the key value
    pub col_offset: Option<usize>,
    /// Offset of the key's weight string
    pub ws_offset: Option<usize>,
}

impl GroupBy {
    pub fn new(inner: Arc<Expr>, simplified: Arc<Expr>, aliased: AliasedExpr) -> Self {
        Self {
            inner,
            simplified,
            aliased,
            col_offset: None,
            ws_offset: None,
        }
    }

    /// Grouping key whose written and canonical forms coincide
    pub fn from_expr(expr: Expr) -> Self {
        let aliased = AliasedExpr::new(expr);
        Self::new(
            Arc::clone(&aliased.expr),
            Arc::clone(&aliased.expr),
            aliased,
        )
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.col_offset = Some(offset);
        self
    }
}

/// One aggregate invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggr {
    pub opcode: AggregateOpcode,
    /// Absent for `AnyValue` entries created from plain columns
    pub func: Option<AggrFunc>,
    pub original: AliasedExpr,
    pub alias: String,
    pub col_offset: Option<usize>,
    pub ws_offset: Option<usize>,
}

impl Aggr {
    pub fn new(
        opcode: AggregateOpcode,
        func: Option<AggrFunc>,
        original: AliasedExpr,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            opcode,
            func,
            original,
            alias: alias.into(),
            col_offset: None,
            ws_offset: None,
        }
    }

    pub fn from_func(func: &AggrFunc, original: AliasedExpr) -> Self {
        let alias = original.alias_str().to_string();
        Self::new(AggregateOpcode::from_func(func), Some(func.clone()), original, alias)
    }

    pub fn is_distinct(&self) -> bool {
        self.func.as_ref().is_some_and(|f| f.distinct)
    }

    /// First argument of the aggregate function
    pub fn arg(&self) -> Option<&Expr> {
        self.func.as_ref().and_then(AggrFunc::arg)
    }

    /// Expression the shards must produce for this aggregate to be finished
    /// above them
    pub fn push_down_column(&self, ctx: &PlanningContext<'_>) -> PlannerResult<Arc<Expr>> {
        match self.opcode {
            AggregateOpcode::AnyValue => Ok(Arc::clone(&self.original.expr)),
            AggregateOpcode::CountStar => Ok(Arc::new(Expr::int(1))),
            AggregateOpcode::GroupConcat => {
                let args = self.func.as_ref().map_or(0, |f| f.args.len());
                if args > 1 {
                    return Err(PlannerError::unsupported_query(
                        "group_concat with more than one argument",
                    ));
                }
                self.required_arg(ctx).map(|arg| Arc::new(arg.clone()))
            }
            _ => self.required_arg(ctx).map(|arg| Arc::new(arg.clone())),
        }
    }

    /// True if the aggregate compares values whose type needs a weight string
    pub fn needs_weight_string(&self, ctx: &PlanningContext<'_>) -> bool {
        self.opcode.needs_comparable_values()
            && self
                .arg()
                .is_some_and(|arg| ctx.sem_table.needs_weight_string(arg))
    }

    pub(crate) fn required_arg(&self, ctx: &PlanningContext<'_>) -> PlannerResult<&Expr> {
        self.arg().ok_or_else(|| {
            ctx.invariant_violation(format!("{} aggregation without an argument", self.opcode))
        })
    }
}
