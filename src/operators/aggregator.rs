//! Grouping/aggregation operator
//!
//! An `Aggregator` keeps three collections that must agree with each other:
//! the output `columns`, the `grouping` keys and the `aggregations`. Grouping
//! and aggregation entries point into `columns` by offset, and `columns` must
//! line up with what the source actually produces.
//!
//! # Offset planning
//!
//! `plan_offsets` runs once. After it has run, the aggregator refuses to
//! reorder anything and only appends.
//!
//! - Pushed (already below a shard boundary): every entry knows its column;
//!   only missing key columns and weight strings are requested from the source.
//! - Not pushed: output columns are pushed to the source strictly in column
//!   order, each landing exactly on its own offset, then any key columns and
//!   weight strings not part of the output are appended.

use std::sync::Arc;

use crate::planner::{PlannerError, PlannerResult, PlanningContext};
use crate::semantics::{rewrite_derived_table_expression, TableInfo, TableSet};
use crate::sql::{weight_string_for, AliasedExpr, Expr};

use super::aggr::{AggregateOpcode, Aggr, GroupBy};
use super::helpers::{can_reuse_column, join_columns};
use super::{single_input, AddedColumn, Operator, OrderBy, PlanOp};

const NAME: &str = "Aggregator";

/// GROUP BY / aggregate operator
#[derive(Debug, Clone)]
pub struct Aggregator {
    source: Box<PlanOp>,
    columns: Vec<AliasedExpr>,
    grouping: Vec<GroupBy>,
    aggregations: Vec<Aggr>,
    /// Argument of the single distinct aggregation, if any
    distinct_expr: Option<Arc<Expr>>,
    /// Set once this node has been relocated below a shard boundary
    pushed: bool,
    offset_planned: bool,
    /// Set only for the node built directly from the query
    original: bool,
    /// Columns past this count exist only for planning
    result_columns: usize,
    /// Set when this aggregator stands for a derived table
    table_id: Option<TableSet>,
    alias: Option<String>,
}

impl Aggregator {
    pub fn new(source: PlanOp, original: bool) -> Self {
        Self {
            source: Box::new(source),
            columns: Vec::new(),
            grouping: Vec::new(),
            aggregations: Vec::new(),
            distinct_expr: None,
            pushed: false,
            offset_planned: false,
            original,
            result_columns: 0,
            table_id: None,
            alias: None,
        }
    }

    /// Marks this aggregator as standing for derived table `alias`
    pub fn as_derived(mut self, table_id: TableSet, alias: impl Into<String>) -> Self {
        self.table_id = Some(table_id);
        self.alias = Some(alias.into());
        self
    }

    pub fn set_pushed(&mut self, pushed: bool) {
        self.pushed = pushed;
    }

    pub fn source(&self) -> &PlanOp {
        &self.source
    }

    pub fn columns(&self) -> &[AliasedExpr] {
        &self.columns
    }

    pub fn grouping(&self) -> &[GroupBy] {
        &self.grouping
    }

    pub fn aggregations(&self) -> &[Aggr] {
        &self.aggregations
    }

    pub fn distinct_expr(&self) -> Option<&Expr> {
        self.distinct_expr.as_deref()
    }

    pub fn is_pushed(&self) -> bool {
        self.pushed
    }

    pub fn is_original(&self) -> bool {
        self.original
    }

    pub fn is_offset_planned(&self) -> bool {
        self.offset_planned
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn is_derived(&self) -> bool {
        self.table_id.is_some()
    }

    pub fn result_columns(&self) -> usize {
        self.result_columns
    }

    pub fn set_truncate_column_count(&mut self, count: usize) {
        self.result_columns = count;
    }

    /// Adds a grouping key that is not necessarily part of the output
    pub fn add_grouping(&mut self, group_by: GroupBy) {
        self.grouping.push(group_by);
    }

    /// Adds an aggregation entry. Only one distinct aggregation is allowed.
    pub fn add_aggregation(&mut self, aggr: Aggr) -> PlannerResult<()> {
        if aggr.is_distinct() {
            if self.aggregations.iter().any(Aggr::is_distinct) {
                return Err(PlannerError::unsupported_query(
                    "only one distinct aggregation is allowed per aggregator",
                ));
            }
            self.distinct_expr = aggr.arg().cloned().map(Arc::new);
        }
        self.aggregations.push(aggr);
        Ok(())
    }

    /// Registers an output column without asking the source for it
    pub fn add_column_without_pushing(
        &mut self,
        expr: AliasedExpr,
        add_to_group_by: bool,
    ) -> PlannerResult<usize> {
        let offset = self.columns.len();
        self.columns.push(expr.clone());

        if add_to_group_by {
            let group_by = GroupBy::new(Arc::clone(&expr.expr), Arc::clone(&expr.expr), expr);
            self.grouping.push(group_by.at(offset));
            return Ok(offset);
        }

        let func = match expr.expr.as_ref() {
            Expr::Aggregate(func) => Some(func.clone()),
            _ => None,
        };
        let mut aggr = match func {
            Some(func) => Aggr::from_func(&func, expr),
            None => {
                let alias = expr.alias_str().to_string();
                Aggr::new(AggregateOpcode::AnyValue, None, expr, alias)
            }
        };
        aggr.col_offset = Some(offset);
        self.add_aggregation(aggr)?;
        Ok(offset)
    }

    /// Clone meant to run on the shard side of a split aggregation.
    ///
    /// The receiver stays above the boundary and finishes the aggregation.
    pub fn split_below_boundary(&self, inputs: Vec<PlanOp>) -> PlannerResult<Aggregator> {
        let mut below = self.clone_with_source(single_input(NAME, inputs)?);
        below.pushed = false;
        below.original = false;
        below.alias = None;
        below.table_id = None;
        Ok(below)
    }

    /// Resolves every grouping and aggregation offset against the source.
    ///
    /// Runs at most once; later calls return immediately, even if the first
    /// one failed.
    pub fn plan_offsets(&mut self, ctx: &PlanningContext<'_>) -> PlannerResult<()> {
        if self.offset_planned {
            return Ok(());
        }
        let result = if self.pushed {
            self.push_grouping_and_weight_strings(ctx, true)
        } else {
            self.plan_offsets_not_pushed(ctx)
        };
        self.offset_planned = true;
        result
    }

    fn plan_offsets_not_pushed(&mut self, ctx: &PlanningContext<'_>) -> PlannerResult<()> {
        // column order, never grouping or aggregation order
        for col_idx in 0..self.columns.len() {
            if self.add_if_grouping_column(ctx, col_idx)?.is_some() {
                continue;
            }
            if self.add_if_aggregation_column(ctx, col_idx)?.is_none() {
                return Err(ctx.invariant_violation(format!(
                    "failed to find the corresponding column for {}",
                    self.columns[col_idx]
                )));
            }
        }
        self.push_grouping_and_weight_strings(ctx, false)
    }

    fn add_if_grouping_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        col_idx: usize,
    ) -> PlannerResult<Option<usize>> {
        if !self.grouping.iter().any(|gb| gb.col_offset == Some(col_idx)) {
            return Ok(None);
        }

        let column = self.columns[col_idx].clone();
        let offset = self.source.add_column(ctx, column, false, true)?.offset;
        if offset != col_idx {
            return Err(ctx.invariant_violation(format!(
                "grouping column on wrong index: want: {}, got: {}",
                col_idx, offset
            )));
        }
        Ok(Some(offset))
    }

    fn add_if_aggregation_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        col_idx: usize,
    ) -> PlannerResult<Option<usize>> {
        let Some(aggr) = self
            .aggregations
            .iter()
            .find(|aggr| aggr.col_offset == Some(col_idx))
        else {
            return Ok(None);
        };

        let push_down = AliasedExpr::from_shared(aggr.push_down_column(ctx)?);
        let offset = self.source.add_column(ctx, push_down, false, false)?.offset;
        if offset != col_idx {
            if matches!(*self.source, PlanOp::Aggregator(_)) {
                return Err(PlannerError::unsupported_query(
                    "aggregation on top of aggregation not supported",
                ));
            }
            return Err(ctx.invariant_violation(format!(
                "aggregation column on wrong index: want: {}, got: {}",
                col_idx, offset
            )));
        }
        Ok(Some(offset))
    }

    /// Requests key columns and weight strings the offsets do not cover yet.
    ///
    /// `ws_as_group` is forwarded as the grouping flag for key weight strings.
    fn push_grouping_and_weight_strings(
        &mut self,
        ctx: &PlanningContext<'_>,
        ws_as_group: bool,
    ) -> PlannerResult<()> {
        for idx in 0..self.grouping.len() {
            if self.grouping[idx].col_offset.is_none() {
                let inner = AliasedExpr::from_shared(Arc::clone(&self.grouping[idx].inner));
                let offset = self.internal_add_column(ctx, inner, false)?;
                self.grouping[idx].col_offset = Some(offset);
            }

            let gb = &self.grouping[idx];
            if gb.ws_offset.is_some() || !ctx.sem_table.needs_weight_string(&gb.simplified) {
                continue;
            }
            let ws = AliasedExpr::new(weight_string_for(&gb.simplified));
            let offset = self.internal_add_column(ctx, ws, ws_as_group)?;
            self.grouping[idx].ws_offset = Some(offset);
        }

        for idx in 0..self.aggregations.len() {
            let aggr = &self.aggregations[idx];
            if aggr.ws_offset.is_some() || !aggr.needs_weight_string(ctx) {
                continue;
            }
            let ws = AliasedExpr::new(weight_string_for(aggr.required_arg(ctx)?));
            let offset = self.internal_add_column(ctx, ws, ws_as_group)?;
            self.aggregations[idx].ws_offset = Some(offset);
        }
        Ok(())
    }

    /// Asks the source for a column, adopting it if it landed past our end
    fn internal_add_column(
        &mut self,
        ctx: &PlanningContext<'_>,
        expr: AliasedExpr,
        add_to_group_by: bool,
    ) -> PlannerResult<usize> {
        let offset = self
            .source
            .add_column(ctx, expr.clone(), true, add_to_group_by)?
            .offset;
        if offset == self.columns.len() {
            self.columns.push(expr);
        }
        Ok(offset)
    }

    fn derived_table<'c>(&self, ctx: &PlanningContext<'c>) -> PlannerResult<Option<&'c TableInfo>> {
        match self.table_id {
            Some(id) => ctx.sem_table.table_info_for(id).map(Some),
            None => Ok(None),
        }
    }

    fn find_col(&self, ctx: &PlanningContext<'_>, expr: &Expr) -> PlannerResult<Option<usize>> {
        let offset = match self.derived_table(ctx)? {
            Some(derived) => {
                let rewritten = rewrite_derived_table_expression(expr, derived);
                can_reuse_column(ctx, &self.columns, &rewritten)
            }
            None => can_reuse_column(ctx, &self.columns, expr),
        };
        Ok(offset)
    }

    fn clone_with_source(&self, source: PlanOp) -> Aggregator {
        Aggregator {
            source: Box::new(source),
            columns: self.columns.clone(),
            grouping: self.grouping.clone(),
            aggregations: self.aggregations.clone(),
            distinct_expr: self.distinct_expr.clone(),
            pushed: self.pushed,
            offset_planned: self.offset_planned,
            original: self.original,
            result_columns: self.result_columns,
            table_id: self.table_id,
            alias: self.alias.clone(),
        }
    }
}

impl Operator for Aggregator {
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
        Ok(PlanOp::Aggregator(
            self.clone_with_source(single_input(NAME, inputs)?),
        ))
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
        mut expr: AliasedExpr,
        _reuse: bool,
        add_to_group_by: bool,
    ) -> PlannerResult<AddedColumn> {
        if let Some(offset) = self.find_col(ctx, &expr.expr)? {
            return Ok(AddedColumn::at(offset));
        }
        if let Some(derived) = self.derived_table(ctx)? {
            expr.expr = Arc::new(rewrite_derived_table_expression(&expr.expr, derived));
        }

        // offsets from above are only stable once ours are settled
        self.plan_offsets(ctx)?;

        if let Some(offset) = can_reuse_column(ctx, &self.columns, &expr.expr) {
            return Ok(AddedColumn::at(offset));
        }
        if let Expr::Column(col) = expr.expr.as_ref() {
            let by_alias = self
                .columns
                .iter()
                .position(|c| c.alias.as_deref().is_some_and(|a| col.name_equals(a)));
            if let Some(offset) = by_alias {
                return Ok(AddedColumn::at(offset));
            }
        }

        if add_to_group_by {
            return Err(ctx.invariant_violation("did not expect to add group by here"));
        }

        // a weight string of an existing key becomes that key's weight string
        let mut add_to_group_by = false;
        if let Expr::WeightString(inner) = expr.expr.as_ref() {
            let next = self.columns.len();
            if let Some(gb) = self
                .grouping
                .iter_mut()
                .find(|gb| ctx.sem_table.equals_expr_with_deps(inner, &gb.simplified))
            {
                gb.ws_offset = Some(next);
                add_to_group_by = true;
            }
        }

        if !add_to_group_by {
            let alias = expr.alias_str().to_string();
            let mut aggr = Aggr::new(AggregateOpcode::AnyValue, None, expr.clone(), alias);
            aggr.col_offset = Some(self.columns.len());
            self.aggregations.push(aggr);
        }

        let expected = self.columns.len();
        self.columns.push(expr.clone());
        let offset = self.source.add_column(ctx, expr, false, add_to_group_by)?.offset;
        if offset != expected {
            return Err(ctx.invariant_violation(format!(
                "the offset needs to be aligned here: want: {}, got: {}",
                expected, offset
            )));
        }
        Ok(AddedColumn::at(offset))
    }

    fn get_columns(&mut self) -> PlannerResult<Vec<AliasedExpr>> {
        if matches!(*self.source, PlanOp::Horizon(_)) {
            return Ok(self.columns.clone());
        }

        // the source may have grown columns through later rewrites
        let below = self.source.get_columns()?;
        if below.len() > self.columns.len() {
            self.columns.extend_from_slice(&below[self.columns.len()..]);
        }
        Ok(self.columns.clone())
    }

    fn get_ordering(&self) -> PlannerResult<Vec<OrderBy>> {
        self.source.get_ordering()
    }

    fn tables_used(&self) -> Vec<String> {
        self.source.tables_used()
    }

    fn short_description(&self) -> String {
        let org = if self.original { "ORG " } else { "" };
        let mut columns = join_columns(&self.columns);
        if let Some(alias) = &self.alias {
            columns = if columns.is_empty() {
                format!("derived[{}]", alias)
            } else {
                format!("derived[{}], {}", alias, columns)
            };
        }

        if self.grouping.is_empty() {
            return format!("{}{}", org, columns);
        }
        let grouping: Vec<String> = self
            .grouping
            .iter()
            .map(|gb| gb.simplified.to_string())
            .collect();
        format!("{}{} group by {}", org, columns, grouping.join(","))
    }

    fn introduces_table_id(&self) -> TableSet {
        self.table_id.unwrap_or_default()
    }
}
