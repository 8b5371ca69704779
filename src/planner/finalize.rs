//! Finalize pass
//!
//! Last step before a plan leaves the planner: every vindex leaf must hold a
//! routing value and every aggregator must have its offsets resolved.
//! Inputs are finalized before their parents so an aggregator sees a settled
//! source.

use crate::observability::{log_event_with_fields, Event, ObservationScope, Timer};
use crate::operators::PlanOp;

use super::context::PlanningContext;
use super::errors::PlannerResult;

/// Runs the finalize pass over `root`
pub fn finalize(ctx: &PlanningContext<'_>, root: &mut PlanOp) -> PlannerResult<()> {
    run_pass(ctx, root, &mut |op| match op {
        PlanOp::Vindex(vindex) => vindex.check_valid(),
        PlanOp::Aggregator(aggr) => aggr.plan_offsets(ctx),
        _ => Ok(()),
    })
}

fn run_pass<F>(ctx: &PlanningContext<'_>, root: &mut PlanOp, visit: &mut F) -> PlannerResult<()>
where
    F: FnMut(&mut PlanOp) -> PlannerResult<()>,
{
    let plan_id = ctx.plan_id().to_string();
    let timer = Timer::new();
    let scope = ctx
        .config
        .log_planning
        .then(|| ObservationScope::with_fields("PLAN_FINALIZE", &[("plan_id", plan_id.as_str())]));

    // bugs raised without a context reach the counters here
    let result = root.visit_post_order(visit).map_err(|err| {
        if err.is_planner_bug() {
            ctx.report(err, log_event_with_fields)
        } else {
            err
        }
    });

    match &result {
        Ok(()) => {
            if let Some(metrics) = ctx.metrics() {
                metrics.increment_plans_finalized();
            }
            if let Some(scope) = scope {
                let operators = root.count().to_string();
                let duration = timer.elapsed_us();
                scope.complete_with_fields(&[
                    ("operators", operators.as_str()),
                    ("duration_us", duration.as_str()),
                ]);
            }
        }
        Err(err) if err.is_planner_bug() => {
            if let Some(scope) = scope {
                scope.fail_fatal(&err.to_string());
            }
        }
        Err(err) => {
            if let Some(metrics) = ctx.metrics() {
                metrics.increment_plans_rejected();
            }
            if let Some(scope) = scope {
                log_event_with_fields(
                    Event::PlanRejected,
                    &[("plan_id", plan_id.as_str()), ("code", err.code().code())],
                );
                scope.fail(err.message());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsRegistry;
    use crate::operators::{
        Aggregator, Operator, Projection, Route, RouteOpcode, Table, Vindex, VindexTable,
    };
    use crate::planner::{PlannerConfig, PlannerErrorCode};
    use crate::semantics::{ColumnType, SemTable};
    use crate::sql::{AliasedExpr, Expr};

    #[test]
    fn test_finalize_plans_nested_aggregator() {
        let mut sem = SemTable::new();
        let user = sem.add_table("user", None).unwrap();
        sem.add_column(user, "name", ColumnType::text()).unwrap();
        let config = PlannerConfig::quiet();
        let metrics = MetricsRegistry::new();
        let ctx = PlanningContext::new(&sem, &config).with_metrics(&metrics);

        let mut aggr = Aggregator::new(Projection::new(Table::new(user, "user").into()).into(), true);
        aggr.add_column_without_pushing(AliasedExpr::new(Expr::col("name")), true)
            .unwrap();
        let mut root: PlanOp = Route::new(aggr.into(), RouteOpcode::Scatter, "ks").into();

        finalize(&ctx, &mut root).unwrap();

        let PlanOp::Route(route) = &root else {
            panic!("expected route at the root");
        };
        let aggr = route.source().as_aggregator().unwrap();
        assert!(aggr.is_offset_planned());
        assert_eq!(aggr.grouping()[0].ws_offset, Some(1));
        assert_eq!(metrics.plans_finalized(), 1);
    }

    #[test]
    fn test_uncounted_bug_is_counted_once() {
        let mut sem = SemTable::new();
        let user = sem.add_table("user", None).unwrap();
        let config = PlannerConfig::quiet();
        let metrics = MetricsRegistry::new();
        let ctx = PlanningContext::new(&sem, &config).with_metrics(&metrics);

        // a projection cloned without inputs fails its arity check
        let mut root: PlanOp = Projection::new(Table::new(user, "user").into()).into();
        let err = run_pass(&ctx, &mut root, &mut |op| op.clone_with(Vec::new()).map(drop))
            .unwrap_err();

        assert!(err.is_planner_bug());
        assert!(err.is_reported());
        assert_eq!(metrics.invariant_violations(), 1);
        assert_eq!(metrics.plans_rejected(), 0);
    }

    #[test]
    fn test_context_raised_bug_is_not_recounted() {
        let mut sem = SemTable::new();
        let user = sem.add_table("user", None).unwrap();
        sem.add_column(user, "name", ColumnType::text()).unwrap();
        let config = PlannerConfig::quiet();
        let metrics = MetricsRegistry::new();
        let ctx = PlanningContext::new(&sem, &config).with_metrics(&metrics);

        // grouping pushed straight into a table
        let mut aggr = Aggregator::new(Table::new(user, "user").into(), true);
        aggr.add_column_without_pushing(AliasedExpr::new(Expr::col("name")), true)
            .unwrap();
        let mut root: PlanOp = aggr.into();

        let err = finalize(&ctx, &mut root).unwrap_err();
        assert!(err.is_reported());
        assert_eq!(metrics.invariant_violations(), 1);
    }

    #[test]
    fn test_finalize_rejects_vindex_without_predicate() {
        let mut sem = SemTable::new();
        let t = sem.add_table("user_index", None).unwrap();
        let config = PlannerConfig::quiet();
        let metrics = MetricsRegistry::new();
        let ctx = PlanningContext::new(&sem, &config).with_metrics(&metrics);

        let mut root: PlanOp = Vindex::new(VindexTable::new(t, "user_index"), "hash").into();
        let err = finalize(&ctx, &mut root).unwrap_err();

        assert_eq!(err.code(), PlannerErrorCode::UnsupportedPushDown);
        assert_eq!(metrics.plans_rejected(), 1);
        assert_eq!(metrics.plans_finalized(), 0);
    }
}
