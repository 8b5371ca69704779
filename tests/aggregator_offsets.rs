//! Aggregator offset planning
//!
//! - Output columns are pushed in column order and land on their own offset
//! - Key columns and weight strings outside the output are appended after it
//! - Offsets handed out stay valid once planning has run

mod common;

use common::Fixture;
use shardplan::operators::{
    Aggregator, GroupBy, Operator, PlanOp, Projection, Route, RouteOpcode, Table,
};
use shardplan::planner::PlanningContext;
use shardplan::sql::{weight_string_for, AggrName, AliasedExpr, Expr};

// =============================================================================
// Not-pushed planning
// =============================================================================

/// count(*) alone pushes the literal 1 and duplicates nothing.
#[test]
fn test_count_star_pushes_one_without_duplication() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let mut aggr = Aggregator::new(fx.user_projection(), true);
    let offset = aggr
        .add_column_without_pushing(AliasedExpr::new(Expr::count_star()), false)
        .unwrap();
    assert_eq!(offset, 0);
    let before = aggr.get_columns().unwrap().len();

    aggr.plan_offsets(&ctx).unwrap();

    let pushed = aggr.source().as_projection().unwrap().columns();
    assert_eq!(pushed.len(), 1);
    assert_eq!(*pushed[0].expr, Expr::int(1));
    assert_eq!(aggr.aggregations()[0].col_offset, Some(0));
    assert_eq!(aggr.get_columns().unwrap().len(), before);
}

/// Columns reach the source in output order, whatever order the grouping
/// and aggregation lists are in.
#[test]
fn test_columns_pushed_in_output_order() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let mut aggr = Aggregator::new(fx.user_projection(), true);
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::count_star()), false)
        .unwrap();
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::col("email")), true)
        .unwrap();
    aggr.add_column_without_pushing(
        AliasedExpr::new(Expr::aggregate(AggrName::Max, Expr::col("name"))),
        false,
    )
    .unwrap();

    aggr.plan_offsets(&ctx).unwrap();

    let pushed: Vec<Expr> = aggr
        .source()
        .as_projection()
        .unwrap()
        .columns()
        .iter()
        .map(|c| (*c.expr).clone())
        .collect();
    assert_eq!(
        pushed,
        vec![
            Expr::int(1),
            Expr::col("email"),
            Expr::col("name"),
            weight_string_for(&Expr::col("name")),
        ]
    );

    // collated key needs no weight string, max over plain text does
    assert_eq!(aggr.grouping()[0].col_offset, Some(1));
    assert_eq!(aggr.grouping()[0].ws_offset, None);
    assert_eq!(aggr.aggregations()[1].col_offset, Some(2));
    assert_eq!(aggr.aggregations()[1].ws_offset, Some(3));
    assert_eq!(aggr.get_columns().unwrap().len(), 4);
}

/// Every grouping entry has a column offset after planning, including keys
/// that were never part of the output.
#[test]
fn test_hidden_grouping_key_gets_offset() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let mut aggr = Aggregator::new(fx.user_projection(), true);
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::count_star()), false)
        .unwrap();
    aggr.add_grouping(GroupBy::from_expr(Expr::col("name")));

    aggr.plan_offsets(&ctx).unwrap();

    let gb = &aggr.grouping()[0];
    assert_eq!(gb.col_offset, Some(1));
    assert_eq!(gb.ws_offset, Some(2));
    assert!(aggr.grouping().iter().all(|gb| gb.col_offset.is_some()));
    assert_eq!(aggr.columns().len(), 3);
}

// =============================================================================
// Pushed planning
// =============================================================================

/// A pushed aggregator only asks for what its offsets do not cover yet.
#[test]
fn test_pushed_requests_missing_key_only() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let source = Projection::with_columns(
        Table::new(fx.user, "user").into(),
        vec![AliasedExpr::new(Expr::col("email"))],
    );
    let mut aggr = Aggregator::new(source.into(), false);
    aggr.set_pushed(true);
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::col("email")), true)
        .unwrap();
    aggr.add_grouping(GroupBy::from_expr(Expr::col("id")));

    aggr.plan_offsets(&ctx).unwrap();

    let pushed = aggr.source().as_projection().unwrap().columns();
    assert_eq!(pushed.len(), 2);
    assert_eq!(*pushed[1].expr, Expr::col("id"));
    assert_eq!(aggr.grouping()[0].col_offset, Some(0));
    assert_eq!(aggr.grouping()[1].col_offset, Some(1));
    assert_eq!(aggr.grouping()[1].ws_offset, None);
}

/// A pushed aggregator over a route asks for the weight strings of a text
/// key and of `max` over text; the key's weight string becomes a grouping
/// key of the shard-side aggregator.
#[test]
fn test_pushed_requests_weight_strings_as_grouping() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let shard_side = Aggregator::new(Table::new(fx.user, "user").into(), false);
    let mut route = Route::new(shard_side.into(), RouteOpcode::Scatter, "ks");
    let name = AliasedExpr::new(Expr::col("name"));
    let max_name = AliasedExpr::new(Expr::aggregate(AggrName::Max, Expr::col("name")));
    assert_eq!(route.add_column(&ctx, name.clone(), false, true).unwrap().offset, 0);
    assert_eq!(route.add_column(&ctx, max_name.clone(), false, false).unwrap().offset, 1);

    let mut aggr = Aggregator::new(route.into(), false);
    aggr.set_pushed(true);
    aggr.add_column_without_pushing(name, true).unwrap();
    aggr.add_column_without_pushing(max_name, false).unwrap();

    aggr.plan_offsets(&ctx).unwrap();

    let ws = weight_string_for(&Expr::col("name"));
    assert_eq!(aggr.grouping()[0].col_offset, Some(0));
    assert_eq!(aggr.grouping()[0].ws_offset, Some(2));
    assert_eq!(aggr.aggregations()[0].col_offset, Some(1));
    // max(name) compares the same weight string and reuses the column
    assert_eq!(aggr.aggregations()[0].ws_offset, Some(2));
    assert_eq!(*aggr.columns()[2].expr, ws);
    assert_eq!(aggr.columns().len(), 3);

    let PlanOp::Route(route) = aggr.source() else {
        panic!("expected the route to stay in place");
    };
    let below = route.source().as_aggregator().unwrap();
    let keys: Vec<Expr> = below.grouping().iter().map(|gb| (*gb.inner).clone()).collect();
    assert_eq!(keys, vec![Expr::col("name"), ws]);
    assert_eq!(below.grouping()[1].col_offset, Some(2));
    assert_eq!(below.aggregations().len(), 1);
}

/// A numeric column seen through a derived table needs no weight string.
#[test]
fn test_derived_numeric_key_has_no_weight_string() {
    let mut fx = Fixture::new();
    fx.sem
        .add_derived_table("dt", vec![("id".to_string(), Expr::col("id"))])
        .unwrap();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let mut aggr = Aggregator::new(fx.user_projection(), true);
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::qualified_col("dt", "id")), true)
        .unwrap();

    aggr.plan_offsets(&ctx).unwrap();

    assert_eq!(aggr.grouping()[0].col_offset, Some(0));
    assert_eq!(aggr.grouping()[0].ws_offset, None);
    assert_eq!(aggr.source().as_projection().unwrap().columns().len(), 1);
}

// =============================================================================
// Offset stability
// =============================================================================

/// Asking twice for the same key yields the same offset and no new column.
#[test]
fn test_repeated_column_returns_same_offset() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let mut aggr = Aggregator::new(fx.user_projection(), true);
    let first = aggr
        .add_column(&ctx, AliasedExpr::new(Expr::col("name")), true, false)
        .unwrap()
        .offset;
    let count = aggr.get_columns().unwrap().len();
    let second = aggr
        .add_column(&ctx, AliasedExpr::new(Expr::col("name")), true, false)
        .unwrap()
        .offset;

    assert_eq!(first, second);
    assert_eq!(aggr.get_columns().unwrap().len(), count);
}

/// Offsets returned before a later request still point at the same values.
#[test]
fn test_offsets_stable_after_planning() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let mut aggr = Aggregator::new(fx.user_projection(), true);
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::col("name")), true)
        .unwrap();
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::count_star()), false)
        .unwrap();
    aggr.plan_offsets(&ctx).unwrap();
    let before = aggr.get_columns().unwrap();

    let offset = aggr
        .add_column(&ctx, AliasedExpr::new(Expr::col("id")), true, false)
        .unwrap()
        .offset;
    let after = aggr.get_columns().unwrap();

    assert_eq!(offset, before.len());
    assert_eq!(&after[..before.len()], before.as_slice());
    assert_eq!(*after[offset].expr, Expr::col("id"));

    let source_columns = aggr.source().as_projection().unwrap().columns();
    assert_eq!(source_columns.len(), after.len());
}

/// Planning twice changes nothing.
#[test]
fn test_plan_offsets_twice() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let mut aggr = Aggregator::new(fx.user_projection(), true);
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::col("name")), true)
        .unwrap();
    aggr.plan_offsets(&ctx).unwrap();
    let snapshot = aggr.clone();

    aggr.plan_offsets(&ctx).unwrap();
    assert_eq!(aggr.columns(), snapshot.columns());
    assert_eq!(aggr.grouping(), snapshot.grouping());
    assert_eq!(aggr.aggregations(), snapshot.aggregations());
}

// =============================================================================
// Tree substitution
// =============================================================================

/// A clone with new inputs is planned independently of the original.
#[test]
fn test_clone_with_is_independent() {
    let fx = Fixture::new();
    let ctx = PlanningContext::new(&fx.sem, &fx.config);

    let mut aggr = Aggregator::new(fx.user_projection(), true);
    aggr.add_column_without_pushing(AliasedExpr::new(Expr::count_star()), false)
        .unwrap();
    let original: PlanOp = aggr.into();

    let mut copy = original.clone_with(vec![fx.user_projection()]).unwrap();
    copy.as_aggregator_mut().unwrap().plan_offsets(&ctx).unwrap();

    assert!(copy.as_aggregator().unwrap().is_offset_planned());
    let untouched = original.as_aggregator().unwrap();
    assert!(!untouched.is_offset_planned());
    assert!(untouched.source().as_projection().unwrap().columns().is_empty());
}

/// A clone needs exactly one input.
#[test]
fn test_clone_with_wrong_arity() {
    let fx = Fixture::new();
    let aggr: PlanOp = Aggregator::new(fx.user_projection(), true).into();

    let err = aggr.clone_with(Vec::new()).unwrap_err();
    assert!(err.is_planner_bug());
}
