//! Per-query planning context

use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::semantics::SemanticTables;

use super::config::PlannerConfig;
use super::errors::PlannerError;

/// Everything an operator may consult while being planned
///
/// One context per query. It is shared immutably by every operator call of
/// that query's planning pass.
pub struct PlanningContext<'a> {
    pub sem_table: &'a dyn SemanticTables,
    pub config: &'a PlannerConfig,
    metrics: Option<&'a MetricsRegistry>,
    plan_id: Uuid,
}

impl<'a> PlanningContext<'a> {
    pub fn new(sem_table: &'a dyn SemanticTables, config: &'a PlannerConfig) -> Self {
        Self {
            sem_table,
            config,
            metrics: None,
            plan_id: Uuid::new_v4(),
        }
    }

    /// Attach a metrics registry the finalize pass reports into
    pub fn with_metrics(mut self, metrics: &'a MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn plan_id(&self) -> Uuid {
        self.plan_id
    }

    pub fn metrics(&self) -> Option<&'a MetricsRegistry> {
        self.metrics
    }

    /// Builds an invariant-violation error and reports it.
    ///
    /// With `abort_on_invariant_violation` set, debug builds panic here so the
    /// failing call is on the stack.
    pub fn invariant_violation(&self, reason: impl Into<String>) -> PlannerError {
        let err = self.report(PlannerError::invariant_violation(reason), log_event_with_fields);
        if cfg!(debug_assertions) && self.config.abort_on_invariant_violation {
            panic!("planner invariant violated: {}", err);
        }
        err
    }

    /// Counts a planner bug and hands its event to `log` when planning logs
    /// are on. Each error is reported at most once.
    pub(crate) fn report<L>(&self, err: PlannerError, log: L) -> PlannerError
    where
        L: FnOnce(Event, &[(&str, &str)]),
    {
        if err.is_reported() {
            return err;
        }
        if self.config.log_planning {
            let plan_id = self.plan_id.to_string();
            log(
                Event::PlanInvariantViolation,
                &[("plan_id", plan_id.as_str()), ("reason", err.message())],
            );
        }
        if let Some(metrics) = self.metrics {
            metrics.increment_invariant_violations();
        }
        err.mark_reported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannerErrorCode;
    use crate::semantics::SemTable;

    #[test]
    fn test_invariant_violation_is_counted() {
        let sem = SemTable::new();
        let config = PlannerConfig::quiet();
        let metrics = MetricsRegistry::new();
        let ctx = PlanningContext::new(&sem, &config).with_metrics(&metrics);

        let err = ctx.invariant_violation("offset drift");
        assert_eq!(err.code(), PlannerErrorCode::InvariantViolation);
        assert_eq!(err.message(), "offset drift");
        assert_eq!(metrics.invariant_violations(), 1);
    }

    #[test]
    fn test_quiet_config_counts_without_logging() {
        let sem = SemTable::new();
        let config = PlannerConfig::quiet();
        let metrics = MetricsRegistry::new();
        let ctx = PlanningContext::new(&sem, &config).with_metrics(&metrics);

        let mut logged = Vec::new();
        let err = ctx.report(PlannerError::invariant_violation("x"), |event, _| {
            logged.push(event)
        });

        assert!(logged.is_empty());
        assert!(err.is_reported());
        assert_eq!(metrics.invariant_violations(), 1);
    }

    #[test]
    fn test_report_logs_when_enabled() {
        let sem = SemTable::new();
        let config = PlannerConfig::default();
        let ctx = PlanningContext::new(&sem, &config);

        let mut logged = Vec::new();
        ctx.report(PlannerError::arity("Route", 1, 0), |event, fields| {
            let reason = fields.iter().find(|(k, _)| *k == "reason").map(|(_, v)| v.to_string());
            logged.push((event, reason));
        });

        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].0, Event::PlanInvariantViolation);
        assert!(logged[0].1.as_deref().unwrap().contains("want 1, got 0"));
    }

    #[test]
    fn test_reported_error_is_not_counted_twice() {
        let sem = SemTable::new();
        let config = PlannerConfig::quiet();
        let metrics = MetricsRegistry::new();
        let ctx = PlanningContext::new(&sem, &config).with_metrics(&metrics);

        let err = ctx.invariant_violation("offset drift");
        let err = ctx.report(err, |_, _| {});
        assert!(err.is_reported());
        assert_eq!(metrics.invariant_violations(), 1);
    }

    #[test]
    fn test_plan_ids_are_unique() {
        let sem = SemTable::new();
        let config = PlannerConfig::quiet();
        let a = PlanningContext::new(&sem, &config);
        let b = PlanningContext::new(&sem, &config);
        assert_ne!(a.plan_id(), b.plan_id());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "planner invariant violated")]
    fn test_abort_on_invariant_violation() {
        let sem = SemTable::new();
        let config = PlannerConfig {
            abort_on_invariant_violation: true,
            ..PlannerConfig::quiet()
        };
        let ctx = PlanningContext::new(&sem, &config);
        let _ = ctx.invariant_violation("boom");
    }
}
