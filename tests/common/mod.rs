//! Shared fixtures for the integration tests

#![allow(dead_code)]

use shardplan::operators::{PlanOp, Projection, Table};
use shardplan::planner::PlannerConfig;
use shardplan::semantics::{ColumnType, SemTable, TableSet};

/// Semantic tables for `user(id, name, email)` and `music(music_id, user_id)`
pub struct Fixture {
    pub sem: SemTable,
    pub config: PlannerConfig,
    pub user: TableSet,
    pub music: TableSet,
}

impl Fixture {
    pub fn new() -> Self {
        let mut sem = SemTable::new();
        let user = sem.add_table("user", Some("u")).unwrap();
        sem.add_column(user, "id", ColumnType::Numeric).unwrap();
        sem.add_column(user, "name", ColumnType::text()).unwrap();
        sem.add_column(user, "email", ColumnType::collated("utf8mb4_0900_ai_ci"))
            .unwrap();

        let music = sem.add_table("music", None).unwrap();
        sem.add_column(music, "music_id", ColumnType::Numeric).unwrap();
        sem.add_column(music, "user_id", ColumnType::Numeric).unwrap();

        Self {
            sem,
            config: PlannerConfig::quiet(),
            user,
            music,
        }
    }

    /// Empty projection over the user table
    pub fn user_projection(&self) -> PlanOp {
        Projection::new(Table::new(self.user, "user").into()).into()
    }
}
