//! Dependency-ordered bulk delete.
//!
//! Rows referencing a primary key are removed before the row itself so the store's foreign
//! keys are never violated. The order is a fixed list per entity kind. Every step is an
//! independent remote command: a failing step is recorded and the remaining steps still run.

use ops_common::filter::Filter;
use ops_common::store::DataStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::JanitorError;
use crate::identify::{find_demo_data, DemoPatterns};
use crate::metrics_consts::{PURGE_ROWS_DELETED, PURGE_STARTS, PURGE_STEPS};

/// Delete the rows of `table` whose `column` is one of the purged keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteStep {
    pub table: &'static str,
    pub column: &'static str,
}

const fn step(table: &'static str, column: &'static str) -> DeleteStep {
    DeleteStep { table, column }
}

pub const USER_DELETE_ORDER: [DeleteStep; 5] = [
    step("notifications", "user_id"),
    step("payments", "user_id"),
    step("team_members", "user_id"),
    step("teams", "leader_id"),
    step("users", "id"),
];

pub const TEAM_DELETE_ORDER: [DeleteStep; 4] = [
    step("submissions", "team_id"),
    step("payments", "team_id"),
    step("team_members", "team_id"),
    step("teams", "id"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeTarget {
    Users,
    Teams,
}

impl PurgeTarget {
    pub fn steps(&self) -> &'static [DeleteStep] {
        match self {
            PurgeTarget::Users => &USER_DELETE_ORDER,
            PurgeTarget::Teams => &TEAM_DELETE_ORDER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeTarget::Users => "users",
            PurgeTarget::Teams => "teams",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub table: &'static str,
    pub column: &'static str,
    pub success: bool,
    /// Rows the store reported as deleted. Zero when the step failed.
    pub deleted: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurgeReport {
    pub target: PurgeTarget,
    pub cleaned_ids: Vec<String>,
    pub nothing_to_clean: bool,
    pub steps: Vec<StepOutcome>,
}

impl PurgeReport {
    /// True when every step went through. An empty purge trivially succeeds.
    pub fn success(&self) -> bool {
        self.steps.iter().all(|step| step.success)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|step| !step.success)
    }

    pub fn deleted_rows(&self) -> usize {
        self.steps.iter().map(|step| step.deleted).sum()
    }
}

/// Delete `ids` of `target` and everything referencing them, in dependency order.
pub async fn purge(store: &dyn DataStore, target: PurgeTarget, ids: &[String]) -> PurgeReport {
    if ids.is_empty() {
        info!(target = target.as_str(), "nothing to clean");
        return PurgeReport {
            target,
            cleaned_ids: vec![],
            nothing_to_clean: true,
            steps: vec![],
        };
    }

    metrics::counter!(PURGE_STARTS, &[("target", target.as_str().to_owned())]).increment(1);
    info!(target = target.as_str(), ids = ids.len(), "purging");

    let mut steps = Vec::with_capacity(target.steps().len());
    for delete_step in target.steps() {
        let filter = Filter::is_in(delete_step.column, ids);
        let outcome = match store.delete(delete_step.table, &filter).await {
            Ok(deleted) => StepOutcome {
                table: delete_step.table,
                column: delete_step.column,
                success: true,
                deleted: deleted.len(),
                error: None,
            },
            Err(error) => {
                warn!(
                    table = delete_step.table,
                    column = delete_step.column,
                    "delete step failed, continuing: {}",
                    error
                );
                StepOutcome {
                    table: delete_step.table,
                    column: delete_step.column,
                    success: false,
                    deleted: 0,
                    error: Some(error.to_string()),
                }
            }
        };

        let labels = [
            ("target", target.as_str().to_owned()),
            ("table", delete_step.table.to_owned()),
            ("success", outcome.success.to_string()),
        ];
        metrics::counter!(PURGE_STEPS, &labels).increment(1);
        metrics::counter!(PURGE_ROWS_DELETED, &labels).increment(outcome.deleted as u64);

        steps.push(outcome);
    }

    let report = PurgeReport {
        target,
        cleaned_ids: ids.to_vec(),
        nothing_to_clean: false,
        steps,
    };
    info!(
        target = target.as_str(),
        deleted = report.deleted_rows(),
        failed_steps = report.failed_steps().count(),
        "purge finished"
    );
    report
}

/// Identify demo accounts and purge them.
pub async fn cleanup_demo_users(
    store: &dyn DataStore,
    patterns: &DemoPatterns,
) -> Result<PurgeReport, JanitorError> {
    let data = find_demo_data(store, patterns).await?;
    Ok(purge(store, PurgeTarget::Users, &data.user_ids()).await)
}

/// Identify demo teams and purge them.
pub async fn cleanup_demo_teams(
    store: &dyn DataStore,
    patterns: &DemoPatterns,
) -> Result<PurgeReport, JanitorError> {
    let data = find_demo_data(store, patterns).await?;
    Ok(purge(store, PurgeTarget::Teams, &data.team_ids()).await)
}
