use ops_common::store::DataStore;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::identify::{find_demo_data, DemoData, DemoPatterns};
use crate::metrics_consts::CLEANUP_RUNS;
use crate::purge::{purge, PurgeReport, PurgeTarget};

/// Stages of a full cleanup run. A run only ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStage {
    Idle,
    Checking,
    NoDemoData,
    CleaningTeams,
    CleaningUsers,
    Verifying,
    Done,
}

/// Outcome of the check that runs after both purges.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Verified { remaining: DemoData },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// The initial check failed; nothing was deleted.
    CheckFailed { error: String },
    /// The initial check found nothing; nothing was deleted.
    NothingToClean { check: DemoData },
    Cleaned {
        initial: DemoData,
        teams: PurgeReport,
        users: PurgeReport,
        verification: Verification,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    /// True exactly when the last check that ran found no demo account or team.
    pub success: bool,
    pub message: String,
    /// Every stage the run went through, in order.
    pub stages: Vec<CleanupStage>,
    #[serde(flatten)]
    pub outcome: CleanupOutcome,
}

struct Run {
    stages: Vec<CleanupStage>,
}

impl Run {
    fn new() -> Self {
        Self {
            stages: vec![CleanupStage::Idle],
        }
    }

    fn enter(&mut self, stage: CleanupStage) {
        info!(from = ?self.stages.last(), to = ?stage, "cleanup stage");
        self.stages.push(stage);
    }

    fn finish(mut self, success: bool, message: String, outcome: CleanupOutcome) -> CleanupReport {
        self.enter(CleanupStage::Done);
        let result = if success { "success" } else { "failure" };
        metrics::counter!(CLEANUP_RUNS, &[("result", result.to_owned())]).increment(1);

        CleanupReport {
            success,
            message,
            stages: self.stages,
            outcome,
        }
    }
}

/// Remove all demo data: check, purge teams, purge users, check again.
///
/// Teams go first because team rows reference accounts through their leader. The run is
/// successful when the final check finds no demo data left, whatever individual delete steps
/// reported along the way.
pub async fn run_full_cleanup(store: &dyn DataStore, patterns: &DemoPatterns) -> CleanupReport {
    let mut run = Run::new();

    run.enter(CleanupStage::Checking);
    let initial = match find_demo_data(store, patterns).await {
        Ok(data) => data,
        Err(e) => {
            error!("initial demo data check failed: {}", e);
            return run.finish(
                false,
                format!("demo data check failed: {e}"),
                CleanupOutcome::CheckFailed {
                    error: e.to_string(),
                },
            );
        }
    };

    if !initial.has_demo_data() {
        run.enter(CleanupStage::NoDemoData);
        return run.finish(
            true,
            "no demo data found, nothing to clean".to_owned(),
            CleanupOutcome::NothingToClean { check: initial },
        );
    }

    run.enter(CleanupStage::CleaningTeams);
    let teams = purge(store, PurgeTarget::Teams, &initial.team_ids()).await;

    run.enter(CleanupStage::CleaningUsers);
    let users = purge(store, PurgeTarget::Users, &initial.user_ids()).await;

    run.enter(CleanupStage::Verifying);
    let verification = match find_demo_data(store, patterns).await {
        Ok(remaining) => Verification::Verified { remaining },
        Err(e) => {
            error!("verification check failed: {}", e);
            Verification::Failed {
                error: e.to_string(),
            }
        }
    };

    let (success, message) = match &verification {
        Verification::Verified { remaining } if !remaining.has_demo_data() => (
            true,
            format!(
                "removed {} demo accounts and {} demo teams",
                initial.users.len(),
                initial.teams.len()
            ),
        ),
        Verification::Verified { remaining } => {
            warn!(
                users = remaining.users.len(),
                teams = remaining.teams.len(),
                "demo data remains after cleanup"
            );
            (
                false,
                format!(
                    "{} demo accounts and {} demo teams remain after cleanup",
                    remaining.users.len(),
                    remaining.teams.len()
                ),
            )
        }
        Verification::Failed { error } => {
            (false, format!("could not verify cleanup: {error}"))
        }
    };

    run.finish(
        success,
        message,
        CleanupOutcome::Cleaned {
            initial,
            teams,
            users,
            verification,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use ops_common::test_utils::{MemoryStore, StoreOp};
    use serde_json::json;

    #[tokio::test]
    async fn test_no_demo_data_means_no_deletes() {
        let store = MemoryStore::new().with_rows(
            "users",
            vec![json!({"id": "u1", "email": "ceo@company.com"})],
        );

        let report = run_full_cleanup(&store, &DemoPatterns::default()).await;

        assert!(report.success);
        assert!(store.deleted_tables().is_empty());
        assert_eq!(
            report.stages,
            vec![
                CleanupStage::Idle,
                CleanupStage::Checking,
                CleanupStage::NoDemoData,
                CleanupStage::Done
            ]
        );
        assert!(matches!(report.outcome, CleanupOutcome::NothingToClean { .. }));
    }

    #[tokio::test]
    async fn test_check_failure_stops_the_run() {
        let store = MemoryStore::new();
        store.fail_on(StoreOp::Select, "users", "service unavailable");

        let report = run_full_cleanup(&store, &DemoPatterns::default()).await;

        assert!(!report.success);
        assert!(store.deleted_tables().is_empty());
        assert_eq!(
            report.stages,
            vec![CleanupStage::Idle, CleanupStage::Checking, CleanupStage::Done]
        );
        match report.outcome {
            CleanupOutcome::CheckFailed { error } => assert!(error.contains("service unavailable")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_teams_are_purged_before_users() {
        let store = MemoryStore::new()
            .with_rows("users", vec![json!({"id": "u1", "email": "a@demo.edu"})])
            .with_rows(
                "teams",
                vec![json!({"id": "t1", "name": "Demo Team", "leader_id": "u1"})],
            );

        let report = run_full_cleanup(&store, &DemoPatterns::default()).await;

        assert!(report.success);
        assert_eq!(
            store.deleted_tables(),
            vec![
                "submissions",
                "payments",
                "team_members",
                "teams",
                "notifications",
                "payments",
                "team_members",
                "teams",
                "users"
            ]
        );
        assert_eq!(
            report.stages,
            vec![
                CleanupStage::Idle,
                CleanupStage::Checking,
                CleanupStage::CleaningTeams,
                CleanupStage::CleaningUsers,
                CleanupStage::Verifying,
                CleanupStage::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_success_depends_on_final_check_only() {
        // The users delete fails, so the demo account survives and the run must fail even
        // though every other step succeeded.
        let store = MemoryStore::new()
            .with_rows("users", vec![json!({"id": "u1", "email": "a@demo.edu"})]);
        store.fail_on(StoreOp::Delete, "users", "permission denied for table users");

        let report = run_full_cleanup(&store, &DemoPatterns::default()).await;

        assert!(!report.success);
        match &report.outcome {
            CleanupOutcome::Cleaned {
                users,
                verification,
                ..
            } => {
                assert!(!users.success());
                assert!(
                    matches!(verification, Verification::Verified { remaining } if remaining.users.len() == 1)
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        // A failing dependent step that leaves no demo rows behind still counts as success.
        let store = MemoryStore::new()
            .with_rows("users", vec![json!({"id": "u1", "email": "a@demo.edu"})]);
        store.fail_on(StoreOp::Delete, "notifications", "relation does not exist");

        let report = run_full_cleanup(&store, &DemoPatterns::default()).await;
        assert!(report.success);
    }

    #[tokio::test]
    async fn test_report_serializes_every_stage() {
        let store = MemoryStore::new()
            .with_rows("users", vec![json!({"id": "u1", "email": "a@demo.edu"})]);

        let report = run_full_cleanup(&store, &DemoPatterns::default()).await;
        let value = serde_json::to_value(&report).unwrap();

        assert_json_include!(
            actual: value,
            expected: json!({
                "success": true,
                "outcome": "cleaned",
                "teams": {"target": "teams", "nothing_to_clean": true, "steps": []},
                "users": {"target": "users", "cleaned_ids": ["u1"], "nothing_to_clean": false},
                "verification": {"status": "verified", "remaining": {"users": [], "teams": []}},
                "stages": ["idle", "checking", "cleaning_teams", "cleaning_users", "verifying", "done"]
            })
        );
    }
}
