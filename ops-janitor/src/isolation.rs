//! Checks that the row-level security policies only hand a user their own rows.

use ops_common::filter::Filter;
use ops_common::store::DataStore;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// Tables carrying a `user_id` that must only ever be visible to that user.
pub const USER_SCOPED_TABLES: [&str; 3] = ["team_members", "payments", "notifications"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableIsolation {
    /// Every visible row belongs to the caller.
    Scoped { rows: usize },
    /// Rows of other users came back.
    Leaked { foreign_rows: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCheck {
    pub table: &'static str,
    #[serde(flatten)]
    pub isolation: TableIsolation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsolationReport {
    pub user_id: String,
    pub verified: bool,
    pub tables: Vec<TableCheck>,
}

fn owner(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Query each user scoped table as the caller and count rows that belong to someone else.
///
/// `store` must be authenticated as `user_id`, otherwise the policies under test are bypassed.
pub async fn check_isolation(store: &dyn DataStore, user_id: &str) -> IsolationReport {
    let filter = Filter::eq("user_id", user_id);
    let mut tables = Vec::with_capacity(USER_SCOPED_TABLES.len());

    for table in USER_SCOPED_TABLES {
        let isolation = match store.select(table, "*", &filter).await {
            Ok(rows) => {
                let foreign_rows = rows
                    .iter()
                    .filter(|row| owner(row.get("user_id")).as_deref() != Some(user_id))
                    .count();
                if foreign_rows == 0 {
                    TableIsolation::Scoped { rows: rows.len() }
                } else {
                    warn!(table, foreign_rows, "rows of other users are visible");
                    TableIsolation::Leaked { foreign_rows }
                }
            }
            Err(e) => {
                warn!(table, "isolation query failed: {}", e);
                TableIsolation::Failed {
                    error: e.to_string(),
                }
            }
        };
        tables.push(TableCheck { table, isolation });
    }

    let verified = tables
        .iter()
        .all(|check| matches!(check.isolation, TableIsolation::Scoped { .. }));
    info!(verified, "isolation check complete");

    IsolationReport {
        user_id: user_id.to_owned(),
        verified,
        tables,
    }
}
