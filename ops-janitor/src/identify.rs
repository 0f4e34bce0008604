use ops_common::filter::{Filter, Pattern};
use ops_common::store::{decode_rows, DataStore};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::JanitorError;
use crate::metrics_consts::{DEMO_TEAMS_FOUND, DEMO_USERS_FOUND};

pub const USERS_TABLE: &str = "users";
pub const TEAMS_TABLE: &str = "teams";

/// Ids come back as uuid strings or integers depending on the table; we carry them as text.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DemoUser {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DemoTeam {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub leader_id: Option<String>,
}

/// Result of a demo-data check: every account and team classified as demo.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DemoData {
    pub users: Vec<DemoUser>,
    pub teams: Vec<DemoTeam>,
}

impl DemoData {
    pub fn has_demo_data(&self) -> bool {
        !self.users.is_empty() || !self.teams.is_empty()
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.users.iter().map(|user| user.id.clone()).collect()
    }

    pub fn team_ids(&self) -> Vec<String> {
        self.teams.iter().map(|team| team.id.clone()).collect()
    }
}

/// The naming heuristics that mark an account or a team as demo data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoPatterns {
    /// Matched anywhere in an email or team name, ignoring case.
    pub substrings: Vec<String>,
    /// Matched at the end of an email, ignoring case.
    pub email_suffixes: Vec<String>,
    /// Team names matched exactly.
    pub team_names: Vec<String>,
}

impl Default for DemoPatterns {
    fn default() -> Self {
        Self {
            substrings: vec!["demo".to_owned(), "test".to_owned(), "sample".to_owned()],
            email_suffixes: vec!["@demo.edu".to_owned(), "@test.edu".to_owned()],
            team_names: vec!["Sample Team".to_owned()],
        }
    }
}

impl DemoPatterns {
    fn email_patterns(&self) -> Vec<Pattern> {
        self.email_suffixes
            .iter()
            .map(|suffix| Pattern::ends_with("email", suffix))
            .chain(
                self.substrings
                    .iter()
                    .map(|needle| Pattern::contains("email", needle)),
            )
            .collect()
    }

    fn team_patterns(&self) -> Vec<Pattern> {
        self.substrings
            .iter()
            .map(|needle| Pattern::contains("name", needle))
            .chain(self.team_names.iter().map(|name| Pattern::equals("name", name)))
            .collect()
    }

    pub fn email_filter(&self) -> Filter {
        Filter::AnyOf(self.email_patterns())
    }

    pub fn team_filter(&self) -> Filter {
        Filter::AnyOf(self.team_patterns())
    }

    pub fn is_demo_email(&self, email: &str) -> bool {
        self.email_patterns().iter().any(|p| p.matches_text(email))
    }

    pub fn is_demo_team_name(&self, name: &str) -> bool {
        self.team_patterns().iter().any(|p| p.matches_text(name))
    }
}

/// Find every account and team matching the demo heuristics. Read only.
///
/// Rows returned by the store are classified again locally, so a store that ignores or
/// widens the filter can never grow the set of rows handed to a purge.
pub async fn find_demo_data(
    store: &dyn DataStore,
    patterns: &DemoPatterns,
) -> Result<DemoData, JanitorError> {
    let email_filter = patterns.email_filter();
    let users = match &email_filter {
        Filter::AnyOf(list) if list.is_empty() => vec![],
        _ => {
            let rows = store
                .select(USERS_TABLE, "id,email,name", &email_filter)
                .await
                .map_err(|error| JanitorError::QueryError {
                    table: USERS_TABLE,
                    error,
                })?;
            decode_rows::<DemoUser>(USERS_TABLE, rows)
                .map_err(|error| JanitorError::QueryError {
                    table: USERS_TABLE,
                    error,
                })?
                .into_iter()
                .filter(|user| {
                    user.email
                        .as_deref()
                        .is_some_and(|email| patterns.is_demo_email(email))
                })
                .collect()
        }
    };

    let team_filter = patterns.team_filter();
    let teams = match &team_filter {
        Filter::AnyOf(list) if list.is_empty() => vec![],
        _ => {
            let rows = store
                .select(TEAMS_TABLE, "id,name,leader_id", &team_filter)
                .await
                .map_err(|error| JanitorError::QueryError {
                    table: TEAMS_TABLE,
                    error,
                })?;
            decode_rows::<DemoTeam>(TEAMS_TABLE, rows)
                .map_err(|error| JanitorError::QueryError {
                    table: TEAMS_TABLE,
                    error,
                })?
                .into_iter()
                .filter(|team| {
                    team.name
                        .as_deref()
                        .is_some_and(|name| patterns.is_demo_team_name(name))
                })
                .collect()
        }
    };

    let data = DemoData { users, teams };
    metrics::gauge!(DEMO_USERS_FOUND).set(data.users.len() as f64);
    metrics::gauge!(DEMO_TEAMS_FOUND).set(data.teams.len() as f64);
    info!(
        users = data.users.len(),
        teams = data.teams.len(),
        "demo data check complete"
    );

    Ok(data)
}
