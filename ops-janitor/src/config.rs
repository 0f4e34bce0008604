use std::str::FromStr;

use envconfig::Envconfig;
use ops_common::config::{CommaSeparated, NonEmptyString, StoreConfig};

use crate::error::JanitorError;
use crate::identify::DemoPatterns;

#[derive(Envconfig, Clone)]
pub struct Config {
    // Parsed into a `JanitorMode` at startup so an unknown mode fails loudly.
    #[envconfig(from = "JANITOR_MODE", default = "check")]
    pub mode: String,

    /// Needed by the per-user modes only.
    #[envconfig(from = "USER_ACCESS_TOKEN")]
    pub user_access_token: Option<NonEmptyString>,

    #[envconfig(from = "DEMO_SUBSTRINGS", default = "demo,test,sample")]
    pub demo_substrings: CommaSeparated,

    #[envconfig(from = "DEMO_EMAIL_SUFFIXES", default = "@demo.edu,@test.edu")]
    pub demo_email_suffixes: CommaSeparated,

    #[envconfig(from = "DEMO_TEAM_NAMES", default = "Sample Team")]
    pub demo_team_names: CommaSeparated,

    #[envconfig(nested = true)]
    pub store: StoreConfig,
}

impl Config {
    pub fn mode(&self) -> Result<JanitorMode, JanitorError> {
        JanitorMode::from_str(&self.mode)
    }

    pub fn demo_patterns(&self) -> DemoPatterns {
        DemoPatterns {
            substrings: self.demo_substrings.clone().into_inner(),
            email_suffixes: self.demo_email_suffixes.clone().into_inner(),
            team_names: self.demo_team_names.clone().into_inner(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JanitorMode {
    /// Report demo data without deleting anything.
    Check,
    Users,
    Teams,
    Full,
    /// Runs as the signed-in user from USER_ACCESS_TOKEN, like `Isolation`.
    RepairProfile,
    Isolation,
}

impl FromStr for JanitorMode {
    type Err = JanitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "check" => Ok(JanitorMode::Check),
            "users" => Ok(JanitorMode::Users),
            "teams" => Ok(JanitorMode::Teams),
            "full" => Ok(JanitorMode::Full),
            "repair-profile" => Ok(JanitorMode::RepairProfile),
            "isolation" => Ok(JanitorMode::Isolation),
            other => Err(JanitorError::InvalidMode(other.to_owned())),
        }
    }
}
