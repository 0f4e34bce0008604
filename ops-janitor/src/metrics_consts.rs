pub const PURGE_STARTS: &str = "ops_janitor_purge_starts";
pub const PURGE_STEPS: &str = "ops_janitor_purge_steps";
pub const PURGE_ROWS_DELETED: &str = "ops_janitor_purge_rows_deleted";

pub const CLEANUP_RUNS: &str = "ops_janitor_cleanup_runs";
pub const DEMO_USERS_FOUND: &str = "ops_janitor_demo_users_found";
pub const DEMO_TEAMS_FOUND: &str = "ops_janitor_demo_teams_found";

pub const PROFILES_CREATED: &str = "ops_janitor_profiles_created";
