pub const ENV_CHECKS: &str = "ops_doctor_env_checks";
pub const PROBES: &str = "ops_doctor_probes";
pub const WEBHOOK_CHECKS: &str = "ops_doctor_webhook_checks";
