use std::time;

use envconfig::Envconfig;
use ops_common::config::EnvMsDuration;

/// What a production deployment exposes. Every key is optional here: a missing value is
/// something to report, not a reason to refuse to start.
#[derive(Envconfig, Clone)]
pub struct DoctorConfig {
    #[envconfig(from = "NEXT_PUBLIC_SUPABASE_URL")]
    pub supabase_url: Option<String>,

    #[envconfig(from = "NEXT_PUBLIC_SUPABASE_ANON_KEY")]
    pub supabase_anon_key: Option<String>,

    #[envconfig(from = "NEXT_PUBLIC_RAZORPAY_KEY_ID")]
    pub razorpay_key_id: Option<String>,

    #[envconfig(from = "NEXT_PUBLIC_APP_URL")]
    pub app_url: Option<String>,

    // Server-side secrets, usually not visible where the doctor runs.
    #[envconfig(from = "SUPABASE_SERVICE_ROLE_KEY")]
    pub supabase_service_role_key: Option<String>,

    #[envconfig(from = "RAZORPAY_WEBHOOK_SECRET")]
    pub razorpay_webhook_secret: Option<String>,

    #[envconfig(from = "WEBHOOK_PATH", default = "/api/webhooks/razorpay")]
    pub webhook_path: String,

    #[envconfig(from = "REQUEST_TIMEOUT_MS")]
    pub request_timeout: Option<EnvMsDuration>,
}

impl DoctorConfig {
    pub fn timeout(&self) -> Option<time::Duration> {
        self.request_timeout.map(|t| t.0)
    }
}

/// The trimmed value of an optional key. Blank counts as missing.
pub fn value(key: &Option<String>) -> Option<&str> {
    key.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
