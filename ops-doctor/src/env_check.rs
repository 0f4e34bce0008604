use serde::Serialize;
use tracing::{info, warn};

use crate::config::{value, DoctorConfig};
use crate::metrics_consts::ENV_CHECKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    /// Works, but not what a production deployment should run with.
    Warn,
    Fail,
    /// The value is not visible from here, so nothing can be said about it.
    Unverifiable,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Unverifiable => "unverifiable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl EnvCheck {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    /// No check failed. Warnings and unverifiable values do not count against it.
    pub ok: bool,
    pub checks: Vec<EnvCheck>,
}

fn presence(name: &'static str, v: Option<&str>) -> EnvCheck {
    match v {
        Some(_) => EnvCheck::new(name, CheckStatus::Pass, "set"),
        None => EnvCheck::new(name, CheckStatus::Fail, "missing"),
    }
}

fn server_only(name: &'static str, v: Option<&str>) -> EnvCheck {
    match v {
        Some(_) => EnvCheck::new(name, CheckStatus::Pass, "set"),
        None => EnvCheck::new(
            name,
            CheckStatus::Unverifiable,
            "server-side only, not visible here",
        ),
    }
}

fn https(name: &'static str, v: Option<&str>) -> Option<EnvCheck> {
    let url = v?;
    Some(if url.starts_with("https://") {
        EnvCheck::new(name, CheckStatus::Pass, "uses https")
    } else {
        EnvCheck::new(name, CheckStatus::Fail, format!("{url} does not use https"))
    })
}

fn store_url_format(v: Option<&str>) -> Option<EnvCheck> {
    let url = v?;
    Some(if url.contains(".supabase.co") {
        EnvCheck::new("supabase_url_format", CheckStatus::Pass, "hosted project url")
    } else {
        EnvCheck::new(
            "supabase_url_format",
            CheckStatus::Fail,
            format!("{url} does not look like a hosted project url"),
        )
    })
}

fn anon_key_format(v: Option<&str>) -> Option<EnvCheck> {
    let key = v?;
    Some(if key.starts_with("eyJ") {
        EnvCheck::new("supabase_anon_key_format", CheckStatus::Pass, "looks like a jwt")
    } else {
        EnvCheck::new(
            "supabase_anon_key_format",
            CheckStatus::Fail,
            "does not look like a jwt",
        )
    })
}

fn payment_key_format(v: Option<&str>) -> Option<EnvCheck> {
    const NAME: &str = "razorpay_key_id_format";
    let key = v?;
    Some(if key.starts_with("rzp_live_") {
        EnvCheck::new(NAME, CheckStatus::Pass, "live key")
    } else if key.starts_with("rzp_test_") {
        EnvCheck::new(NAME, CheckStatus::Warn, "test key in use")
    } else if key.starts_with("rzp_") {
        EnvCheck::new(NAME, CheckStatus::Pass, "key id")
    } else {
        EnvCheck::new(NAME, CheckStatus::Fail, "does not start with rzp_")
    })
}

/// Check the deployment's configuration. Values are never printed back, except URLs.
pub fn check_environment(config: &DoctorConfig) -> EnvironmentReport {
    let supabase_url = value(&config.supabase_url);
    let anon_key = value(&config.supabase_anon_key);
    let key_id = value(&config.razorpay_key_id);
    let app_url = value(&config.app_url);

    let mut checks = vec![
        presence("NEXT_PUBLIC_SUPABASE_URL", supabase_url),
        presence("NEXT_PUBLIC_SUPABASE_ANON_KEY", anon_key),
        presence("NEXT_PUBLIC_RAZORPAY_KEY_ID", key_id),
        presence("NEXT_PUBLIC_APP_URL", app_url),
        server_only(
            "SUPABASE_SERVICE_ROLE_KEY",
            value(&config.supabase_service_role_key),
        ),
        server_only(
            "RAZORPAY_WEBHOOK_SECRET",
            value(&config.razorpay_webhook_secret),
        ),
    ];
    checks.extend(
        [
            https("supabase_url_https", supabase_url),
            store_url_format(supabase_url),
            https("app_url_https", app_url),
            anon_key_format(anon_key),
            payment_key_format(key_id),
        ]
        .into_iter()
        .flatten(),
    );

    for check in &checks {
        metrics::counter!(ENV_CHECKS, &[("status", check.status.as_str().to_owned())])
            .increment(1);
        if matches!(check.status, CheckStatus::Fail | CheckStatus::Warn) {
            warn!(check = check.name, status = check.status.as_str(), "{}", check.detail);
        }
    }

    let ok = checks.iter().all(|check| check.status != CheckStatus::Fail);
    info!(ok, checks = checks.len(), "environment checked");

    EnvironmentReport { ok, checks }
}
