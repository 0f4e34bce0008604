use async_trait::async_trait;
use ops_common::http::build_http_client;
use reqwest::Client;
use serde::Serialize;

use crate::config::DoctorConfig;
use crate::env_check::{self, EnvironmentReport};
use crate::error::DoctorError;
use crate::probe::{self, ConnectivityReport};
use crate::webhook::{self, WebhookReport};

const USER_AGENT: &str = "ops-doctor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    pub ok: bool,
    pub environment: EnvironmentReport,
    pub connectivity: ConnectivityReport,
    pub webhook: WebhookReport,
}

/// The diagnostics a host can run. Hosts receive an implementation instead of looking one up.
#[async_trait]
pub trait Diagnostics: Send + Sync {
    fn check_environment(&self) -> EnvironmentReport;

    async fn check_connectivity(&self) -> ConnectivityReport;

    async fn test_webhook(&self) -> WebhookReport;

    async fn run_all(&self) -> DiagnosticsReport {
        let environment = self.check_environment();
        let connectivity = self.check_connectivity().await;
        let webhook = self.test_webhook().await;

        DiagnosticsReport {
            ok: environment.ok && connectivity.ok && webhook.ok,
            environment,
            connectivity,
            webhook,
        }
    }
}

/// Diagnostics against the live deployment described by a `DoctorConfig`.
pub struct ProductionDiagnostics {
    client: Client,
    config: DoctorConfig,
}

impl ProductionDiagnostics {
    pub fn new(config: DoctorConfig) -> Result<Self, DoctorError> {
        let client = build_http_client(config.timeout(), USER_AGENT)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Diagnostics for ProductionDiagnostics {
    fn check_environment(&self) -> EnvironmentReport {
        env_check::check_environment(&self.config)
    }

    async fn check_connectivity(&self) -> ConnectivityReport {
        probe::check_connectivity(&self.client, &self.config).await
    }

    async fn test_webhook(&self) -> WebhookReport {
        webhook::test_webhook(&self.client, &self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_check::CheckStatus;
    use assert_json_diff::assert_json_include;
    use envconfig::Envconfig;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_run_all_against_a_healthy_deployment() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/");
            then.status(200).json_body(json!({}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/auth/v1/health");
            then.status(200).json_body(json!({"name": "GoTrue"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("<html></html>");
        });
        server.mock(|when, then| {
            when.method(OPTIONS).path("/api/webhooks/razorpay");
            then.status(204);
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/webhooks/razorpay");
            then.status(405);
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/webhooks/razorpay");
            then.status(400).json_body(json!({"error": "Invalid signature"}));
        });

        // The mock serves plain http, so only the https checks fail.
        let mut env = HashMap::new();
        env.insert("NEXT_PUBLIC_SUPABASE_URL".to_owned(), server.base_url());
        env.insert("NEXT_PUBLIC_SUPABASE_ANON_KEY".to_owned(), "eyJanon".to_owned());
        env.insert("NEXT_PUBLIC_RAZORPAY_KEY_ID".to_owned(), "rzp_live_1".to_owned());
        env.insert("NEXT_PUBLIC_APP_URL".to_owned(), server.base_url());
        let config = DoctorConfig::init_from_hashmap(&env).unwrap();

        let diagnostics = ProductionDiagnostics::new(config).unwrap();
        let host: &dyn Diagnostics = &diagnostics;
        let report = host.run_all().await;

        assert!(report.connectivity.ok);
        assert!(report.webhook.ok);
        assert!(!report.environment.ok);
        assert!(!report.ok);
        assert!(report
            .environment
            .checks
            .iter()
            .filter(|check| check.status == CheckStatus::Fail)
            .all(|check| check.name.ends_with("https") || check.name == "supabase_url_format"));

        assert_json_include!(
            actual: serde_json::to_value(&report).unwrap(),
            expected: json!({
                "ok": false,
                "connectivity": {"ok": true},
                "webhook": {"ok": true, "probes": [
                    {"method": "OPTIONS", "status": "pass", "http_status": 204},
                    {"method": "GET", "status": "pass", "http_status": 405},
                    {"method": "POST", "status": "pass", "http_status": 400}
                ]}
            })
        );
    }

    struct CannedDiagnostics;

    #[async_trait]
    impl Diagnostics for CannedDiagnostics {
        fn check_environment(&self) -> EnvironmentReport {
            EnvironmentReport {
                ok: true,
                checks: vec![],
            }
        }

        async fn check_connectivity(&self) -> ConnectivityReport {
            ConnectivityReport {
                ok: true,
                probes: vec![],
            }
        }

        async fn test_webhook(&self) -> WebhookReport {
            WebhookReport {
                ok: true,
                endpoint: None,
                probes: vec![],
            }
        }
    }

    #[tokio::test]
    async fn test_hosts_can_inject_their_own_diagnostics() {
        let report = CannedDiagnostics.run_all().await;
        assert!(report.ok);
    }
}
