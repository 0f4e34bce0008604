//! Reachability probes against the deployed services. Read only: every probe is a GET.

use http::StatusCode;
use ops_common::postgrest::project_url;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{value, DoctorConfig};
use crate::env_check::CheckStatus;
use crate::metrics_consts::PROBES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub name: &'static str,
    pub url: Option<String>,
    pub status: CheckStatus,
    /// HTTP status of the response, when there was one.
    pub http_status: Option<u16>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub ok: bool,
    pub probes: Vec<ProbeOutcome>,
}

fn skipped(name: &'static str, missing: &str) -> ProbeOutcome {
    ProbeOutcome {
        name,
        url: None,
        status: CheckStatus::Unverifiable,
        http_status: None,
        detail: format!("{missing} is not set"),
    }
}

fn record(outcome: ProbeOutcome) -> ProbeOutcome {
    metrics::counter!(
        PROBES,
        &[
            ("probe", outcome.name.to_owned()),
            ("status", outcome.status.as_str().to_owned())
        ]
    )
    .increment(1);
    if outcome.status == CheckStatus::Fail {
        warn!(probe = outcome.name, "{}", outcome.detail);
    }
    outcome
}

/// Send `request` and judge the response status with `accept`.
async fn probe(
    name: &'static str,
    url: String,
    request: RequestBuilder,
    accept: fn(StatusCode) -> bool,
    expectation: &str,
) -> ProbeOutcome {
    let (status, http_status, detail) = match request.send().await {
        Ok(response) => {
            let code = response.status();
            if accept(code) {
                (CheckStatus::Pass, Some(code.as_u16()), format!("responded {code}"))
            } else {
                (
                    CheckStatus::Fail,
                    Some(code.as_u16()),
                    format!("responded {code}, expected {expectation}"),
                )
            }
        }
        Err(e) => (CheckStatus::Fail, None, format!("unreachable: {e}")),
    };

    record(ProbeOutcome {
        name,
        url: Some(url),
        status,
        http_status,
        detail,
    })
}

fn invalid_url(name: &'static str, url: &str, error: url::ParseError) -> ProbeOutcome {
    record(ProbeOutcome {
        name,
        url: Some(url.to_owned()),
        status: CheckStatus::Fail,
        http_status: None,
        detail: format!("invalid url: {error}"),
    })
}

/// The REST root answers as soon as the project is up, whatever the key's permissions.
pub async fn probe_store(client: &Client, project: &str, api_key: Option<&str>) -> ProbeOutcome {
    const NAME: &str = "supabase_rest";
    let url = match project_url(project).and_then(|base| base.join("rest/v1/")) {
        Ok(url) => url,
        Err(error) => return invalid_url(NAME, project, error),
    };

    let mut request = client.get(url.clone());
    if let Some(key) = api_key {
        request = request.header("apikey", key);
    }
    probe(NAME, url.to_string(), request, |s| !s.is_server_error(), "no server error").await
}

pub async fn probe_auth_health(
    client: &Client,
    project: &str,
    api_key: Option<&str>,
) -> ProbeOutcome {
    const NAME: &str = "supabase_auth_health";
    let url = match project_url(project).and_then(|base| base.join("auth/v1/health")) {
        Ok(url) => url,
        Err(error) => return invalid_url(NAME, project, error),
    };

    let mut request = client.get(url.clone());
    if let Some(key) = api_key {
        request = request.header("apikey", key);
    }
    probe(NAME, url.to_string(), request, |s| s == StatusCode::OK, "200 OK").await
}

pub async fn probe_app(client: &Client, app_url: &str) -> ProbeOutcome {
    const NAME: &str = "app";
    let url = match reqwest::Url::parse(app_url) {
        Ok(url) => url,
        Err(error) => return invalid_url(NAME, app_url, error),
    };

    probe(
        NAME,
        url.to_string(),
        client.get(url),
        |s| s.is_success() || s.is_redirection(),
        "a 2xx or 3xx status",
    )
    .await
}

/// Probe every configured endpoint, one after the other.
pub async fn check_connectivity(client: &Client, config: &DoctorConfig) -> ConnectivityReport {
    let anon_key = value(&config.supabase_anon_key);
    let mut probes = Vec::with_capacity(3);

    match value(&config.supabase_url) {
        Some(project) => {
            probes.push(probe_store(client, project, anon_key).await);
            probes.push(probe_auth_health(client, project, anon_key).await);
        }
        None => {
            probes.push(skipped("supabase_rest", "NEXT_PUBLIC_SUPABASE_URL"));
            probes.push(skipped("supabase_auth_health", "NEXT_PUBLIC_SUPABASE_URL"));
        }
    }

    match value(&config.app_url) {
        Some(app_url) => probes.push(probe_app(client, app_url).await),
        None => probes.push(skipped("app", "NEXT_PUBLIC_APP_URL")),
    }

    let ok = probes.iter().all(|p| p.status == CheckStatus::Pass);
    info!(ok, "connectivity checked");

    ConnectivityReport { ok, probes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envconfig::Envconfig;
    use httpmock::prelude::*;
    use ops_common::http::build_http_client;
    use std::collections::HashMap;
    use std::time::Duration;

    fn client() -> Client {
        build_http_client(Some(Duration::from_secs(1)), "ops-doctor-test")
            .expect("failed to create client")
    }

    #[tokio::test]
    async fn test_store_probe_accepts_any_non_server_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/rest/v1/").header("apikey", "anon");
            then.status(401);
        });

        let outcome = probe_store(&client(), &server.base_url(), Some("anon")).await;

        mock.assert();
        assert_eq!(outcome.status, CheckStatus::Pass);
        assert_eq!(outcome.http_status, Some(401));
    }

    #[tokio::test]
    async fn test_store_probe_fails_on_server_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/");
            then.status(503);
        });

        let outcome = probe_store(&client(), &server.base_url(), None).await;

        assert_eq!(outcome.status, CheckStatus::Fail);
        assert!(outcome.detail.contains("503"));
    }

    #[tokio::test]
    async fn test_auth_health_expects_ok() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/auth/v1/health");
            then.status(200).json_body(serde_json::json!({"name": "GoTrue"}));
        });

        let outcome = probe_auth_health(&client(), &server.base_url(), Some("anon")).await;
        assert_eq!(outcome.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn test_unreachable_app_is_a_failed_probe() {
        let outcome = probe_app(&client(), "http://127.0.0.1:1").await;

        assert_eq!(outcome.status, CheckStatus::Fail);
        assert_eq!(outcome.http_status, None);
        assert!(outcome.detail.starts_with("unreachable"));
    }

    #[tokio::test]
    async fn test_check_connectivity() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("<html></html>");
        });

        let mut env = HashMap::new();
        env.insert("NEXT_PUBLIC_APP_URL".to_owned(), server.base_url());
        let config = DoctorConfig::init_from_hashmap(&env).unwrap();

        let report = check_connectivity(&client(), &config).await;

        assert!(!report.ok);
        assert_eq!(report.probes.len(), 3);
        assert_eq!(report.probes[0].status, CheckStatus::Unverifiable);
        assert_eq!(report.probes[1].status, CheckStatus::Unverifiable);
        assert_eq!(report.probes[2].status, CheckStatus::Pass);
    }
}
