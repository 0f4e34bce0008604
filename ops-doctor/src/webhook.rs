//! Smoke test of the deployed payment webhook handler.
//!
//! A healthy handler only accepts signed POSTs: GET must be refused with 405, and a POST with a
//! bogus signature must be refused with 400 before any payload processing happens. OPTIONS is
//! informational only.

use http::{header, Method, StatusCode};
use ops_common::http::first_n_bytes_of_response;
use ops_common::postgrest::project_url;
use reqwest::{Client, Response, Url};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{value, DoctorConfig};
use crate::env_check::CheckStatus;
use crate::metrics_consts::WEBHOOK_CHECKS;

const MAX_BODY: usize = 4 * 1024;
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
const INVALID_SIGNATURE: &str = "invalid_signature";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookProbe {
    pub method: &'static str,
    pub status: CheckStatus,
    pub http_status: Option<u16>,
    /// The `Allow` header, recorded for OPTIONS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<String>,
    pub detail: String,
}

impl WebhookProbe {
    fn new(method: &'static str, status: CheckStatus, http_status: Option<u16>, detail: String) -> Self {
        Self {
            method,
            status,
            http_status,
            allow: None,
            detail,
        }
    }

    fn unreachable(method: &'static str, error: reqwest::Error) -> Self {
        Self::new(method, CheckStatus::Fail, None, format!("unreachable: {error}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReport {
    /// GET and POST both behaved. OPTIONS does not count.
    pub ok: bool,
    pub endpoint: Option<String>,
    pub probes: Vec<WebhookProbe>,
}

/// The body of a `payment.captured` event, shaped like the real thing.
pub fn sample_payment_captured() -> Value {
    json!({
        "entity": "event",
        "event": "payment.captured",
        "contains": ["payment"],
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_test123",
                    "entity": "payment",
                    "amount": 50000,
                    "currency": "INR",
                    "status": "captured",
                    "order_id": "order_test123",
                    "method": "card",
                    "captured": true,
                    "notes": {}
                }
            }
        },
        "created_at": 1700000000
    })
}

async fn probe_options(client: &Client, url: &Url) -> WebhookProbe {
    match client.request(Method::OPTIONS, url.clone()).send().await {
        Ok(response) => {
            let code = response.status();
            let allow = response
                .headers()
                .get(header::ALLOW)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let mut probe = WebhookProbe::new(
                "OPTIONS",
                CheckStatus::Pass,
                Some(code.as_u16()),
                format!("responded {code}"),
            );
            probe.allow = allow;
            probe
        }
        Err(e) => WebhookProbe::unreachable("OPTIONS", e),
    }
}

async fn probe_get(client: &Client, url: &Url) -> WebhookProbe {
    match client.get(url.clone()).send().await {
        Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => WebhookProbe::new(
            "GET",
            CheckStatus::Pass,
            Some(405),
            "GET refused with 405".to_owned(),
        ),
        Ok(response) => {
            let code = response.status();
            WebhookProbe::new(
                "GET",
                CheckStatus::Fail,
                Some(code.as_u16()),
                format!("unexpected response {code}, expected 405"),
            )
        }
        Err(e) => WebhookProbe::unreachable("GET", e),
    }
}

async fn judge_post(response: Response) -> WebhookProbe {
    let code = response.status();
    let body = first_n_bytes_of_response(response, MAX_BODY)
        .await
        .unwrap_or_default();
    let lowered = body.to_lowercase();

    if code == StatusCode::BAD_REQUEST && lowered.contains("invalid") && lowered.contains("signature") {
        WebhookProbe::new(
            "POST",
            CheckStatus::Pass,
            Some(400),
            "invalid signature rejected".to_owned(),
        )
    } else {
        WebhookProbe::new(
            "POST",
            CheckStatus::Fail,
            Some(code.as_u16()),
            format!("unexpected response {code}: {body}"),
        )
    }
}

async fn probe_post(client: &Client, url: &Url) -> WebhookProbe {
    let request = client
        .post(url.clone())
        .header(SIGNATURE_HEADER, INVALID_SIGNATURE)
        .json(&sample_payment_captured());

    match request.send().await {
        Ok(response) => judge_post(response).await,
        Err(e) => WebhookProbe::unreachable("POST", e),
    }
}

fn record(probe: &WebhookProbe) {
    metrics::counter!(
        WEBHOOK_CHECKS,
        &[
            ("method", probe.method.to_owned()),
            ("status", probe.status.as_str().to_owned())
        ]
    )
    .increment(1);
    if probe.status == CheckStatus::Fail {
        warn!(method = probe.method, "webhook probe failed: {}", probe.detail);
    }
}

/// The endpoint under the app URL. A path prefix on the app URL is kept, so
/// `https://host/portal` serves the webhook at `https://host/portal/api/webhooks/razorpay`.
pub fn webhook_url(app_url: &str, path: &str) -> Result<Url, url::ParseError> {
    project_url(app_url).and_then(|base| base.join(path.trim_start_matches('/')))
}

/// Run OPTIONS, GET and POST against the webhook endpoint, in that order.
pub async fn test_webhook(client: &Client, config: &DoctorConfig) -> WebhookReport {
    let Some(app_url) = value(&config.app_url) else {
        let probes = ["OPTIONS", "GET", "POST"]
            .into_iter()
            .map(|method| {
                WebhookProbe::new(
                    method,
                    CheckStatus::Unverifiable,
                    None,
                    "NEXT_PUBLIC_APP_URL is not set".to_owned(),
                )
            })
            .collect();
        return WebhookReport {
            ok: false,
            endpoint: None,
            probes,
        };
    };

    let url = match webhook_url(app_url, &config.webhook_path) {
        Ok(url) => url,
        Err(e) => {
            let probes = ["OPTIONS", "GET", "POST"]
                .into_iter()
                .map(|method| {
                    WebhookProbe::new(method, CheckStatus::Fail, None, format!("invalid url: {e}"))
                })
                .collect();
            return WebhookReport {
                ok: false,
                endpoint: Some(format!("{app_url}{}", config.webhook_path)),
                probes,
            };
        }
    };

    let probes = vec![
        probe_options(client, &url).await,
        probe_get(client, &url).await,
        probe_post(client, &url).await,
    ];
    probes.iter().for_each(record);

    let ok = probes
        .iter()
        .filter(|probe| probe.method != "OPTIONS")
        .all(|probe| probe.status == CheckStatus::Pass);
    info!(ok, endpoint = %url, "webhook tested");

    WebhookReport {
        ok,
        endpoint: Some(url.to_string()),
        probes,
    }
}
