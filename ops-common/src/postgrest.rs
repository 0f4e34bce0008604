//! `DataStore` over the hosted project's PostgREST endpoint (`{url}/rest/v1/{table}`).

use async_trait::async_trait;
use http::{Method, StatusCode};
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::StoreConfig;
use crate::filter::Filter;
use crate::http::{build_http_client, first_n_bytes_of_response};
use crate::store::{DataStore, Row, StoreError, StoreResult};

const MAX_ERROR_BODY: usize = 4 * 1024;

/// Shape of a PostgREST error body. Every field is optional as proxies in front of the
/// store may answer with something else entirely.
#[derive(Debug, Default, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

pub struct PostgrestStore {
    client: Client,
    rest_url: Url,
    api_key: String,
    bearer: String,
}

/// Parse a project URL and make sure it ends with a slash, so `join` appends instead of
/// replacing the last path segment.
pub fn project_url(url: &str) -> Result<Url, url::ParseError> {
    let url = url.trim();
    if url.ends_with('/') {
        Url::parse(url)
    } else {
        Url::parse(&format!("{url}/"))
    }
}

impl PostgrestStore {
    /// Create a store client authenticated with `api_key`, used both as `apikey` and bearer.
    pub fn new(client: Client, url: &str, api_key: &str) -> StoreResult<Self> {
        let invalid = |error| StoreError::InvalidUrl {
            url: url.to_owned(),
            error,
        };
        let rest_url = project_url(url)
            .and_then(|base| base.join("rest/v1/"))
            .map_err(invalid)?;

        Ok(Self {
            client,
            rest_url,
            api_key: api_key.to_owned(),
            bearer: api_key.to_owned(),
        })
    }

    pub fn from_config(config: &StoreConfig, user_agent: &str) -> StoreResult<Self> {
        let client =
            build_http_client(config.timeout(), user_agent).map_err(StoreError::ClientError)?;
        Self::new(client, config.url.as_str(), config.key.as_str())
    }

    /// Act as a signed-in user: row level security then applies to every request.
    pub fn with_access_token(mut self, access_token: &str) -> Self {
        self.bearer = access_token.to_owned();
        self
    }

    fn request(&self, method: Method, table: &str, filter: &Filter) -> StoreResult<RequestBuilder> {
        let url = self
            .rest_url
            .join(table)
            .map_err(|error| StoreError::InvalidUrl {
                url: format!("{}{}", self.rest_url, table),
                error,
            })?;

        Ok(self
            .client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
            .query(&filter.to_query_pairs()))
    }

    async fn send(
        &self,
        method: &'static str,
        table: &str,
        request: RequestBuilder,
    ) -> StoreResult<Vec<Row>> {
        let response = request
            .send()
            .await
            .map_err(|error| StoreError::RequestError {
                method,
                table: table.to_owned(),
                error,
            })?;

        let status = response.status();
        debug!(method, table, status = status.as_u16(), "store responded");

        if !status.is_success() {
            let body = first_n_bytes_of_response(response, MAX_ERROR_BODY)
                .await
                .unwrap_or_default();
            let parsed: PostgrestErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = match (parsed.message, parsed.details, parsed.hint) {
                (Some(message), Some(details), _) => format!("{message} ({details})"),
                (Some(message), None, Some(hint)) => format!("{message} (hint: {hint})"),
                (Some(message), None, None) => message,
                (None, _, _) if body.is_empty() => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_owned(),
                (None, _, _) => body,
            };

            return Err(StoreError::ApiError {
                method,
                table: table.to_owned(),
                status: status.as_u16(),
                code: parsed.code,
                message,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(vec![]);
        }

        response
            .json::<Vec<Row>>()
            .await
            .map_err(|error| StoreError::RequestError {
                method,
                table: table.to_owned(),
                error,
            })
    }
}

#[async_trait]
impl DataStore for PostgrestStore {
    async fn select(&self, table: &str, columns: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        let request = self
            .request(Method::GET, table, filter)?
            .query(&[("select", columns)]);
        self.send("SELECT", table, request).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        if filter.is_unrestricted() {
            return Err(StoreError::UnfilteredDelete(table.to_owned()));
        }

        let request = self
            .request(Method::DELETE, table, filter)?
            .header("Prefer", "return=representation");
        self.send("DELETE", table, request).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<Vec<Row>> {
        let request = self
            .request(Method::POST, table, &Filter::All)?
            .header("Prefer", "return=representation")
            .json(&rows);
        self.send("INSERT", table, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Pattern;
    use httpmock::prelude::*;
    use serde_json::json;

    fn store(server: &MockServer) -> PostgrestStore {
        let client = build_http_client(Some(std::time::Duration::from_secs(1)), "ops-test")
            .expect("failed to create client");
        PostgrestStore::new(client, &server.base_url(), "service-key").unwrap()
    }

    #[test]
    fn test_project_url_keeps_path() {
        let url = project_url("https://abcd.supabase.co").unwrap();
        assert_eq!(
            url.join("rest/v1/").unwrap().as_str(),
            "https://abcd.supabase.co/rest/v1/"
        );

        let url = project_url("http://localhost:54321/proxy").unwrap();
        assert_eq!(
            url.join("rest/v1/").unwrap().as_str(),
            "http://localhost:54321/proxy/rest/v1/"
        );

        assert!(project_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_select_sends_filter_and_auth() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/v1/users")
                .query_param("select", "id,email")
                .query_param("or", "(email.ilike.*demo*,email.ilike.*@test.edu)")
                .header("apikey", "service-key")
                .header("authorization", "Bearer service-key");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!([{"id": "u1", "email": "demo@x.com"}]));
        });

        let filter = Filter::AnyOf(vec![
            Pattern::contains("email", "demo"),
            Pattern::ends_with("email", "@test.edu"),
        ]);
        let rows = store(&server)
            .select("users", "id,email", &filter)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&json!("u1")));
    }

    #[tokio::test]
    async fn test_delete_returns_deleted_rows() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE)
                .path("/rest/v1/payments")
                .query_param("user_id", "in.(u1,u2)")
                .header("prefer", "return=representation");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!([{"id": 1, "user_id": "u1"}]));
        });

        let deleted = store(&server)
            .delete("payments", &Filter::is_in("user_id", &["u1", "u2"]))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(deleted.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_without_filter_is_refused() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE);
            then.status(200).json_body(json!([]));
        });

        let err = store(&server)
            .delete("users", &Filter::All)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UnfilteredDelete(ref table) if table == "users"));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_api_error_is_parsed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/rest/v1/users");
            then.status(409)
                .header("content-type", "application/json")
                .json_body(json!({
                    "code": "23503",
                    "message": "update or delete on table \"users\" violates foreign key constraint",
                    "details": "Key is still referenced from table \"teams\".",
                    "hint": null
                }));
        });

        let err = store(&server)
            .delete("users", &Filter::is_in("id", &["u1"]))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("23503"));
        match err {
            StoreError::ApiError {
                method,
                table,
                status,
                message,
                ..
            } => {
                assert_eq!(method, "DELETE");
                assert_eq!(table, "users");
                assert_eq!(status, 409);
                assert!(message.contains("foreign key constraint"));
                assert!(message.contains("still referenced"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_api_error_without_json_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/teams");
            then.status(502).body("bad gateway");
        });

        let err = store(&server)
            .select("teams", "*", &Filter::All)
            .await
            .unwrap_err();

        assert_eq!(err.code(), None);
        assert!(err.to_string().contains("status 502: bad gateway"));
    }

    #[tokio::test]
    async fn test_insert_posts_rows() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/v1/users")
                .header("prefer", "return=representation")
                .json_body(json!([{"id": "u1", "name": "Ada"}]));
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!([{"id": "u1", "name": "Ada", "avatar_url": null}]));
        });

        let row = json!({"id": "u1", "name": "Ada"}).as_object().unwrap().clone();
        let inserted = store(&server).insert("users", vec![row]).await.unwrap();

        mock.assert();
        assert_eq!(inserted[0].get("avatar_url"), Some(&json!(null)));
    }

    #[tokio::test]
    async fn test_access_token_replaces_bearer_only() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/v1/users")
                .header("apikey", "service-key")
                .header("authorization", "Bearer user-jwt");
            then.status(200).json_body(json!([]));
        });

        let rows = store(&server)
            .with_access_token("user-jwt")
            .select("users", "*", &Filter::eq("id", "u1"))
            .await
            .unwrap();

        mock.assert();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_a_request_error() {
        let client = build_http_client(Some(std::time::Duration::from_millis(200)), "ops-test")
            .expect("failed to create client");
        let store = PostgrestStore::new(client, "http://127.0.0.1:1", "key").unwrap();

        let err = store.select("users", "*", &Filter::All).await.unwrap_err();
        assert!(matches!(err, StoreError::RequestError { method: "SELECT", .. }));
    }
}
