use async_trait::async_trait;
use http::StatusCode;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::http::first_n_bytes_of_response;
use crate::postgrest::project_url;

const MAX_ERROR_BODY: usize = 4 * 1024;

/// Enumeration of errors when asking the identity provider who the caller is.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("auth request failed with: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("auth service answered with status {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("invalid auth url {url}: {error}")]
    InvalidUrl { url: String, error: url::ParseError },
}

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    /// Free-form fields filled in by the sign-in provider (name, avatar, ...).
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl AuthUser {
    /// A non-blank string field of `user_metadata`.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The currently authenticated caller, or `None` when the session is missing or expired.
    async fn current_user(&self) -> Result<Option<AuthUser>, AuthError>;
}

/// Identity provider backed by the project's auth endpoint (`{url}/auth/v1/user`).
pub struct GoTrueAuth {
    client: Client,
    user_url: Url,
    api_key: String,
    access_token: String,
}

impl GoTrueAuth {
    pub fn new(client: Client, url: &str, api_key: &str, access_token: &str) -> Result<Self, AuthError> {
        let user_url = project_url(url)
            .and_then(|base| base.join("auth/v1/user"))
            .map_err(|error| AuthError::InvalidUrl {
                url: url.to_owned(),
                error,
            })?;

        Ok(Self {
            client,
            user_url,
            api_key: api_key.to_owned(),
            access_token: access_token.to_owned(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoTrueAuth {
    async fn current_user(&self) -> Result<Option<AuthUser>, AuthError> {
        let response = self
            .client
            .get(self.user_url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<AuthUser>().await?)),
            status => {
                let message = first_n_bytes_of_response(response, MAX_ERROR_BODY)
                    .await
                    .unwrap_or_default();
                Err(AuthError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_http_client;
    use httpmock::prelude::*;
    use serde_json::json;

    fn auth(server: &MockServer, token: &str) -> GoTrueAuth {
        let client = build_http_client(Some(std::time::Duration::from_secs(1)), "ops-test")
            .expect("failed to create client");
        GoTrueAuth::new(client, &server.base_url(), "anon-key", token).unwrap()
    }

    #[tokio::test]
    async fn test_current_user() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/auth/v1/user")
                .header("apikey", "anon-key")
                .header("authorization", "Bearer user-jwt");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "id": "8d0fd2b3-9ca7-4d9e-a95f-9e13dded323e",
                    "email": "ada@example.com",
                    "aud": "authenticated",
                    "user_metadata": {"full_name": "Ada Lovelace", "avatar_url": " "}
                }));
        });

        let user = auth(&server, "user-jwt")
            .current_user()
            .await
            .unwrap()
            .expect("user should be signed in");

        mock.assert();
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert_eq!(user.metadata_str("full_name"), Some("Ada Lovelace"));
        assert_eq!(user.metadata_str("avatar_url"), None);
        assert_eq!(user.metadata_str("missing"), None);
    }

    #[tokio::test]
    async fn test_expired_session_is_anonymous() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/auth/v1/user");
            then.status(401)
                .json_body(json!({"code": 401, "msg": "invalid JWT"}));
        });

        let user = auth(&server, "expired").current_user().await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/auth/v1/user");
            then.status(503).body("maintenance");
        });

        let err = auth(&server, "token").current_user().await.unwrap_err();
        assert!(matches!(err, AuthError::ApiError { status: 503, ref message } if message == "maintenance"));
    }
}
