use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

/// Connection settings for the hosted store, shared by every tool that talks to it.
#[derive(Envconfig, Clone)]
pub struct StoreConfig {
    /// Project URL, e.g. https://abcd.supabase.co
    #[envconfig(from = "SUPABASE_URL")]
    pub url: NonEmptyString,

    /// The key sent as `apikey`. Cleanup needs the service-role key; per-user operations
    /// use the public anon key together with the caller's access token.
    #[envconfig(from = "SUPABASE_KEY")]
    pub key: NonEmptyString,

    /// Unset means the transport default, which is no timeout at all.
    #[envconfig(from = "REQUEST_TIMEOUT_MS")]
    pub request_timeout: Option<EnvMsDuration>,
}

impl StoreConfig {
    pub fn timeout(&self) -> Option<time::Duration> {
        self.request_timeout.map(|t| t.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(trimmed.to_owned()))
        }
    }
}

/// A comma separated list read from a single env var. Blank entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommaSeparated(pub Vec<String>);

impl CommaSeparated {
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl FromStr for CommaSeparated {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CommaSeparated(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect(),
        ))
    }
}
