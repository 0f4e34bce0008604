use ops_common::auth::{AuthUser, IdentityProvider};
use ops_common::filter::Filter;
use ops_common::store::{decode_rows, encode_row, DataStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::JanitorError;
use crate::identify::{deserialize_id, USERS_TABLE};
use crate::metrics_consts::PROFILES_CREATED;

const FALLBACK_NAME: &str = "User";

/// A row of the `users` table as the application expects it for every signed-in account.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Profile {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Build the profile the application would have created at sign-up.
    pub fn for_user(user: &AuthUser) -> Self {
        let name = user
            .metadata_str("full_name")
            .or_else(|| user.metadata_str("name"))
            .or_else(|| {
                user.email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .filter(|local| !local.is_empty())
            })
            .unwrap_or(FALLBACK_NAME);

        let avatar_url = user
            .metadata_str("avatar_url")
            .or_else(|| user.metadata_str("picture"))
            .map(str::to_owned);

        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: Some(name.to_owned()),
            avatar_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "profile", rename_all = "snake_case")]
pub enum ProfileRepair {
    AlreadyExists(Profile),
    Created(Profile),
}

impl ProfileRepair {
    pub fn profile(&self) -> &Profile {
        match self {
            ProfileRepair::AlreadyExists(profile) | ProfileRepair::Created(profile) => profile,
        }
    }
}

/// Postgres' unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

async fn find_profile(store: &dyn DataStore, id: &str) -> Result<Option<Profile>, JanitorError> {
    let rows = store
        .select(USERS_TABLE, "id,email,name,avatar_url", &Filter::eq("id", id))
        .await
        .map_err(|error| JanitorError::QueryError {
            table: USERS_TABLE,
            error,
        })?;
    let existing = decode_rows::<Profile>(USERS_TABLE, rows).map_err(|error| {
        JanitorError::QueryError {
            table: USERS_TABLE,
            error,
        }
    })?;

    Ok(existing.into_iter().next())
}

/// Make sure the signed-in caller has a row in `users`, creating it from their auth record.
pub async fn ensure_profile(
    identity: &dyn IdentityProvider,
    store: &dyn DataStore,
) -> Result<ProfileRepair, JanitorError> {
    let user = identity
        .current_user()
        .await?
        .ok_or(JanitorError::NotAuthenticated)?;

    if let Some(profile) = find_profile(store, &user.id).await? {
        info!(user_id = %profile.id, "profile already exists");
        return Ok(ProfileRepair::AlreadyExists(profile));
    }

    let profile = Profile::for_user(&user);
    let row = encode_row(USERS_TABLE, &profile).map_err(|error| JanitorError::InsertError {
        table: USERS_TABLE,
        error,
    })?;
    let inserted = match store.insert(USERS_TABLE, vec![row]).await {
        Ok(inserted) => inserted,
        // Created concurrently, or present but not visible to the first select.
        Err(error) if error.code() == Some(UNIQUE_VIOLATION) => {
            info!(user_id = %profile.id, "profile appeared before insert");
            let existing = find_profile(store, &user.id).await?.unwrap_or(profile);
            return Ok(ProfileRepair::AlreadyExists(existing));
        }
        Err(error) => {
            return Err(JanitorError::InsertError {
                table: USERS_TABLE,
                error,
            })
        }
    };

    // Prefer what the store returned, it may have filled in defaults.
    let profile = decode_rows::<Profile>(USERS_TABLE, inserted)
        .ok()
        .and_then(|rows| rows.into_iter().next())
        .unwrap_or(profile);

    metrics::counter!(PROFILES_CREATED).increment(1);
    info!(user_id = %profile.id, "created missing profile");

    Ok(ProfileRepair::Created(profile))
}
