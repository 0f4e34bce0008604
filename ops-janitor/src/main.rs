use envconfig::Envconfig;
use eyre::Result;
use ops_common::auth::{GoTrueAuth, IdentityProvider};
use ops_common::http::build_http_client;
use ops_common::postgrest::PostgrestStore;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ops_janitor::cleanup::run_full_cleanup;
use ops_janitor::config::{Config, JanitorMode};
use ops_janitor::error::JanitorError;
use ops_janitor::identify::find_demo_data;
use ops_janitor::isolation::check_isolation;
use ops_janitor::profile::ensure_profile;
use ops_janitor::purge::{cleanup_demo_teams, cleanup_demo_users};

const USER_AGENT: &str = "ops-janitor";

/// Print the report for whoever invoked us and return whether the run succeeded.
fn emit<T: Serialize>(report: &T, success: bool) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(success)
}

async fn run(config: &Config, mode: JanitorMode) -> Result<bool> {
    let patterns = config.demo_patterns();
    let store = PostgrestStore::from_config(&config.store, USER_AGENT)?;

    match mode {
        JanitorMode::Check => {
            let data = find_demo_data(&store, &patterns).await?;
            emit(&data, true)
        }
        JanitorMode::Users => {
            let report = cleanup_demo_users(&store, &patterns).await?;
            emit(&report, report.success())
        }
        JanitorMode::Teams => {
            let report = cleanup_demo_teams(&store, &patterns).await?;
            emit(&report, report.success())
        }
        JanitorMode::Full => {
            let report = run_full_cleanup(&store, &patterns).await;
            emit(&report, report.success)
        }
        JanitorMode::RepairProfile | JanitorMode::Isolation => {
            run_as_user(config, mode, store).await
        }
    }
}

/// Modes that act as the signed-in user, so row level security applies.
async fn run_as_user(config: &Config, mode: JanitorMode, store: PostgrestStore) -> Result<bool> {
    let token = config
        .user_access_token
        .as_ref()
        .ok_or(JanitorError::NotAuthenticated)?;
    let store = store.with_access_token(token.as_str());
    let identity = GoTrueAuth::new(
        build_http_client(config.store.timeout(), USER_AGENT)?,
        config.store.url.as_str(),
        config.store.key.as_str(),
        token.as_str(),
    )?;

    if mode == JanitorMode::RepairProfile {
        let repair = ensure_profile(&identity, &store).await?;
        return emit(&repair, true);
    }

    let user = identity
        .current_user()
        .await?
        .ok_or(JanitorError::NotAuthenticated)?;
    let report = check_isolation(&store, &user.id).await;
    emit(&report, report.verified)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::init_from_env()?;
    let mode = config.mode()?;
    info!(?mode, "starting janitor");

    match run(&config, mode).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            error!(?mode, "janitor run did not succeed");
            std::process::exit(1);
        }
        Err(e) => {
            error!(?mode, "janitor run failed: {}", e);
            Err(e)
        }
    }
}
