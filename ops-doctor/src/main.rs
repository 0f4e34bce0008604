use envconfig::Envconfig;
use eyre::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ops_doctor::config::DoctorConfig;
use ops_doctor::diagnostics::{Diagnostics, ProductionDiagnostics};

/// Run every diagnostic and print the report. Returns whether the deployment looks healthy.
async fn run(diagnostics: &dyn Diagnostics) -> Result<bool> {
    let report = diagnostics.run_all().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.ok)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DoctorConfig::init_from_env()?;
    let diagnostics = ProductionDiagnostics::new(config)?;
    info!("running deployment diagnostics");

    if !run(&diagnostics).await? {
        error!("deployment diagnostics found problems");
        std::process::exit(1);
    }

    Ok(())
}
