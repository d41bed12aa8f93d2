use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use schemahero_auth::redact_uri;
use schemahero_core::config::SchemaHeroConfig;
use schemahero_core::ddl::split_statements;
use schemahero_core::models::Dialect;
use schemahero_driver::{DatabaseDriver, PluginHost};

#[derive(Args)]
pub struct ApplyArgs {
    /// Database driver
    #[arg(long, env = "SCHEMAHERO_DRIVER")]
    pub driver: Dialect,

    /// Connection URI of the target database
    #[arg(long, env = "SCHEMAHERO_URI")]
    pub uri: String,

    /// File of `;`-separated DDL statements
    #[arg(long, env = "SCHEMAHERO_DDL")]
    pub ddl: PathBuf,
}

pub async fn run(args: ApplyArgs) -> anyhow::Result<()> {
    let ddl = std::fs::read_to_string(&args.ddl)
        .with_context(|| format!("reading {}", args.ddl.display()))?;
    let statements = split_statements(&ddl);
    if statements.is_empty() {
        println!("Nothing to apply.");
        return Ok(());
    }

    let host = PluginHost::from_config(&SchemaHeroConfig::load()?);
    tracing::info!(driver = %args.driver, uri = %redact_uri(&args.uri), statements = statements.len(), "applying ddl");

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")?.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("applying {} statements", statements.len()));

    let conn = host.connect(args.driver, &args.uri, &Value::Null).await?;
    let deployed = conn.deploy_statements(&statements).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "closing driver connection failed");
    }

    match deployed {
        Ok(()) => {
            spinner.finish_with_message(format!("applied {} statements", statements.len()));
            Ok(())
        }
        Err(e) => {
            spinner.abandon_with_message("apply failed");
            Err(e.into())
        }
    }
}
