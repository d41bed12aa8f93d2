use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;

use schemahero_controller::{run_cluster, run_databases, ManagedDatabases, RuntimeSettings, StoreWorkloadHost};

use super::context::Context;

#[derive(Args)]
pub struct ManagerArgs {
    /// Namespace of the database this worker serves (informational)
    #[arg(long, env = "SCHEMAHERO_NAMESPACE")]
    pub namespace: Option<String>,

    /// Run the per-database controllers for these databases (`*` for all)
    #[arg(long, env = "SCHEMAHERO_DATABASE_NAME", value_delimiter = ',')]
    pub database_name: Vec<String>,

    /// Override the configured reconcile worker count
    #[arg(long, env = "SCHEMAHERO_WORKERS")]
    pub workers: Option<usize>,
}

pub async fn run(args: ManagerArgs) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let mut settings = RuntimeSettings::from_config(&ctx.config);
    if let Some(workers) = args.workers {
        settings.workers = workers.max(1);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        on_signal.cancel();
    });

    let planner = ctx.planner()?;
    if args.database_name.is_empty() {
        tracing::info!(image = %ctx.config.manager_image, "starting database controller");
        let host = Arc::new(StoreWorkloadHost::new(ctx.client.clone()));
        run_cluster(planner, host, ctx.config.manager_image.clone(), settings, cancel).await?;
    } else {
        tracing::info!(
            namespace = args.namespace.as_deref().unwrap_or("*"),
            databases = ?args.database_name,
            "starting per-database controllers"
        );
        let managed = ManagedDatabases::from_names(args.database_name);
        run_databases(planner, managed, settings, cancel).await?;
    }
    Ok(())
}
