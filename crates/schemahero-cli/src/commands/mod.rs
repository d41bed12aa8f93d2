pub mod apply;
pub mod config;
pub mod context;
pub mod describe;
pub mod get;
pub mod import;
pub mod lint;
pub mod manager;
pub mod migration;
pub mod plan;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Print the DDL that converges a live database to spec files
    Plan(plan::PlanArgs),
    /// Execute a DDL file against a database
    Apply(apply::ApplyArgs),
    /// Approve a planned migration
    Approve {
        #[command(subcommand)]
        target: migration::Target,
    },
    /// Reject a planned migration
    Reject {
        #[command(subcommand)]
        target: migration::Target,
    },
    /// Delete a migration so its tables are planned again
    Recalculate {
        #[command(subcommand)]
        target: migration::Target,
    },
    /// List resources
    Get(get::GetArgs),
    /// Show one migration in detail
    Describe {
        #[command(subcommand)]
        target: migration::Target,
    },
    /// Validate spec files
    Lint(lint::LintArgs),
    /// Load resource documents into the local store
    Import(import::ImportArgs),
    /// Run the controllers
    Manager(manager::ManagerArgs),
    /// Initialize and show configuration
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Plan(args) => plan::run(args).await,
        Command::Apply(args) => apply::run(args).await,
        Command::Approve { target } => migration::approve(target).await,
        Command::Reject { target } => migration::reject(target).await,
        Command::Recalculate { target } => migration::recalculate(target).await,
        Command::Get(args) => get::run(args).await,
        Command::Describe { target } => describe::run(target).await,
        Command::Lint(args) => lint::run(args),
        Command::Import(args) => import::run(args).await,
        Command::Manager(args) => manager::run(args).await,
        Command::Config { action } => config::run(action),
    }
}
