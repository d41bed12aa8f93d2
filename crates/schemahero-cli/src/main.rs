mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemahero", version, about = "Declarative database schema management")]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, env = "SCHEMAHERO_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    commands::run(cli.command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_approve() {
        let cli = Cli::try_parse_from([
            "schemahero",
            "approve",
            "migration",
            "abc1234",
            "-n",
            "prod",
        ])
        .unwrap();
        match cli.command {
            commands::Command::Approve { target } => {
                let commands::migration::Target::Migration(args) = target;
                assert_eq!(args.name, "abc1234");
                assert_eq!(args.scope(), Some("prod"));
            }
            _ => panic!("expected approve"),
        }
    }

    #[test]
    fn test_parse_plan() {
        let cli = Cli::try_parse_from([
            "schemahero",
            "plan",
            "--driver",
            "postgres",
            "--uri",
            "postgres://db/app",
            "--spec-file",
            "tables/",
            "--spec-type",
            "view",
        ])
        .unwrap();
        match cli.command {
            commands::Command::Plan(args) => {
                assert_eq!(args.driver, schemahero_core::models::Dialect::Postgres);
                assert_eq!(args.spec_type, schemahero_core::models::ObjectKind::View);
                assert!(!args.seed_data);
            }
            _ => panic!("expected plan"),
        }
    }
}
