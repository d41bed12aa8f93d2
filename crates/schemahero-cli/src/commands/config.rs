use clap::Subcommand;
use schemahero_core::config::SchemaHeroConfig;
use schemahero_store::SqliteStore;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Initialize ~/.schemahero/ with a default config and resource store
    Init,
    /// Show the effective configuration
    Show,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let home = SchemaHeroConfig::init()?;
            let config = SchemaHeroConfig::load()?;
            let store_path = config.store_path()?;

            // Create the store so its schema exists before the first command.
            SqliteStore::open(&store_path)?;

            println!("Initialized schemahero at {}", home.display());
            println!("  config: {}", SchemaHeroConfig::config_path()?.display());
            println!("  store: {}", store_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = SchemaHeroConfig::load()?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
            Ok(())
        }
    }
}
