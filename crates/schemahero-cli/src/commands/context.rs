use std::sync::Arc;

use schemahero_auth::CredentialResolver;
use schemahero_core::config::SchemaHeroConfig;
use schemahero_driver::PluginHost;
use schemahero_migrate::MigrationEngine;
use schemahero_planner::Planner;
use schemahero_store::{Client, SqliteStore};

/// Everything a command needs to talk to the local store and the drivers.
pub struct Context {
    pub config: SchemaHeroConfig,
    pub client: Client,
    pub host: PluginHost,
}

impl Context {
    pub fn load() -> anyhow::Result<Self> {
        let config = SchemaHeroConfig::load()?;
        let store_path = config.store_path()?;
        tracing::debug!(path = %store_path.display(), "opening store");
        let client = Client::new(Arc::new(SqliteStore::open(&store_path)?));
        let host = PluginHost::from_config(&config);
        Ok(Self {
            config,
            client,
            host,
        })
    }

    pub fn planner(&self) -> anyhow::Result<Planner> {
        let resolver = CredentialResolver::new(self.client.clone())?
            .with_vault_agent_uri_path(self.config.vault_agent_uri_path.clone());
        Ok(Planner::new(
            self.client.clone(),
            Arc::new(resolver),
            Arc::new(self.host.clone()),
        )
        .with_deploy_seed_data(self.config.deploy_seed_data))
    }

    pub fn engine(&self) -> anyhow::Result<MigrationEngine> {
        Ok(MigrationEngine::new(self.planner()?))
    }
}

/// Unix seconds as local wall time, `-` when unset.
pub fn format_timestamp(secs: i64) -> String {
    if secs <= 0 {
        return "-".to_string();
    }
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| secs.to_string())
}
