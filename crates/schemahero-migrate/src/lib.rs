//! Migration lifecycle: approval, rejection, recalculation and execution.

pub mod execute;
pub mod transition;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{Migration, Resource};
use schemahero_planner::Planner;
use schemahero_store::Client;

pub use execute::ExecuteOutcome;

/// Drives `Migration` resources through their state machine.
#[derive(Clone)]
pub struct MigrationEngine {
    planner: Planner,
}

impl MigrationEngine {
    pub fn new(planner: Planner) -> Self {
        Self { planner }
    }

    pub fn client(&self) -> &Client {
        self.planner.client()
    }

    /// Look a migration up by name. `None` searches every namespace and
    /// refuses names that exist in more than one.
    pub async fn find(&self, namespace: Option<&str>, name: &str) -> Result<Migration, SchemaHeroError> {
        if let Some(ns) = namespace {
            return self.client().get_required(ns, name).await;
        }
        let mut matches: Vec<Migration> = self
            .client()
            .list::<Migration>(None)
            .await?
            .into_iter()
            .filter(|m| m.name() == name)
            .collect();
        match matches.len() {
            0 => Err(SchemaHeroError::not_found(Migration::KIND, "*", name)),
            1 => Ok(matches.remove(0)),
            _ => {
                let namespaces: Vec<&str> = matches.iter().map(|m| m.namespace()).collect();
                Err(SchemaHeroError::Config {
                    message: format!(
                        "migration {name} exists in several namespaces ({}); pass a namespace",
                        namespaces.join(", ")
                    ),
                })
            }
        }
    }
}
