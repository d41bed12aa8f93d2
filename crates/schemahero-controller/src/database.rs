use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use schemahero_auth::vault::agent_annotations;
use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{Database, Resource};

use crate::runtime::{Action, Reconciler};
use crate::workload::{DesiredWorker, WorkloadHost};

/// Cluster-wide controller keeping a worker, service account and role per database.
pub struct DatabaseReconciler {
    host: Arc<dyn WorkloadHost>,
    image: String,
}

impl DatabaseReconciler {
    pub fn new(host: Arc<dyn WorkloadHost>, image: impl Into<String>) -> Self {
        Self {
            host,
            image: image.into(),
        }
    }
}

/// Vault agent directives for the worker pod, if a credential comes from an injected agent.
pub fn pod_annotations(database: &Database) -> Result<BTreeMap<String, String>, SchemaHeroError> {
    let variant = database
        .spec
        .connection
        .variant()
        .map_err(|e| SchemaHeroError::invalid_spec(Database::KIND, database.name(), e))?;
    let vault = variant
        .values()
        .into_iter()
        .find_map(|v| v.vault().filter(|vault| vault.agent_inject));
    match vault {
        Some(vault) => agent_annotations(vault, variant.dialect(), database.name()),
        None => Ok(BTreeMap::new()),
    }
}

#[async_trait]
impl Reconciler for DatabaseReconciler {
    type Object = Database;

    fn name(&self) -> &'static str {
        "database"
    }

    async fn reconcile(&self, database: Database) -> Result<Action, SchemaHeroError> {
        let annotations = pod_annotations(&database)?;
        let desired = DesiredWorker::for_database(&database, &self.image, annotations);
        if self.host.apply(&desired).await? {
            tracing::info!(
                namespace = %database.namespace(),
                database = %database.name(),
                workload = %desired.workload.metadata.name,
                "applied database worker"
            );
        }
        Ok(Action::Done)
    }
}
