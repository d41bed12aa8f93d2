use async_trait::async_trait;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{Migration, Resource};
use schemahero_migrate::{ExecuteOutcome, MigrationEngine};

use crate::runtime::{Action, Reconciler};
use crate::ManagedDatabases;

/// Executes approved migrations of the managed databases.
pub struct MigrationReconciler {
    engine: MigrationEngine,
    managed: ManagedDatabases,
}

impl MigrationReconciler {
    pub fn new(engine: MigrationEngine, managed: ManagedDatabases) -> Self {
        Self { engine, managed }
    }
}

#[async_trait]
impl Reconciler for MigrationReconciler {
    type Object = Migration;

    fn name(&self) -> &'static str {
        "migration"
    }

    fn owns(&self, migration: &Migration) -> bool {
        self.managed.contains(&migration.spec.database_name)
    }

    async fn reconcile(&self, migration: Migration) -> Result<Action, SchemaHeroError> {
        if !migration.is_ready_to_execute() {
            return Ok(Action::Done);
        }
        match self
            .engine
            .execute(migration.namespace(), migration.name())
            .await?
        {
            ExecuteOutcome::Executed { statements } => {
                tracing::debug!(namespace = %migration.namespace(), migration = %migration.name(), statements, "applied");
            }
            ExecuteOutcome::Blocked { error } => {
                tracing::debug!(namespace = %migration.namespace(), migration = %migration.name(), error = %error, "blocked by an earlier failure");
            }
            ExecuteOutcome::NotReady { .. } => {}
        }
        Ok(Action::Done)
    }
}
