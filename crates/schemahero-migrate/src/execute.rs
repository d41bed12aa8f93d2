use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{Database, Migration, MigrationState, Resource};
use schemahero_core::now_unix;

use crate::MigrationEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Executed { statements: usize },
    /// Not approved yet, rejected, or already executed.
    NotReady { state: MigrationState },
    /// An earlier attempt failed; needs a recalculate.
    Blocked { error: String },
}

impl MigrationEngine {
    /// Apply an approved migration's statements in order.
    ///
    /// A failure is recorded on `status.lastError` and returned; the
    /// migration is not retried automatically because earlier statements
    /// may already have been applied.
    pub async fn execute(&self, namespace: &str, name: &str) -> Result<ExecuteOutcome, SchemaHeroError> {
        let migration: Migration = self.client().get_required(namespace, name).await?;
        if let Some(error) = &migration.status.last_error {
            return Ok(ExecuteOutcome::Blocked {
                error: error.clone(),
            });
        }
        if !migration.is_ready_to_execute() {
            return Ok(ExecuteOutcome::NotReady {
                state: migration.state(),
            });
        }

        let statements = migration.statements();
        if !statements.is_empty() {
            let database: Database = self
                .client()
                .get_required(namespace, &migration.spec.database_name)
                .await?;
            let conn = self.planner.connect(&database).await?;
            let deployed = conn.deploy_statements(&statements).await;
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "closing driver connection failed");
            }
            if let Err(e) = deployed {
                tracing::error!(namespace, migration = name, error = %e, "migration failed");
                self.record_failure(namespace, name, &e).await?;
                return Err(e);
            }
        }

        let mut current: Migration = self.client().get_required(namespace, name).await?;
        current.mark_executed(now_unix())?;
        self.client().update(&current).await?;
        tracing::info!(namespace, migration = name, statements = statements.len(), "migration executed");
        Ok(ExecuteOutcome::Executed {
            statements: statements.len(),
        })
    }

    async fn record_failure(
        &self,
        namespace: &str,
        name: &str,
        error: &SchemaHeroError,
    ) -> Result<(), SchemaHeroError> {
        let mut current: Migration = self.client().get_required(namespace, name).await?;
        current.record_failure(error.to_string());
        self.client().update(&current).await?;
        Ok(())
    }
}
