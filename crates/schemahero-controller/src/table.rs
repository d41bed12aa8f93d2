use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{Database, Resource, SchemaObject, Table};
use schemahero_planner::{check_dialect, PlanOutcome, Planner};

use crate::batch::BatchCoalescer;
use crate::object::surface_error;
use crate::runtime::{Action, Reconciler};
use crate::ManagedDatabases;

/// How long to wait for a table's database to appear.
pub const MISSING_DATABASE_REQUEUE: Duration = Duration::from_secs(10);

pub struct TableReconciler {
    planner: Planner,
    managed: ManagedDatabases,
    coalescer: Arc<BatchCoalescer>,
}

impl TableReconciler {
    pub fn new(planner: Planner, managed: ManagedDatabases, coalescer: Arc<BatchCoalescer>) -> Self {
        Self {
            planner,
            managed,
            coalescer,
        }
    }
}

#[async_trait]
impl Reconciler for TableReconciler {
    type Object = Table;

    fn name(&self) -> &'static str {
        "table"
    }

    fn owns(&self, table: &Table) -> bool {
        self.managed.contains(&table.spec.database)
    }

    async fn reconcile(&self, table: Table) -> Result<Action, SchemaHeroError> {
        let result = self.converge(&table).await;
        surface_error(&self.planner, &table, &result).await;
        result
    }
}

impl TableReconciler {
    async fn converge(&self, table: &Table) -> Result<Action, SchemaHeroError> {
        let sha = table.spec_sha()?;
        if table.last_planned_sha() == Some(sha.as_str()) {
            return Ok(Action::Done);
        }

        let Some(database) = self
            .planner
            .client()
            .get::<Database>(table.namespace(), &table.spec.database)
            .await?
        else {
            tracing::debug!(
                namespace = %table.namespace(),
                name = %table.name(),
                database = %table.spec.database,
                "database not found, requeueing"
            );
            return Ok(Action::RequeueAfter(MISSING_DATABASE_REQUEUE));
        };

        check_dialect(table, &database)?;
        if self
            .planner
            .existing_migration(table.namespace(), &sha)
            .await?
            .is_some()
        {
            return Ok(Action::Done);
        }

        if let Some(window) = database.batch_window()? {
            self.coalescer.enqueue(&database, table.clone(), window).await;
            return Ok(Action::Done);
        }

        match self.planner.plan_object(table, &database).await? {
            PlanOutcome::Created { migration, .. } => {
                tracing::debug!(namespace = %table.namespace(), name = %table.name(), migration = %migration, "table planned");
            }
            PlanOutcome::Empty { .. } | PlanOutcome::AlreadyPlanned { .. } => {}
        }
        Ok(Action::Done)
    }
}
