//! The long-running manager: database workers, planning and execution loops.

pub mod batch;
pub mod database;
pub mod migration;
pub mod object;
pub mod options;
pub mod queue;
pub mod runtime;
pub mod table;
pub mod workload;

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use schemahero_core::error::SchemaHeroError;
use schemahero_migrate::MigrationEngine;
use schemahero_planner::Planner;

pub use batch::BatchCoalescer;
pub use database::DatabaseReconciler;
pub use migration::MigrationReconciler;
pub use object::ObjectReconciler;
pub use options::DatabaseOptionsReconciler;
pub use runtime::{Action, Controller, Reconciler, RuntimeSettings};
pub use table::TableReconciler;
pub use workload::{StoreWorkloadHost, WorkloadHost};

/// Database names a controller instance is responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedDatabases {
    All,
    Only(BTreeSet<String>),
}

impl ManagedDatabases {
    /// `*` anywhere in `names` selects every database.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.contains("*") {
            ManagedDatabases::All
        } else {
            ManagedDatabases::Only(names)
        }
    }

    pub fn contains(&self, database: &str) -> bool {
        match self {
            ManagedDatabases::All => true,
            ManagedDatabases::Only(names) => names.contains(database),
        }
    }
}

/// Runs the cluster-wide Database controller.
pub async fn run_cluster(
    planner: Planner,
    host: Arc<dyn WorkloadHost>,
    image: String,
    settings: RuntimeSettings,
    cancel: CancellationToken,
) -> Result<(), SchemaHeroError> {
    let client = planner.client().clone();
    Controller::new(client, DatabaseReconciler::new(host, image), settings)
        .run(cancel)
        .await
}

/// Runs every per-database controller for the `managed` databases.
pub async fn run_databases(
    planner: Planner,
    managed: ManagedDatabases,
    settings: RuntimeSettings,
    cancel: CancellationToken,
) -> Result<(), SchemaHeroError> {
    let client = planner.client().clone();
    let coalescer = BatchCoalescer::new(planner.clone());
    let engine = MigrationEngine::new(planner.clone());

    let mut tasks = JoinSet::new();
    tasks.spawn(
        Controller::new(
            client.clone(),
            DatabaseOptionsReconciler::new(planner.clone(), managed.clone()),
            settings,
        )
        .run(cancel.clone()),
    );
    tasks.spawn(
        Controller::new(
            client.clone(),
            TableReconciler::new(planner.clone(), managed.clone(), Arc::clone(&coalescer)),
            settings,
        )
        .run(cancel.clone()),
    );
    tasks.spawn(
        Controller::new(
            client.clone(),
            ObjectReconciler::views(planner.clone(), managed.clone()),
            settings,
        )
        .run(cancel.clone()),
    );
    tasks.spawn(
        Controller::new(
            client.clone(),
            ObjectReconciler::functions(planner.clone(), managed.clone()),
            settings,
        )
        .run(cancel.clone()),
    );
    tasks.spawn(
        Controller::new(
            client.clone(),
            ObjectReconciler::extensions(planner.clone(), managed.clone()),
            settings,
        )
        .run(cancel.clone()),
    );
    tasks.spawn(
        Controller::new(client, MigrationReconciler::new(engine, managed), settings).run(cancel.clone()),
    );

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(|e| SchemaHeroError::Internal(format!("controller task: {e}")));
        if let Err(e) = result.and_then(|r| r) {
            tracing::error!(error = %e, "controller exited");
            cancel.cancel();
            first_error.get_or_insert(e);
        }
    }
    coalescer.shut_down().await;
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_databases() {
        let all = ManagedDatabases::from_names(["app", "*"]);
        assert!(all.contains("anything"));
        let some = ManagedDatabases::from_names(["app"]);
        assert!(some.contains("app"));
        assert!(!some.contains("other"));
    }
}
