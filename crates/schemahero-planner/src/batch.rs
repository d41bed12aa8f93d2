use schemahero_core::ddl::join_statements;
use schemahero_core::error::SchemaHeroError;
use schemahero_core::fingerprint::batch_sha;
use schemahero_core::models::migration::BATCH_PREFIX;
use schemahero_core::models::{
    Database, Migration, MigrationSpec, ObjectRef, Resource, SchemaObject, Table,
};
use schemahero_core::now_unix;
use schemahero_driver::DriverConnection;

use crate::order::order_by_requires;
use crate::plan::{check_dialect, object_statements};
use crate::{close, Planner};

/// What a batch flush did with each table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub migration: Option<String>,
    /// Tables whose DDL went into the migration.
    pub planned: Vec<ObjectRef>,
    /// Tables that needed no changes.
    pub empty: Vec<ObjectRef>,
    pub failed: Vec<(ObjectRef, String)>,
}

struct Planned<'a> {
    table: &'a Table,
    sha: String,
    statements: Vec<String>,
}

impl Planner {
    /// Plan every table independently and merge the non-empty plans into a single
    /// `batch-<sha>` migration owned by the first of them.
    ///
    /// A table whose plan fails is skipped; its fingerprint is not advanced.
    pub async fn plan_batch(
        &self,
        database: &Database,
        tables: Vec<Table>,
    ) -> Result<BatchOutcome, SchemaHeroError> {
        let tables = order_by_requires(tables)?;
        let mut outcome = BatchOutcome::default();
        if tables.is_empty() {
            return Ok(outcome);
        }

        let conn = self.connect(database).await?;
        let (planned, empty) = self
            .plan_each(conn.as_ref(), database, &tables, &mut outcome)
            .await;
        close(conn).await;

        for (table, sha) in empty {
            self.mark_planned(table, &sha).await?;
            outcome.empty.push(table.object_ref());
        }
        if planned.is_empty() {
            return Ok(outcome);
        }

        let shas: Vec<String> = planned.iter().map(|p| p.sha.clone()).collect();
        let name = format!("{BATCH_PREFIX}{}", batch_sha(&shas));
        let primary = planned[0].table;
        let statements: Vec<String> = planned
            .iter()
            .flat_map(|p| p.statements.iter().cloned())
            .collect();
        let refs: Vec<ObjectRef> = planned.iter().map(|p| p.table.object_ref()).collect();

        let spec = MigrationSpec {
            table_name: primary.name().to_string(),
            table_namespace: primary.namespace().to_string(),
            database_name: database.name().to_string(),
            generated_ddl: join_statements(&statements),
            tables: refs.clone(),
        };
        let mut migration = Migration::planned(
            database.namespace(),
            &name,
            spec,
            now_unix(),
            database.spec.immediate_deploy,
        );
        if let Some(owner) = primary.owner_reference() {
            migration.metadata.owner_references.push(owner);
        }
        self.client.upsert(&migration).await?;

        for p in &planned {
            self.mark_planned(p.table, &p.sha).await?;
        }
        tracing::info!(
            namespace = %database.namespace(),
            database = %database.name(),
            migration = %name,
            tables = refs.len(),
            statements = statements.len(),
            "planned batch migration"
        );
        outcome.migration = Some(name);
        outcome.planned = refs;
        Ok(outcome)
    }

    async fn plan_each<'a>(
        &self,
        conn: &dyn DriverConnection,
        database: &Database,
        tables: &'a [Table],
        outcome: &mut BatchOutcome,
    ) -> (Vec<Planned<'a>>, Vec<(&'a Table, String)>) {
        let mut planned = Vec::new();
        let mut empty = Vec::new();
        for table in tables {
            let result = async {
                let (_, document) = check_dialect(table, database)?;
                let sha = table.spec_sha()?;
                let statements =
                    object_statements(conn, table, document, self.seeds(database)).await?;
                Ok::<_, SchemaHeroError>((sha, statements))
            }
            .await;
            match result {
                Ok((sha, statements)) if statements.is_empty() => empty.push((table, sha)),
                Ok((sha, statements)) => planned.push(Planned {
                    table,
                    sha,
                    statements,
                }),
                Err(e) => {
                    tracing::warn!(
                        namespace = %table.namespace(),
                        name = %table.name(),
                        error = %e,
                        "skipping table in batch"
                    );
                    if !e.kind().is_retryable() {
                        if let Err(status) = self.record_error(table, Some(&e)).await {
                            tracing::warn!(name = %table.name(), error = %status, "could not update status");
                        }
                    }
                    outcome.failed.push((table.object_ref(), e.to_string()));
                }
            }
        }
        (planned, empty)
    }
}
