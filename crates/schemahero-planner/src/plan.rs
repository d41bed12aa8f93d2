use serde_json::Value;

use schemahero_core::ddl::join_statements;
use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::table::SeedData;
use schemahero_core::models::{
    Database, DatabaseExtension, Dialect, Function, Migration, MigrationSpec, ObjectKind,
    Resource, SchemaObject, Table, View,
};
use schemahero_core::now_unix;
use schemahero_driver::{plan_object, DriverConnection};

use crate::{close, Planner};

/// A schema object the planner knows how to route to the driver.
pub trait Plannable: SchemaObject {
    fn seed_data(&self) -> Option<&SeedData> {
        None
    }
}

impl Plannable for Table {
    fn seed_data(&self) -> Option<&SeedData> {
        self.spec.seed_data.as_ref().filter(|s| !s.rows.is_empty())
    }
}

impl Plannable for View {}
impl Plannable for Function {}
impl Plannable for DatabaseExtension {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// A migration for this spec already exists.
    AlreadyPlanned { migration: String },
    /// The live database already matches; only the fingerprint was recorded.
    Empty { sha: String },
    Created {
        migration: String,
        statements: usize,
        approved: bool,
    },
}

/// The object's schema document, provided its dialect matches the database's.
pub fn check_dialect<'a, T: SchemaObject>(
    obj: &'a T,
    database: &Database,
) -> Result<(Dialect, &'a Value), SchemaHeroError> {
    let (schema_dialect, document) = obj
        .schema()
        .variant()
        .map_err(|e| SchemaHeroError::invalid_spec(T::KIND, obj.name(), e))?;
    let connection_dialect = database
        .spec
        .connection
        .dialect()
        .map_err(|e| SchemaHeroError::invalid_spec(Database::KIND, database.name(), e))?;
    if schema_dialect != connection_dialect {
        return Err(SchemaHeroError::DialectMismatch {
            table: obj.name().to_string(),
            database: database.name().to_string(),
            schema: schema_dialect.to_string(),
            connection: connection_dialect.to_string(),
        });
    }
    Ok((schema_dialect, document))
}

/// Ask the driver for the DDL that converges `obj`.
pub async fn object_statements<T: Plannable>(
    conn: &dyn DriverConnection,
    obj: &T,
    document: &Value,
    with_seed_data: bool,
) -> Result<Vec<String>, SchemaHeroError> {
    match T::OBJECT_KIND {
        ObjectKind::Table => {
            let seed = if with_seed_data { obj.seed_data() } else { None };
            conn.plan_table_schema(obj.sql_name(), document, seed).await
        }
        kind => plan_object(conn, kind, obj.sql_name(), document).await,
    }
}

impl Planner {
    /// Plan `obj` against `database` and store the result as a migration named
    /// after the spec fingerprint.
    pub async fn plan_object<T: Plannable>(
        &self,
        obj: &T,
        database: &Database,
    ) -> Result<PlanOutcome, SchemaHeroError> {
        let (_, document) = check_dialect(obj, database)?;
        let sha = obj.spec_sha()?;
        if let Some(existing) = self.existing_migration(obj.namespace(), &sha).await? {
            tracing::debug!(namespace = %obj.namespace(), name = %obj.name(), migration = %existing.metadata.name, "migration already planned");
            return Ok(PlanOutcome::AlreadyPlanned {
                migration: existing.metadata.name,
            });
        }

        let conn = self.connect(database).await?;
        let planned = object_statements(conn.as_ref(), obj, document, self.seeds(database)).await;
        close(conn).await;
        let statements = planned?;

        if statements.is_empty() {
            tracing::info!(kind = T::KIND, namespace = %obj.namespace(), name = %obj.name(), sha = %sha, "no changes to plan");
            self.mark_planned(obj, &sha).await?;
            return Ok(PlanOutcome::Empty { sha });
        }

        // Only tables are recorded as the migration's table; other kinds are
        // reachable through the owner reference.
        let (table_name, table_namespace) = match T::OBJECT_KIND {
            ObjectKind::Table => (obj.name().to_string(), obj.namespace().to_string()),
            _ => (String::new(), String::new()),
        };
        let spec = MigrationSpec {
            table_name,
            table_namespace,
            database_name: database.name().to_string(),
            generated_ddl: join_statements(&statements),
            tables: Vec::new(),
        };
        let mut migration = Migration::planned(
            obj.namespace(),
            &sha,
            spec,
            now_unix(),
            database.spec.immediate_deploy,
        );
        if let Some(owner) = obj.owner_reference() {
            migration.metadata.owner_references.push(owner);
        }
        self.client.upsert(&migration).await?;
        self.mark_planned(obj, &sha).await?;

        tracing::info!(
            kind = T::KIND,
            namespace = %obj.namespace(),
            name = %obj.name(),
            migration = %sha,
            statements = statements.len(),
            "planned migration"
        );
        Ok(PlanOutcome::Created {
            migration: sha,
            statements: statements.len(),
            approved: database.spec.immediate_deploy,
        })
    }

    /// Record `sha` as planned on the stored copy of `obj`, unless its spec has
    /// changed since.
    pub async fn mark_planned<T: Plannable>(&self, obj: &T, sha: &str) -> Result<(), SchemaHeroError> {
        let Some(mut current) = self.client.get::<T>(obj.namespace(), obj.name()).await? else {
            return Ok(());
        };
        if current.spec_sha()? != sha {
            tracing::debug!(kind = T::KIND, namespace = %obj.namespace(), name = %obj.name(), "spec changed while planning");
            return Ok(());
        }
        if current.last_planned_sha() == Some(sha) && current.last_error().is_none() {
            return Ok(());
        }
        current.set_last_planned_sha(Some(sha.to_string()));
        current.set_last_error(None);
        self.client.update(&current).await?;
        Ok(())
    }

    /// Surface `error` on the stored copy of `obj`, or clear a previous one.
    /// Writes nothing when the status already says the same.
    pub async fn record_error<T: Plannable>(
        &self,
        obj: &T,
        error: Option<&SchemaHeroError>,
    ) -> Result<(), SchemaHeroError> {
        let Some(mut current) = self.client.get::<T>(obj.namespace(), obj.name()).await? else {
            return Ok(());
        };
        let message = error.map(ToString::to_string);
        if current.last_error() == message.as_deref() {
            return Ok(());
        }
        current.set_last_error(message);
        self.client.update(&current).await?;
        Ok(())
    }
}
