use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{
    DatabaseExtension, Function, Migration, ObjectRef, Resource, SchemaObject, Table, View,
};
use schemahero_core::now_unix;

use crate::MigrationEngine;

impl MigrationEngine {
    /// Planned → Approved. Writes nothing when already approved.
    pub async fn approve(&self, namespace: Option<&str>, name: &str) -> Result<Migration, SchemaHeroError> {
        let mut migration = self.find(namespace, name).await?;
        let before = migration.status.approved_at;
        migration.approve(now_unix())?;
        if migration.status.approved_at == before {
            return Ok(migration);
        }
        let migration = self.client().update(&migration).await?;
        tracing::info!(namespace = %migration.namespace(), migration = %migration.name(), "migration approved");
        Ok(migration)
    }

    /// Planned → Rejected. Writes nothing when already rejected.
    pub async fn reject(&self, namespace: Option<&str>, name: &str) -> Result<Migration, SchemaHeroError> {
        let mut migration = self.find(namespace, name).await?;
        let before = migration.status.rejected_at;
        migration.reject(now_unix())?;
        if migration.status.rejected_at == before {
            return Ok(migration);
        }
        let migration = self.client().update(&migration).await?;
        tracing::info!(namespace = %migration.namespace(), migration = %migration.name(), "migration rejected");
        Ok(migration)
    }

    /// Delete the migration and clear the recorded fingerprint of every
    /// object it was planned from, so they are planned again.
    ///
    /// Returns the objects whose fingerprint was cleared.
    pub async fn recalculate(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Vec<ObjectRef>, SchemaHeroError> {
        let migration = self.find(namespace, name).await?;
        let ns = migration.namespace().to_string();
        self.client().delete::<Migration>(&ns, name).await?;

        // Migrations planned from views, functions or extensions name no table.
        let owners = &migration.metadata.owner_references;
        let from_tables = owners.is_empty() || owners.iter().any(|o| o.kind == Table::KIND);
        let tables = if from_tables { migration.table_refs() } else { Vec::new() };

        let mut cleared = Vec::new();
        for table in tables {
            if self.clear_planned::<Table>(&table.namespace, &table.name).await? {
                cleared.push(table);
            }
        }
        for owner in &migration.metadata.owner_references {
            let kind = owner.kind.as_str();
            let done = if kind == View::KIND {
                self.clear_planned::<View>(&ns, &owner.name).await?
            } else if kind == Function::KIND {
                self.clear_planned::<Function>(&ns, &owner.name).await?
            } else if kind == DatabaseExtension::KIND {
                self.clear_planned::<DatabaseExtension>(&ns, &owner.name).await?
            } else {
                false
            };
            if done {
                cleared.push(ObjectRef::new(ns.clone(), owner.name.clone()));
            }
        }

        tracing::info!(namespace = %ns, migration = %name, cleared = cleared.len(), "migration recalculated");
        Ok(cleared)
    }

    async fn clear_planned<T: SchemaObject>(&self, namespace: &str, name: &str) -> Result<bool, SchemaHeroError> {
        let Some(mut obj) = self.client().get::<T>(namespace, name).await? else {
            return Ok(false);
        };
        if obj.last_planned_sha().is_none() {
            return Ok(false);
        }
        obj.set_last_planned_sha(None);
        self.client().update(&obj).await?;
        Ok(true)
    }
}
