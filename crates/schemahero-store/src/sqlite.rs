use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use schemahero_core::error::SchemaHeroError;

use crate::backend::{Backend, Store};
use crate::migration;
use crate::ResourceKey;

/// Store persisted in a local SQLite file.
pub type SqliteStore = Store<SqliteBackend>;

impl SqliteStore {
    /// Open (or create) the store at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, SchemaHeroError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(db_err)?;
        migration::run_migrations(&conn).map_err(|e| SchemaHeroError::Store(e.to_string()))?;
        Ok(Store::with_backend(SqliteBackend { conn }))
    }

    /// Open an in-memory store for testing.
    pub fn open_in_memory() -> Result<Self, SchemaHeroError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db_err)?;
        migration::run_migrations(&conn).map_err(|e| SchemaHeroError::Store(e.to_string()))?;
        Ok(Store::with_backend(SqliteBackend { conn }))
    }
}

fn db_err(e: rusqlite::Error) -> SchemaHeroError {
    SchemaHeroError::Store(e.to_string())
}

fn parse_document(raw: String) -> Result<Value, SchemaHeroError> {
    Ok(serde_json::from_str(&raw)?)
}

pub struct SqliteBackend {
    conn: Connection,
}

impl Backend for SqliteBackend {
    fn get(&self, key: &ResourceKey) -> Result<Option<Value>, SchemaHeroError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM resources WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                params![key.kind, key.namespace, key.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(parse_document).transpose()
    }

    fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Value>, SchemaHeroError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT document FROM resources
                 WHERE kind = ?1 AND (?2 IS NULL OR namespace = ?2)
                 ORDER BY namespace, name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![kind, namespace], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut docs = Vec::new();
        for raw in rows {
            docs.push(parse_document(raw.map_err(db_err)?)?);
        }
        Ok(docs)
    }

    fn put(
        &mut self,
        key: &ResourceKey,
        uid: &str,
        resource_version: u64,
        doc: &Value,
        owner_uids: &[String],
    ) -> Result<(), SchemaHeroError> {
        let document = serde_json::to_string(doc)?;
        let tx = self.conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO resources (kind, namespace, name, uid, resource_version, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
             ON CONFLICT (kind, namespace, name) DO UPDATE SET
                 resource_version = excluded.resource_version,
                 document = excluded.document,
                 updated_at = excluded.updated_at",
            params![
                key.kind,
                key.namespace,
                key.name,
                uid,
                resource_version as i64,
                document
            ],
        )
        .map_err(db_err)?;
        tx.execute(
            "DELETE FROM owner_references WHERE dependent_uid = ?1",
            params![uid],
        )
        .map_err(db_err)?;
        for owner in owner_uids {
            tx.execute(
                "INSERT OR IGNORE INTO owner_references (owner_uid, dependent_uid) VALUES (?1, ?2)",
                params![owner, uid],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    fn remove(&mut self, key: &ResourceKey) -> Result<Option<String>, SchemaHeroError> {
        let uid: Option<String> = self
            .conn
            .query_row(
                "SELECT uid FROM resources WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                params![key.kind, key.namespace, key.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if uid.is_some() {
            self.conn
                .execute(
                    "DELETE FROM resources WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                    params![key.kind, key.namespace, key.name],
                )
                .map_err(db_err)?;
        }
        Ok(uid)
    }

    fn dependents(
        &self,
        owner_uid: &str,
    ) -> Result<Vec<(ResourceKey, Vec<String>)>, SchemaHeroError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT r.kind, r.namespace, r.name, r.uid
                 FROM owner_references o JOIN resources r ON r.uid = o.dependent_uid
                 WHERE o.owner_uid = ?1
                 ORDER BY r.kind, r.namespace, r.name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![owner_uid], |row| {
                Ok((
                    ResourceKey {
                        kind: row.get(0)?,
                        namespace: row.get(1)?,
                        name: row.get(2)?,
                    },
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?;

        let mut dependents = Vec::new();
        for row in rows {
            let (key, dependent_uid) = row.map_err(db_err)?;
            let mut owners_stmt = self
                .conn
                .prepare("SELECT owner_uid FROM owner_references WHERE dependent_uid = ?1")
                .map_err(db_err)?;
            let owners = owners_stmt
                .query_map(params![dependent_uid], |r| r.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            dependents.push((key, owners));
        }
        Ok(dependents)
    }

    fn forget_owner(&mut self, owner_uid: &str) -> Result<(), SchemaHeroError> {
        self.conn
            .execute(
                "DELETE FROM owner_references WHERE owner_uid = ?1",
                params![owner_uid],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn uid_exists(&self, uid: &str) -> Result<bool, SchemaHeroError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM resources WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }

    fn next_resource_version(&mut self) -> Result<u64, SchemaHeroError> {
        self.conn
            .execute(
                "UPDATE resource_version_counter SET value = value + 1 WHERE id = 1",
                [],
            )
            .map_err(db_err)?;
        let value: i64 = self
            .conn
            .query_row(
                "SELECT value FROM resource_version_counter WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(value as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_reopen_keeps_documents_and_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");

        let first_version = {
            let store = SqliteStore::open(&path).unwrap();
            let created = store
                .create(
                    "Database",
                    json!({"metadata": {"name": "app", "namespace": "default"}, "spec": {}}),
                )
                .await
                .unwrap();
            created["metadata"]["resourceVersion"].as_u64().unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let found = store.get("Database", "default", "app").await.unwrap().unwrap();
        assert_eq!(found["metadata"]["resourceVersion"], first_version);

        let other = store
            .create(
                "Database",
                json!({"metadata": {"name": "other", "namespace": "default"}, "spec": {}}),
            )
            .await
            .unwrap();
        assert!(other["metadata"]["resourceVersion"].as_u64().unwrap() > first_version);
        assert_eq!(store.list("Database", None).await.unwrap().len(), 2);
    }
}
