use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use schemahero_core::error::SchemaHeroError;

use crate::{EventType, ResourceKey, ResourceStore, WatchEvent};

const WATCH_CAPACITY: usize = 1024;

/// Raw persistence underneath [`Store`]. Every call runs under the store lock.
pub trait Backend: Send {
    fn get(&self, key: &ResourceKey) -> Result<Option<Value>, SchemaHeroError>;

    fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Value>, SchemaHeroError>;

    /// Insert or replace a document.
    fn put(
        &mut self,
        key: &ResourceKey,
        uid: &str,
        resource_version: u64,
        doc: &Value,
        owner_uids: &[String],
    ) -> Result<(), SchemaHeroError>;

    /// Remove a document, returning its uid.
    fn remove(&mut self, key: &ResourceKey) -> Result<Option<String>, SchemaHeroError>;

    /// Documents naming `owner_uid` as an owner, with all of their owner uids.
    fn dependents(&self, owner_uid: &str)
        -> Result<Vec<(ResourceKey, Vec<String>)>, SchemaHeroError>;

    /// Drop bookkeeping for an owner that no longer exists.
    fn forget_owner(&mut self, owner_uid: &str) -> Result<(), SchemaHeroError>;

    fn uid_exists(&self, uid: &str) -> Result<bool, SchemaHeroError>;

    fn next_resource_version(&mut self) -> Result<u64, SchemaHeroError>;
}

/// A [`ResourceStore`] over any [`Backend`].
pub struct Store<B> {
    backend: Mutex<B>,
    events: broadcast::Sender<WatchEvent>,
}

impl<B: Backend> Store<B> {
    pub fn with_backend(backend: B) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            backend: Mutex::new(backend),
            events,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, B>, SchemaHeroError> {
        self.backend
            .lock()
            .map_err(|_| SchemaHeroError::Internal("resource store lock poisoned".into()))
    }

    fn publish(&self, key: &ResourceKey, event: EventType) {
        // No subscribers is fine.
        let _ = self.events.send(WatchEvent {
            kind: key.kind.clone(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            event,
        });
    }

    fn collect_garbage(&self, backend: &mut B, root_uid: String) -> Result<(), SchemaHeroError> {
        let mut owners = vec![root_uid];
        while let Some(owner) = owners.pop() {
            for (key, owner_uids) in backend.dependents(&owner)? {
                let mut orphaned = true;
                for uid in &owner_uids {
                    if backend.uid_exists(uid)? {
                        orphaned = false;
                        break;
                    }
                }
                if !orphaned {
                    continue;
                }
                if let Some(uid) = backend.remove(&key)? {
                    tracing::debug!(kind = %key.kind, namespace = %key.namespace, name = %key.name, "garbage collected");
                    self.publish(&key, EventType::Deleted);
                    owners.push(uid);
                }
            }
            backend.forget_owner(&owner)?;
        }
        Ok(())
    }
}

fn key_of(kind: &str, doc: &Value) -> Result<ResourceKey, SchemaHeroError> {
    let name = doc
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if name.is_empty() {
        return Err(SchemaHeroError::invalid_spec(kind, "", "metadata.name is required"));
    }
    let namespace = doc
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(ResourceKey::new(kind, namespace, name))
}

fn owner_uids(doc: &Value) -> Vec<String> {
    doc.pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r.get("uid").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn resource_version(doc: &Value) -> Option<u64> {
    doc.pointer("/metadata/resourceVersion").and_then(Value::as_u64)
}

fn metadata_mut(doc: &mut Value) -> Result<&mut serde_json::Map<String, Value>, SchemaHeroError> {
    doc.get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| SchemaHeroError::Serialization("document has no metadata object".into()))
}

#[async_trait]
impl<B: Backend> ResourceStore for Store<B> {
    async fn get(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, SchemaHeroError> {
        self.lock()?.get(&ResourceKey::new(kind, namespace, name))
    }

    async fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>, SchemaHeroError> {
        self.lock()?.list(kind, namespace)
    }

    async fn create(&self, kind: &str, mut doc: Value) -> Result<Value, SchemaHeroError> {
        let key = key_of(kind, &doc)?;
        let mut backend = self.lock()?;
        if backend.get(&key)?.is_some() {
            return Err(SchemaHeroError::AlreadyExists {
                kind: key.kind,
                namespace: key.namespace,
                name: key.name,
            });
        }

        let uid = Uuid::now_v7().to_string();
        let version = backend.next_resource_version()?;
        let meta = metadata_mut(&mut doc)?;
        meta.insert("namespace".into(), json!(key.namespace));
        meta.insert("uid".into(), json!(uid));
        meta.insert("resourceVersion".into(), json!(version));
        meta.insert("creationTimestamp".into(), json!(schemahero_core::now_unix()));

        backend.put(&key, &uid, version, &doc, &owner_uids(&doc))?;
        drop(backend);

        self.publish(&key, EventType::Added);
        Ok(doc)
    }

    async fn update(&self, kind: &str, mut doc: Value) -> Result<Value, SchemaHeroError> {
        let key = key_of(kind, &doc)?;
        let mut backend = self.lock()?;
        let existing = backend.get(&key)?.ok_or_else(|| SchemaHeroError::NotFound {
            kind: key.kind.clone(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
        })?;

        let stored_version = resource_version(&existing).unwrap_or(0);
        if let Some(expected) = resource_version(&doc) {
            if expected != stored_version {
                return Err(SchemaHeroError::Conflict {
                    kind: key.kind,
                    namespace: key.namespace,
                    name: key.name,
                    message: format!(
                        "resourceVersion {expected} is stale, current is {stored_version}"
                    ),
                });
            }
        }

        let uid = existing
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let created = existing
            .pointer("/metadata/creationTimestamp")
            .cloned()
            .unwrap_or(Value::Null);
        {
            let meta = metadata_mut(&mut doc)?;
            meta.insert("namespace".into(), json!(key.namespace));
            meta.insert("uid".into(), json!(uid));
            meta.insert("resourceVersion".into(), json!(stored_version));
            meta.insert("creationTimestamp".into(), created);
        }
        if doc == existing {
            return Ok(existing);
        }

        let version = backend.next_resource_version()?;
        metadata_mut(&mut doc)?.insert("resourceVersion".into(), json!(version));
        backend.put(&key, &uid, version, &doc, &owner_uids(&doc))?;
        drop(backend);

        self.publish(&key, EventType::Modified);
        Ok(doc)
    }

    async fn delete(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<bool, SchemaHeroError> {
        let key = ResourceKey::new(kind, namespace, name);
        let mut backend = self.lock()?;
        let Some(uid) = backend.remove(&key)? else {
            return Ok(false);
        };
        self.publish(&key, EventType::Deleted);
        self.collect_garbage(&mut backend, uid)?;
        Ok(true)
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::sqlite::SqliteStore;

    fn doc(namespace: &str, name: &str) -> Value {
        json!({"metadata": {"name": name, "namespace": namespace}, "spec": {"n": 1}})
    }

    fn owned_by(namespace: &str, name: &str, owners: &[&Value]) -> Value {
        let refs: Vec<Value> = owners
            .iter()
            .map(|o| {
                json!({
                    "kind": "Table",
                    "name": o["metadata"]["name"],
                    "uid": o["metadata"]["uid"],
                    "controller": true
                })
            })
            .collect();
        json!({"metadata": {"name": name, "namespace": namespace, "ownerReferences": refs}, "spec": {}})
    }

    async fn exercise_crud(store: &dyn ResourceStore) {
        let created = store.create("Table", doc("default", "users")).await.unwrap();
        assert!(created["metadata"]["uid"].is_string());
        let v1 = created["metadata"]["resourceVersion"].as_u64().unwrap();

        let err = store.create("Table", doc("default", "users")).await.unwrap_err();
        assert!(err.is_already_exists());

        let mut changed = created.clone();
        changed["spec"]["n"] = json!(2);
        let updated = store.update("Table", changed.clone()).await.unwrap();
        let v2 = updated["metadata"]["resourceVersion"].as_u64().unwrap();
        assert!(v2 > v1);
        assert_eq!(updated["metadata"]["uid"], created["metadata"]["uid"]);

        // Stale version.
        let err = store.update("Table", changed).await.unwrap_err();
        assert!(matches!(err, SchemaHeroError::Conflict { .. }));

        // Unconditional update.
        let mut unconditional = doc("default", "users");
        unconditional["spec"]["n"] = json!(3);
        store.update("Table", unconditional).await.unwrap();

        let listed = store.list("Table", Some("default")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["spec"]["n"], 3);
        assert!(store.list("Table", Some("other")).await.unwrap().is_empty());

        assert!(store.delete("Table", "default", "users").await.unwrap());
        assert!(!store.delete("Table", "default", "users").await.unwrap());
        assert!(store.get("Table", "default", "users").await.unwrap().is_none());
    }

    async fn exercise_gc(store: &dyn ResourceStore) {
        let a = store.create("Table", doc("default", "a")).await.unwrap();
        let b = store.create("Table", doc("default", "b")).await.unwrap();
        store
            .create("Migration", owned_by("default", "solo", &[&a]))
            .await
            .unwrap();
        store
            .create("Migration", owned_by("default", "shared", &[&a, &b]))
            .await
            .unwrap();

        store.delete("Table", "default", "a").await.unwrap();
        assert!(store.get("Migration", "default", "solo").await.unwrap().is_none());
        assert!(store.get("Migration", "default", "shared").await.unwrap().is_some());

        store.delete("Table", "default", "b").await.unwrap();
        assert!(store.get("Migration", "default", "shared").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_crud() {
        exercise_crud(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_crud() {
        exercise_crud(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_memory_gc() {
        exercise_gc(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_gc() {
        exercise_gc(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_unchanged_update_is_not_a_write() {
        let store = MemoryStore::new();
        let created = store.create("Table", doc("default", "t")).await.unwrap();
        let mut events = store.watch();

        let same = store.update("Table", created.clone()).await.unwrap();
        assert_eq!(same, created);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watch_events() {
        let store = MemoryStore::new();
        let mut events = store.watch();
        let created = store.create("Database", doc("ns", "app")).await.unwrap();
        let mut changed = created;
        changed["spec"]["n"] = json!(5);
        store.update("Database", changed).await.unwrap();
        store.delete("Database", "ns", "app").await.unwrap();

        let kinds: Vec<EventType> = (0..3).map(|_| events.try_recv().unwrap().event).collect();
        assert_eq!(
            kinds,
            vec![EventType::Added, EventType::Modified, EventType::Deleted]
        );
    }

    #[tokio::test]
    async fn test_missing_name_rejected() {
        let store = MemoryStore::new();
        let err = store
            .create("Table", json!({"metadata": {"name": ""}}))
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaHeroError::InvalidSpec { .. }));
    }
}
