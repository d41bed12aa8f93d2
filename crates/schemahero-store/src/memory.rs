use std::collections::BTreeMap;

use serde_json::Value;

use schemahero_core::error::SchemaHeroError;

use crate::backend::{Backend, Store};
use crate::ResourceKey;

/// In-memory store, used by tests and the per-process manager.
pub type MemoryStore = Store<MemoryBackend>;

impl MemoryStore {
    pub fn new() -> Self {
        Store::with_backend(MemoryBackend::default())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    documents: BTreeMap<ResourceKey, (String, Vec<String>, Value)>,
    resource_version: u64,
}

impl Backend for MemoryBackend {
    fn get(&self, key: &ResourceKey) -> Result<Option<Value>, SchemaHeroError> {
        Ok(self.documents.get(key).map(|(_, _, doc)| doc.clone()))
    }

    fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Value>, SchemaHeroError> {
        Ok(self
            .documents
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter(|(key, _)| namespace.map(|ns| key.namespace == ns).unwrap_or(true))
            .map(|(_, (_, _, doc))| doc.clone())
            .collect())
    }

    fn put(
        &mut self,
        key: &ResourceKey,
        uid: &str,
        _resource_version: u64,
        doc: &Value,
        owner_uids: &[String],
    ) -> Result<(), SchemaHeroError> {
        self.documents.insert(
            key.clone(),
            (uid.to_string(), owner_uids.to_vec(), doc.clone()),
        );
        Ok(())
    }

    fn remove(&mut self, key: &ResourceKey) -> Result<Option<String>, SchemaHeroError> {
        Ok(self.documents.remove(key).map(|(uid, _, _)| uid))
    }

    fn dependents(
        &self,
        owner_uid: &str,
    ) -> Result<Vec<(ResourceKey, Vec<String>)>, SchemaHeroError> {
        Ok(self
            .documents
            .iter()
            .filter(|(_, (_, owners, _))| owners.iter().any(|o| o == owner_uid))
            .map(|(key, (_, owners, _))| (key.clone(), owners.clone()))
            .collect())
    }

    fn forget_owner(&mut self, _owner_uid: &str) -> Result<(), SchemaHeroError> {
        Ok(())
    }

    fn uid_exists(&self, uid: &str) -> Result<bool, SchemaHeroError> {
        Ok(self.documents.values().any(|(u, _, _)| u == uid))
    }

    fn next_resource_version(&mut self) -> Result<u64, SchemaHeroError> {
        self.resource_version += 1;
        Ok(self.resource_version)
    }
}
