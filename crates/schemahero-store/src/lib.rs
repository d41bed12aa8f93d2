pub mod backend;
pub mod client;
pub mod memory;
pub mod migration;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use schemahero_core::error::SchemaHeroError;

pub use backend::Store;
pub use client::Client;
pub use memory::{MemoryBackend, MemoryStore};
pub use sqlite::{SqliteBackend, SqliteStore};

/// Identity of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// Published on every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub event: EventType,
}

/// Document store holding every declarative resource and the engine's output.
///
/// Documents are JSON objects carrying a `metadata` block. The store owns
/// `metadata.uid`, `metadata.resourceVersion` and `metadata.creationTimestamp`.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, SchemaHeroError>;

    /// All documents of `kind`, in one namespace or across all of them, ordered by key.
    async fn list(&self, kind: &str, namespace: Option<&str>)
        -> Result<Vec<Value>, SchemaHeroError>;

    /// Fails with `AlreadyExists` when the key is taken.
    async fn create(&self, kind: &str, doc: Value) -> Result<Value, SchemaHeroError>;

    /// Fails with `NotFound` when absent and `Conflict` on a stale `resourceVersion`.
    async fn update(&self, kind: &str, doc: Value) -> Result<Value, SchemaHeroError>;

    /// Deletes the document and garbage-collects dependents left without owners.
    /// Returns whether the document existed.
    async fn delete(&self, kind: &str, namespace: &str, name: &str)
        -> Result<bool, SchemaHeroError>;

    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}
