use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::Resource;

use crate::{ResourceStore, WatchEvent};

/// Typed access to a [`ResourceStore`].
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn ResourceStore>,
}

fn to_document<R: Resource>(obj: &R) -> Result<Value, SchemaHeroError> {
    let mut doc = serde_json::to_value(obj)?;
    if let Some(map) = doc.as_object_mut() {
        map.insert("apiVersion".into(), json!(R::API_VERSION));
        map.insert("kind".into(), json!(R::KIND));
    }
    Ok(doc)
}

fn from_document<R: Resource>(doc: Value) -> Result<R, SchemaHeroError> {
    Ok(serde_json::from_value(doc)?)
}

impl Client {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.store.watch()
    }

    pub async fn get<R: Resource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<R>, SchemaHeroError> {
        self.store
            .get(R::KIND, namespace, name)
            .await?
            .map(from_document::<R>)
            .transpose()
    }

    /// Like [`Client::get`], with absence as a `NotFound` error.
    pub async fn get_required<R: Resource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<R, SchemaHeroError> {
        self.get(namespace, name)
            .await?
            .ok_or_else(|| SchemaHeroError::not_found(R::KIND, namespace, name))
    }

    /// `None` lists across all namespaces.
    pub async fn list<R: Resource>(&self, namespace: Option<&str>) -> Result<Vec<R>, SchemaHeroError> {
        self.store
            .list(R::KIND, namespace)
            .await?
            .into_iter()
            .map(from_document::<R>)
            .collect()
    }

    pub async fn create<R: Resource>(&self, obj: &R) -> Result<R, SchemaHeroError> {
        from_document(self.store.create(R::KIND, to_document(obj)?).await?)
    }

    pub async fn update<R: Resource>(&self, obj: &R) -> Result<R, SchemaHeroError> {
        from_document(self.store.update(R::KIND, to_document(obj)?).await?)
    }

    /// Create, or replace the existing object's content in place.
    ///
    /// The existing uid is kept and owner references of both are merged.
    pub async fn upsert<R: Resource>(&self, obj: &R) -> Result<R, SchemaHeroError> {
        match self.create(obj).await {
            Ok(created) => Ok(created),
            Err(e) if e.is_already_exists() => {
                let existing: R = self.get_required(obj.namespace(), obj.name()).await?;
                let mut replacement = obj.clone();
                let meta = replacement.metadata_mut();
                meta.resource_version = None;
                for owner in &existing.metadata().owner_references {
                    if !meta.owner_references.iter().any(|o| o.uid == owner.uid) {
                        meta.owner_references.push(owner.clone());
                    }
                }
                tracing::debug!(kind = R::KIND, namespace = %obj.namespace(), name = %obj.name(), "updating existing object in place");
                self.update(&replacement).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete<R: Resource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<bool, SchemaHeroError> {
        self.store.delete(R::KIND, namespace, name).await
    }
}
