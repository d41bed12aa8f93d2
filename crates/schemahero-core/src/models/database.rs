use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::connection::DatabaseConnection;
use super::meta::{ObjectMeta, Resource, DATABASES_API_VERSION};
use crate::duration::parse_duration;
use crate::error::SchemaHeroError;

/// A live database SchemaHero manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub metadata: ObjectMeta,
    pub spec: DatabaseSpec,
    #[serde(default)]
    pub status: DatabaseStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    pub connection: DatabaseConnection,
    #[serde(default)]
    pub immediate_deploy: bool,
    #[serde(default)]
    pub deploy_seed_data: bool,
    /// Coalescing window for table plans, e.g. `2s`. Absent or zero disables batching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemahero: Option<WorkerOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplate>,
    #[serde(default)]
    pub enable_shell_command: bool,
}

/// Overrides for the per-database worker workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodTemplate {
    #[serde(default)]
    pub metadata: TemplateMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMeta {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ping: Option<String>,
}

impl Database {
    pub fn new(namespace: &str, name: &str, connection: DatabaseConnection) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: DatabaseSpec {
                connection,
                ..Default::default()
            },
            status: DatabaseStatus::default(),
        }
    }

    /// The configured batch window, `None` when batching is disabled.
    pub fn batch_window(&self) -> Result<Option<Duration>, SchemaHeroError> {
        let Some(raw) = self.spec.batch_window.as_deref() else {
            return Ok(None);
        };
        let window = parse_duration(raw)
            .map_err(|e| SchemaHeroError::invalid_spec(Self::KIND, &self.metadata.name, e))?;
        Ok(if window.is_zero() { None } else { Some(window) })
    }

    /// Whether any credential of this database is rendered by an injected vault agent.
    pub fn uses_vault_agent(&self) -> bool {
        self.spec
            .connection
            .variant()
            .map(|v| {
                v.values()
                    .iter()
                    .any(|value| value.vault().map(|vault| vault.agent_inject).unwrap_or(false))
            })
            .unwrap_or(false)
    }
}

impl Resource for Database {
    const KIND: &'static str = "Database";
    const API_VERSION: &'static str = DATABASES_API_VERSION;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
