//! Orchestrator objects backing a per-database worker.
//!
//! They are stored alongside the declarative resources and owned by their
//! `Database`, so deleting the database garbage-collects all of them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::database::Toleration;
use schemahero_core::models::{Database, ObjectMeta, Resource};
use schemahero_store::Client;

const APPS_API_VERSION: &str = "apps/v1";
const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";
const CORE_API_VERSION: &str = "v1";

/// Single-replica stateful workload running `schemahero manager` for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub replicas: u32,
    pub service_account_name: String,
    pub image: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub pod_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub resource_names: Vec<String>,
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub metadata: ObjectMeta,
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub metadata: ObjectMeta,
    pub role_name: String,
    pub service_account_name: String,
}

macro_rules! impl_resource {
    ($ty:ty, $kind:literal, $api:expr) => {
        impl Resource for $ty {
            const KIND: &'static str = $kind;
            const API_VERSION: &'static str = $api;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

impl_resource!(Workload, "StatefulSet", APPS_API_VERSION);
impl_resource!(ServiceAccount, "ServiceAccount", CORE_API_VERSION);
impl_resource!(Role, "Role", RBAC_API_VERSION);
impl_resource!(RoleBinding, "RoleBinding", RBAC_API_VERSION);

pub fn workload_name(database: &str) -> String {
    format!("{database}-controller")
}

pub fn service_account_name(database: &str) -> String {
    format!("schemahero-{database}")
}

/// Everything the orchestrator should run for one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredWorker {
    pub workload: Workload,
    pub service_account: ServiceAccount,
    pub role: Role,
    pub role_binding: RoleBinding,
}

impl DesiredWorker {
    pub fn for_database(
        database: &Database,
        default_image: &str,
        pod_annotations: BTreeMap<String, String>,
    ) -> Self {
        let ns = database.namespace();
        let name = database.name();
        let sa = service_account_name(name);
        let owned = |object_name: &str| {
            let mut meta = ObjectMeta::new(ns, object_name);
            meta.owner_references.extend(database.owner_reference());
            meta
        };

        let mut pod_labels = BTreeMap::new();
        if let Some(template) = &database.spec.template {
            pod_labels.extend(template.metadata.labels.clone());
        }
        pod_labels.insert("control-plane".to_string(), "schemahero".to_string());
        pod_labels.insert("database".to_string(), name.to_string());

        let overrides = database.spec.schemahero.clone().unwrap_or_default();
        let image = overrides
            .image
            .clone()
            .unwrap_or_else(|| default_image.to_string());

        let workload = Workload {
            metadata: owned(&workload_name(name)),
            spec: WorkloadSpec {
                replicas: 1,
                service_account_name: sa.clone(),
                image,
                args: vec![
                    "manager".to_string(),
                    "--namespace".to_string(),
                    ns.to_string(),
                    "--database-name".to_string(),
                    name.to_string(),
                ],
                pod_labels,
                pod_annotations,
                node_selector: overrides.node_selector,
                tolerations: overrides.tolerations,
            },
        };

        let role = Role {
            metadata: owned(&sa),
            rules: vec![PolicyRule {
                api_groups: vec!["databases.schemahero.io".to_string()],
                resources: vec!["databases".to_string()],
                resource_names: vec![name.to_string()],
                verbs: ["get", "list", "watch", "update"]
                    .iter()
                    .map(|v| v.to_string())
                    .collect(),
            }],
        };

        Self {
            workload,
            service_account: ServiceAccount { metadata: owned(&sa) },
            role_binding: RoleBinding {
                metadata: owned(&sa),
                role_name: sa.clone(),
                service_account_name: sa,
            },
            role,
        }
    }
}

/// Where per-database workers are materialised.
#[async_trait]
pub trait WorkloadHost: Send + Sync {
    /// Create or update every object of `desired`. Returns whether anything changed.
    async fn apply(&self, desired: &DesiredWorker) -> Result<bool, SchemaHeroError>;
}

/// Keeps worker objects in the resource store.
pub struct StoreWorkloadHost {
    client: Client,
}

impl StoreWorkloadHost {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply_one<R>(&self, desired: &R, same: impl Fn(&R, &R) -> bool) -> Result<bool, SchemaHeroError>
    where
        R: Resource,
    {
        if let Some(existing) = self.client.get::<R>(desired.namespace(), desired.name()).await? {
            if same(&existing, desired) {
                return Ok(false);
            }
        }
        self.client.upsert(desired).await?;
        Ok(true)
    }
}

#[async_trait]
impl WorkloadHost for StoreWorkloadHost {
    async fn apply(&self, desired: &DesiredWorker) -> Result<bool, SchemaHeroError> {
        let mut changed = self
            .apply_one(&desired.service_account, |a, b| {
                a.metadata.owner_references == b.metadata.owner_references
            })
            .await?;
        changed |= self
            .apply_one(&desired.role, |a, b| a.rules == b.rules)
            .await?;
        changed |= self
            .apply_one(&desired.role_binding, |a, b| {
                a.role_name == b.role_name && a.service_account_name == b.service_account_name
            })
            .await?;
        changed |= self
            .apply_one(&desired.workload, |a, b| a.spec == b.spec)
            .await?;
        Ok(changed)
    }
}
