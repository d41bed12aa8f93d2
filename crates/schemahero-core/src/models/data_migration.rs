use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::meta::{ObjectMeta, Resource, SCHEMAS_API_VERSION};

/// Data changes declared alongside schemas. Stored and listed only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMigration {
    pub metadata: ObjectMeta,
    pub spec: DataMigrationSpec,
    #[serde(default)]
    pub status: DataMigrationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataMigrationSpec {
    pub database: String,
    #[serde(default)]
    pub migrations: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMigrationStatus {
    #[serde(default)]
    pub planned_at: i64,
    #[serde(default)]
    pub executed_at: i64,
}

impl Resource for DataMigration {
    const KIND: &'static str = "DataMigration";
    const API_VERSION: &'static str = SCHEMAS_API_VERSION;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
