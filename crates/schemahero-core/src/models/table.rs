use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, Resource, SCHEMAS_API_VERSION};
use super::object::{ObjectKind, SchemaObject};
use super::schema::DialectSchema;
use crate::error::SchemaHeroError;
use crate::fingerprint::spec_sha;

/// Desired schema of one SQL table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub metadata: ObjectMeta,
    pub spec: TableSpec,
    #[serde(default)]
    pub status: TableStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    #[serde(default)]
    pub database: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    pub schema: DialectSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_data: Option<SeedData>,
}

/// Rows inserted when the table is first created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub rows: Vec<SeedRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRow {
    #[serde(default)]
    pub columns: Vec<SeedColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedColumn {
    pub column: String,
    pub value: SeedValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatus {
    #[serde(
        default,
        rename = "lastPlannedTableSpecSHA",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_planned_table_spec_sha: Option<String>,
    /// Why the current spec cannot be planned. Cleared once it is.
    #[serde(default, rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Table {
    pub fn new(namespace: &str, name: &str, spec: TableSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: TableStatus::default(),
        }
    }

    pub fn has_seed_data(&self) -> bool {
        self.spec
            .seed_data
            .as_ref()
            .map(|s| !s.rows.is_empty())
            .unwrap_or(false)
    }
}

impl Resource for Table {
    const KIND: &'static str = "Table";
    const API_VERSION: &'static str = SCHEMAS_API_VERSION;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl SchemaObject for Table {
    const OBJECT_KIND: ObjectKind = ObjectKind::Table;

    fn database_name(&self) -> &str {
        &self.spec.database
    }

    fn sql_name(&self) -> &str {
        &self.spec.name
    }

    fn schema(&self) -> &DialectSchema {
        &self.spec.schema
    }

    fn spec_sha(&self) -> Result<String, SchemaHeroError> {
        spec_sha(&self.spec)
    }

    fn last_planned_sha(&self) -> Option<&str> {
        self.status.last_planned_table_spec_sha.as_deref()
    }

    fn set_last_planned_sha(&mut self, sha: Option<String>) {
        self.status.last_planned_table_spec_sha = sha;
    }

    fn last_error(&self) -> Option<&str> {
        self.status.last_error.as_deref()
    }

    fn set_last_error(&mut self, error: Option<String>) {
        self.status.last_error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dialect::Dialect;
    use serde_json::json;

    fn users() -> Table {
        Table::new(
            "default",
            "users",
            TableSpec {
                database: "app".into(),
                name: "users".into(),
                schema: DialectSchema::for_dialect(
                    Dialect::Postgres,
                    json!({"primaryKey": ["id"], "columns": [{"name": "id", "type": "integer"}]}),
                ),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_spec_sha_ignores_status_and_metadata() {
        let a = users();
        let mut b = users();
        b.metadata.labels.insert("team".into(), "core".into());
        b.status.last_planned_table_spec_sha = Some("abcdef0".into());
        assert_eq!(a.spec_sha().unwrap(), b.spec_sha().unwrap());

        b.spec.requires.push("accounts".into());
        assert_ne!(a.spec_sha().unwrap(), b.spec_sha().unwrap());
    }

    #[test]
    fn test_status_field_name() {
        let mut t = users();
        t.set_last_planned_sha(Some("1234567".into()));
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["status"]["lastPlannedTableSpecSHA"], "1234567");
        assert!(v["status"].get("lastError").is_none());

        t.set_last_error(Some("dialect mismatch".into()));
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["status"]["lastError"], "dialect mismatch");
    }
}
