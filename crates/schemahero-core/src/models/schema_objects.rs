use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, Resource, SCHEMAS_API_VERSION};
use super::object::{ObjectKind, SchemaObject};
use super::schema::DialectSchema;
use crate::error::SchemaHeroError;
use crate::fingerprint::spec_sha;

/// Spec shared by views, functions and database extensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSpec {
    #[serde(default)]
    pub database: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    pub schema: DialectSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStatus {
    #[serde(
        default,
        rename = "lastPlannedSpecSHA",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_planned_spec_sha: Option<String>,
    #[serde(default, rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub metadata: ObjectMeta,
    pub spec: ObjectSpec,
    #[serde(default)]
    pub status: ObjectStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub metadata: ObjectMeta,
    pub spec: ObjectSpec,
    #[serde(default)]
    pub status: ObjectStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseExtension {
    pub metadata: ObjectMeta,
    pub spec: ObjectSpec,
    #[serde(default)]
    pub status: ObjectStatus,
}

// The three kinds differ only in their kind name and planning call.
macro_rules! impl_schema_object {
    ($ty:ident, $kind:literal, $object_kind:expr) => {
        impl $ty {
            pub fn new(namespace: &str, name: &str, spec: ObjectSpec) -> Self {
                Self {
                    metadata: ObjectMeta::new(namespace, name),
                    spec,
                    status: ObjectStatus::default(),
                }
            }
        }

        impl Resource for $ty {
            const KIND: &'static str = $kind;
            const API_VERSION: &'static str = SCHEMAS_API_VERSION;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }

        impl SchemaObject for $ty {
            const OBJECT_KIND: ObjectKind = $object_kind;

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
                self.status.last_planned_spec_sha.as_deref()
            }

            fn set_last_planned_sha(&mut self, sha: Option<String>) {
                self.status.last_planned_spec_sha = sha;
            }

            fn last_error(&self) -> Option<&str> {
                self.status.last_error.as_deref()
            }

            fn set_last_error(&mut self, error: Option<String>) {
                self.status.last_error = error;
            }
        }
    };
}

impl_schema_object!(View, "View", ObjectKind::View);
impl_schema_object!(Function, "Function", ObjectKind::Function);
impl_schema_object!(DatabaseExtension, "DatabaseExtension", ObjectKind::Extension);
