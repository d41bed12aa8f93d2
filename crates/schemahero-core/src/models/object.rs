use super::meta::Resource;
use super::schema::DialectSchema;
use crate::error::SchemaHeroError;

/// Which driver planning call a schema object goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    View,
    Function,
    Extension,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Table => write!(f, "table"),
            ObjectKind::View => write!(f, "view"),
            ObjectKind::Function => write!(f, "function"),
            ObjectKind::Extension => write!(f, "extension"),
        }
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(ObjectKind::Table),
            "view" => Ok(ObjectKind::View),
            "function" => Ok(ObjectKind::Function),
            "extension" | "databaseextension" => Ok(ObjectKind::Extension),
            _ => Err(format!("unknown spec type: {s}")),
        }
    }
}

/// A declarative resource whose spec is planned into DDL against one database.
pub trait SchemaObject: Resource {
    const OBJECT_KIND: ObjectKind;

    /// Name of the `Database` resource this object targets.
    fn database_name(&self) -> &str;

    /// Name of the object inside the live database.
    fn sql_name(&self) -> &str;

    fn schema(&self) -> &DialectSchema;

    /// Fingerprint of the spec, used as the migration name.
    fn spec_sha(&self) -> Result<String, SchemaHeroError>;

    fn last_planned_sha(&self) -> Option<&str>;

    fn set_last_planned_sha(&mut self, sha: Option<String>);

    /// Diagnostic left by the last planning attempt that failed for good.
    fn last_error(&self) -> Option<&str>;

    fn set_last_error(&mut self, error: Option<String>);
}
