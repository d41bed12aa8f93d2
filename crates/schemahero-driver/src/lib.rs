pub mod host;
pub mod protocol;
pub mod remote;
pub mod serve;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::table::SeedData;
use schemahero_core::models::{Dialect, ObjectKind};

pub use host::PluginHost;
pub use remote::RpcDriver;
pub use serve::{serve, serve_stdio};
pub use transport::RpcClient;

/// Sentinel URI scheme for offline fixture generation. Drivers must not dial it.
pub const FIXTURE_ONLY_SCHEME: &str = "fixture-only://";

pub fn fixture_uri(dialect: Dialect) -> String {
    format!("{FIXTURE_ONLY_SCHEME}{dialect}")
}

/// Live and default character set settings of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSets {
    pub current_charset: String,
    pub current_collation: String,
    pub default_charset: String,
    pub default_collation: String,
    #[serde(default)]
    pub collations: Vec<Collation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collation {
    pub collation: String,
    pub charset: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Opens connections for one or more dialects.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    async fn connect(
        &self,
        dialect: Dialect,
        uri: &str,
        options: &Value,
    ) -> Result<Box<dyn DriverConnection>, SchemaHeroError>;
}

/// An open connection to one live database.
#[async_trait]
pub trait DriverConnection: Send + Sync {
    /// DDL that converges the live table toward `schema`. Seed rows are planned
    /// only when `seed_data` is given.
    async fn plan_table_schema(
        &self,
        name: &str,
        schema: &Value,
        seed_data: Option<&SeedData>,
    ) -> Result<Vec<String>, SchemaHeroError>;

    async fn plan_view_schema(&self, name: &str, schema: &Value) -> Result<Vec<String>, SchemaHeroError>;

    async fn plan_function_schema(&self, name: &str, schema: &Value) -> Result<Vec<String>, SchemaHeroError>;

    async fn plan_extension_schema(&self, name: &str, schema: &Value) -> Result<Vec<String>, SchemaHeroError>;

    /// Offline CREATE statements for a table spec.
    async fn generate_fixtures(&self, name: &str, spec: &Value) -> Result<Vec<String>, SchemaHeroError>;

    /// Issue each statement as its own DDL call, stopping at the first failure.
    async fn deploy_statements(&self, statements: &[String]) -> Result<(), SchemaHeroError>;

    async fn describe_character_sets(&self, database: &str) -> Result<CharacterSets, SchemaHeroError>;

    async fn close(&self) -> Result<(), SchemaHeroError>;
}

/// Route a non-table schema object to its planning call.
pub async fn plan_object(
    conn: &dyn DriverConnection,
    kind: ObjectKind,
    name: &str,
    schema: &Value,
) -> Result<Vec<String>, SchemaHeroError> {
    match kind {
        ObjectKind::Table => conn.plan_table_schema(name, schema, None).await,
        ObjectKind::View => conn.plan_view_schema(name, schema).await,
        ObjectKind::Function => conn.plan_function_schema(name, schema).await,
        ObjectKind::Extension => conn.plan_extension_schema(name, schema).await,
    }
}
