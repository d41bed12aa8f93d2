use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dialect::Dialect;

/// A driver-specific schema document under exactly one dialect key.
///
/// The core never interprets the document; it only routes it to the driver
/// for the selected dialect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialectSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cockroachdb: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cassandra: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rqlite: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timescaledb: Option<Value>,
}

impl DialectSchema {
    pub fn for_dialect(dialect: Dialect, document: Value) -> Self {
        let mut schema = Self::default();
        *schema.slot_mut(dialect) = Some(document);
        schema
    }

    fn slot(&self, dialect: Dialect) -> &Option<Value> {
        match dialect {
            Dialect::Postgres => &self.postgres,
            Dialect::Mysql => &self.mysql,
            Dialect::Cockroachdb => &self.cockroachdb,
            Dialect::Cassandra => &self.cassandra,
            Dialect::Sqlite => &self.sqlite,
            Dialect::Rqlite => &self.rqlite,
            Dialect::Timescaledb => &self.timescaledb,
        }
    }

    fn slot_mut(&mut self, dialect: Dialect) -> &mut Option<Value> {
        match dialect {
            Dialect::Postgres => &mut self.postgres,
            Dialect::Mysql => &mut self.mysql,
            Dialect::Cockroachdb => &mut self.cockroachdb,
            Dialect::Cassandra => &mut self.cassandra,
            Dialect::Sqlite => &mut self.sqlite,
            Dialect::Rqlite => &mut self.rqlite,
            Dialect::Timescaledb => &mut self.timescaledb,
        }
    }

    /// The selected dialect and its document. Zero or several branches is an error.
    pub fn variant(&self) -> Result<(Dialect, &Value), String> {
        let set: Vec<(Dialect, &Value)> = Dialect::ALL
            .iter()
            .filter_map(|d| self.slot(*d).as_ref().map(|v| (*d, v)))
            .collect();
        match set.as_slice() {
            [one] => Ok(*one),
            [] => Err("schema has no dialect set".to_string()),
            many => Err(format!(
                "schema has {} dialects set, expected exactly one",
                many.len()
            )),
        }
    }

    pub fn dialect(&self) -> Result<Dialect, String> {
        self.variant().map(|(d, _)| d)
    }
}
