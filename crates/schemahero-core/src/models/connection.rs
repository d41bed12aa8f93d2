use serde::{Deserialize, Serialize};

use super::dialect::Dialect;
use super::value::ValueOrValueFrom;

/// Parameters shared by postgres, cockroachdb and timescaledb.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConnection {
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub uri: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub host: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub port: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub user: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub password: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub dbname: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sslmode: Option<String>,
    #[serde(default, alias = "currentSchema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MysqlConnection {
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub uri: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub host: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub port: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub user: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub password: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub dbname: ValueOrValueFrom,
    #[serde(default, rename = "disableTLS", alias = "disableTls")]
    pub disable_tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CassandraConnection {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub username: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub password: ValueOrValueFrom,
    #[serde(default)]
    pub keyspace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteConnection {
    #[serde(default, alias = "dsn", skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub uri: ValueOrValueFrom,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RqliteConnection {
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub uri: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub host: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub port: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub user: ValueOrValueFrom,
    #[serde(default, skip_serializing_if = "ValueOrValueFrom::is_empty")]
    pub password: ValueOrValueFrom,
    #[serde(default, rename = "disableTLS", alias = "disableTls")]
    pub disable_tls: bool,
}

/// Exactly one dialect branch must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<MysqlConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cockroachdb: Option<PostgresConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cassandra: Option<CassandraConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rqlite: Option<RqliteConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timescaledb: Option<PostgresConnection>,
}

/// The selected branch of a [`DatabaseConnection`].
#[derive(Debug, Clone, Copy)]
pub enum ConnectionVariant<'a> {
    Postgres(&'a PostgresConnection),
    Mysql(&'a MysqlConnection),
    Cockroachdb(&'a PostgresConnection),
    Cassandra(&'a CassandraConnection),
    Sqlite(&'a SqliteConnection),
    Rqlite(&'a RqliteConnection),
    Timescaledb(&'a PostgresConnection),
}

impl ConnectionVariant<'_> {
    pub fn dialect(&self) -> Dialect {
        match self {
            ConnectionVariant::Postgres(_) => Dialect::Postgres,
            ConnectionVariant::Mysql(_) => Dialect::Mysql,
            ConnectionVariant::Cockroachdb(_) => Dialect::Cockroachdb,
            ConnectionVariant::Cassandra(_) => Dialect::Cassandra,
            ConnectionVariant::Sqlite(_) => Dialect::Sqlite,
            ConnectionVariant::Rqlite(_) => Dialect::Rqlite,
            ConnectionVariant::Timescaledb(_) => Dialect::Timescaledb,
        }
    }

    /// Every value-or-reference field of the branch.
    pub fn values(&self) -> Vec<&ValueOrValueFrom> {
        match self {
            ConnectionVariant::Postgres(p)
            | ConnectionVariant::Cockroachdb(p)
            | ConnectionVariant::Timescaledb(p) => {
                vec![&p.uri, &p.host, &p.port, &p.user, &p.password, &p.dbname]
            }
            ConnectionVariant::Mysql(m) => {
                vec![&m.uri, &m.host, &m.port, &m.user, &m.password, &m.dbname]
            }
            ConnectionVariant::Cassandra(c) => vec![&c.username, &c.password],
            ConnectionVariant::Sqlite(s) => vec![&s.uri],
            ConnectionVariant::Rqlite(r) => vec![&r.uri, &r.host, &r.port, &r.user, &r.password],
        }
    }
}

impl DatabaseConnection {
    pub fn variant(&self) -> Result<ConnectionVariant<'_>, String> {
        let mut set = Vec::new();
        if let Some(c) = &self.postgres {
            set.push(ConnectionVariant::Postgres(c));
        }
        if let Some(c) = &self.mysql {
            set.push(ConnectionVariant::Mysql(c));
        }
        if let Some(c) = &self.cockroachdb {
            set.push(ConnectionVariant::Cockroachdb(c));
        }
        if let Some(c) = &self.cassandra {
            set.push(ConnectionVariant::Cassandra(c));
        }
        if let Some(c) = &self.sqlite {
            set.push(ConnectionVariant::Sqlite(c));
        }
        if let Some(c) = &self.rqlite {
            set.push(ConnectionVariant::Rqlite(c));
        }
        if let Some(c) = &self.timescaledb {
            set.push(ConnectionVariant::Timescaledb(c));
        }
        match set.len() {
            1 => Ok(set[0]),
            0 => Err("connection has no dialect set".to_string()),
            n => Err(format!("connection has {n} dialects set, expected exactly one")),
        }
    }

    pub fn dialect(&self) -> Result<Dialect, String> {
        self.variant().map(|v| v.dialect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_requires_exactly_one() {
        let empty = DatabaseConnection::default();
        assert!(empty.variant().is_err());

        let mut conn = DatabaseConnection {
            postgres: Some(PostgresConnection::default()),
            ..Default::default()
        };
        assert_eq!(conn.dialect().unwrap(), Dialect::Postgres);

        conn.mysql = Some(MysqlConnection::default());
        assert!(conn.dialect().is_err());
    }

    #[test]
    fn test_current_schema_alias() {
        let yaml = r#"
postgres:
  host:
    value: h
  currentSchema: public
"#;
        let conn: DatabaseConnection = serde_yaml::from_str(yaml).unwrap();
        let pg = conn.postgres.unwrap();
        assert_eq!(pg.schema.as_deref(), Some("public"));
        assert_eq!(pg.host.value.as_deref(), Some("h"));
    }
}
