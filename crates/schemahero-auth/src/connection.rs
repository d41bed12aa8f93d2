use serde_json::{json, Value};
use url::form_urlencoded::byte_serialize;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::connection::{
    CassandraConnection, MysqlConnection, PostgresConnection, RqliteConnection,
};
use schemahero_core::models::{ConnectionVariant, Database, Dialect, Resource, ValueOrValueFrom};

use crate::resolver::{Resolve, Scope};

/// What a driver needs to connect.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledConnection {
    pub dialect: Dialect,
    pub uri: String,
    /// Structured options for drivers that do not take a URI.
    pub options: Value,
}

fn encode(s: &str) -> String {
    byte_serialize(s.as_bytes()).collect()
}

fn config_error(database: &Database, message: impl Into<String>) -> SchemaHeroError {
    SchemaHeroError::invalid_spec(Database::KIND, database.name(), message)
}

struct Values<'a> {
    resolver: &'a dyn Resolve,
    scope: Scope<'a>,
}

impl Values<'_> {
    async fn get(&self, value: &ValueOrValueFrom) -> Result<String, SchemaHeroError> {
        self.resolver.resolve(value, self.scope).await
    }

    async fn or(&self, value: &ValueOrValueFrom, default: &str) -> Result<String, SchemaHeroError> {
        let v = self.get(value).await?;
        Ok(if v.is_empty() { default.to_string() } else { v })
    }
}

/// Resolve a database's connection into a dialect and URI.
pub async fn assemble(
    resolver: &dyn Resolve,
    database: &Database,
) -> Result<AssembledConnection, SchemaHeroError> {
    let variant = database
        .spec
        .connection
        .variant()
        .map_err(|e| config_error(database, e))?;
    let dialect = variant.dialect();
    let values = Values {
        resolver,
        scope: Scope::new(database.namespace(), database.name()),
    };

    let (uri, options) = match variant {
        ConnectionVariant::Postgres(p)
        | ConnectionVariant::Cockroachdb(p)
        | ConnectionVariant::Timescaledb(p) => {
            (postgres_uri(&values, p, dialect).await?, Value::Null)
        }
        ConnectionVariant::Mysql(m) => (mysql_uri(&values, m).await?, Value::Null),
        ConnectionVariant::Rqlite(r) => (rqlite_uri(&values, r).await?, Value::Null),
        ConnectionVariant::Cassandra(c) => cassandra_options(&values, c).await?,
        ConnectionVariant::Sqlite(s) => (values.get(&s.uri).await?, Value::Null),
    };

    if uri.is_empty() {
        return Err(config_error(database, "connection has neither a uri nor a host"));
    }
    Ok(AssembledConnection {
        dialect,
        uri,
        options,
    })
}

async fn postgres_uri(
    values: &Values<'_>,
    p: &PostgresConnection,
    dialect: Dialect,
) -> Result<String, SchemaHeroError> {
    let uri = values.get(&p.uri).await?;
    if !uri.is_empty() {
        return Ok(uri);
    }
    let host = values.get(&p.host).await?;
    if host.is_empty() {
        return Ok(String::new());
    }
    let default_port = if dialect == Dialect::Cockroachdb { "26257" } else { "5432" };
    let port = values.or(&p.port, default_port).await?;
    let user = values.get(&p.user).await?;
    let password = values.get(&p.password).await?;
    let dbname = values.get(&p.dbname).await?;

    let userinfo = match (user.is_empty(), password.is_empty()) {
        (true, _) => String::new(),
        (false, true) => format!("{}@", encode(&user)),
        (false, false) => format!("{}:{}@", encode(&user), encode(&password)),
    };
    let mut uri = format!("postgres://{userinfo}{host}:{port}/{dbname}");

    let mut params = Vec::new();
    if let Some(sslmode) = p.sslmode.as_deref().filter(|s| !s.is_empty()) {
        params.push(format!("sslmode={}", encode(sslmode)));
    }
    if let Some(schema) = p.schema.as_deref().filter(|s| !s.is_empty()) {
        let key = if dialect == Dialect::Timescaledb {
            "currentSchema"
        } else {
            "search_path"
        };
        params.push(format!("{key}={}", encode(schema)));
    }
    if !params.is_empty() {
        uri.push('?');
        uri.push_str(&params.join("&"));
    }
    Ok(uri)
}

async fn mysql_uri(values: &Values<'_>, m: &MysqlConnection) -> Result<String, SchemaHeroError> {
    let uri = values.get(&m.uri).await?;
    if !uri.is_empty() {
        return Ok(uri);
    }
    let host = values.get(&m.host).await?;
    if host.is_empty() {
        return Ok(String::new());
    }
    let port = values.or(&m.port, "3306").await?;
    let user = values.get(&m.user).await?;
    let password = values.get(&m.password).await?;
    let dbname = values.get(&m.dbname).await?;

    let mut uri = format!("{user}:{password}@tcp({host}:{port})/{dbname}");
    if m.disable_tls {
        uri.push_str("?tls=false");
    }
    Ok(uri)
}

async fn rqlite_uri(values: &Values<'_>, r: &RqliteConnection) -> Result<String, SchemaHeroError> {
    let uri = values.get(&r.uri).await?;
    if !uri.is_empty() {
        return Ok(uri);
    }
    let host = values.get(&r.host).await?;
    if host.is_empty() {
        return Ok(String::new());
    }
    let port = values.or(&r.port, "4001").await?;
    let user = values.get(&r.user).await?;
    let password = values.get(&r.password).await?;
    let scheme = if r.disable_tls { "http" } else { "https" };

    let userinfo = if user.is_empty() {
        String::new()
    } else {
        format!("{user}:{password}@")
    };
    Ok(format!("{scheme}://{userinfo}{host}:{port}/"))
}

async fn cassandra_options(
    values: &Values<'_>,
    c: &CassandraConnection,
) -> Result<(String, Value), SchemaHeroError> {
    if c.hosts.is_empty() {
        return Ok((String::new(), Value::Null));
    }
    let username = values.get(&c.username).await?;
    let password = values.get(&c.password).await?;
    let uri = format!("cassandra://{}/{}", c.hosts.join(","), c.keyspace);
    let options = json!({
        "hosts": c.hosts,
        "keyspace": c.keyspace,
        "username": username,
        "password": password,
    });
    Ok((uri, options))
}
