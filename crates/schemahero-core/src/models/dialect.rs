use serde::{Deserialize, Serialize};

/// A supported database family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Mysql,
    Cockroachdb,
    Cassandra,
    Sqlite,
    Rqlite,
    Timescaledb,
}

impl Dialect {
    pub const ALL: [Dialect; 7] = [
        Dialect::Postgres,
        Dialect::Mysql,
        Dialect::Cockroachdb,
        Dialect::Cassandra,
        Dialect::Sqlite,
        Dialect::Rqlite,
        Dialect::Timescaledb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Cockroachdb => "cockroachdb",
            Dialect::Cassandra => "cassandra",
            Dialect::Sqlite => "sqlite",
            Dialect::Rqlite => "rqlite",
            Dialect::Timescaledb => "timescaledb",
        }
    }

    /// Name of the plugin executable that implements this dialect.
    pub fn plugin_binary(&self) -> String {
        format!("schemahero-{}", self.as_str())
    }

    /// Whether the dialect carries database-wide character set and collation.
    pub fn supports_character_sets(&self) -> bool {
        matches!(self, Dialect::Mysql)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::Mysql),
            "cockroachdb" | "cockroach" => Ok(Dialect::Cockroachdb),
            "cassandra" => Ok(Dialect::Cassandra),
            "sqlite" => Ok(Dialect::Sqlite),
            "rqlite" => Ok(Dialect::Rqlite),
            "timescaledb" | "timescale" => Ok(Dialect::Timescaledb),
            _ => Err(format!("unknown dialect: {s}")),
        }
    }
}
