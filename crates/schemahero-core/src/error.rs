use std::path::PathBuf;

/// Central error type for SchemaHero.
#[derive(Debug, thiserror::Error)]
pub enum SchemaHeroError {
    #[error("invalid {kind} {name}: {message}")]
    InvalidSpec {
        kind: String,
        name: String,
        message: String,
    },

    #[error("table {table} uses a {schema} schema but database {database} is {connection}")]
    DialectMismatch {
        table: String,
        database: String,
        schema: String,
        connection: String,
    },

    #[error("unknown dialect: {name}")]
    UnknownDialect { name: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("could not resolve credential: {message}")]
    Resolution { message: String },

    #[error("vault request to {path} failed ({status}): {message}")]
    Vault {
        path: String,
        status: u16,
        message: String,
    },

    #[error("parameter store request failed ({status}): {message}")]
    ParameterStore { status: u16, message: String },

    #[error("no driver plugin found for {driver} (searched {searched})")]
    DriverUnavailable { driver: String, searched: String },

    #[error("driver {driver} crashed: {message}")]
    DriverCrashed { driver: String, message: String },

    #[error("driver {driver} could not connect: {message}")]
    Connection { driver: String, message: String },

    #[error("driver protocol error: {message}")]
    Protocol { message: String },

    #[error("planning failed: {message}")]
    Planning { message: String },

    #[error("statement {index} failed: {message}")]
    Execution { index: usize, message: String },

    #[error("cannot {action} migration {name}: {reason}")]
    InvalidTransition {
        action: String,
        name: String,
        reason: String,
    },

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("conflict writing {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },

    #[error("store error: {0}")]
    Store(String),

    #[error("path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure classes, used by the reconcile loop to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Resolution,
    DriverUnavailable,
    Planning,
    Execution,
    Transient,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// Whether a reconcile that failed with this kind should be requeued.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Resolution | ErrorKind::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Resolution => write!(f, "resolution"),
            ErrorKind::DriverUnavailable => write!(f, "driver_unavailable"),
            ErrorKind::Planning => write!(f, "planning"),
            ErrorKind::Execution => write!(f, "execution"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl SchemaHeroError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchemaHeroError::InvalidSpec { .. }
            | SchemaHeroError::DialectMismatch { .. }
            | SchemaHeroError::UnknownDialect { .. }
            | SchemaHeroError::Config { .. }
            | SchemaHeroError::InvalidTransition { .. }
            | SchemaHeroError::PathNotFound { .. }
            | SchemaHeroError::Serialization(_) => ErrorKind::Configuration,
            SchemaHeroError::Resolution { .. }
            | SchemaHeroError::Vault { .. }
            | SchemaHeroError::ParameterStore { .. } => ErrorKind::Resolution,
            SchemaHeroError::DriverUnavailable { .. } => ErrorKind::DriverUnavailable,
            SchemaHeroError::DriverCrashed { .. }
            | SchemaHeroError::Protocol { .. }
            | SchemaHeroError::Planning { .. } => ErrorKind::Planning,
            SchemaHeroError::Execution { .. } => ErrorKind::Execution,
            SchemaHeroError::Connection { .. }
            | SchemaHeroError::Conflict { .. }
            | SchemaHeroError::AlreadyExists { .. }
            | SchemaHeroError::Store(_)
            | SchemaHeroError::Io(_)
            | SchemaHeroError::Cancelled
            | SchemaHeroError::Timeout { .. } => ErrorKind::Transient,
            SchemaHeroError::NotFound { .. } => ErrorKind::NotFound,
            SchemaHeroError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid_spec(kind: &str, name: &str, message: impl Into<String>) -> Self {
        SchemaHeroError::InvalidSpec {
            kind: kind.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        SchemaHeroError::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        SchemaHeroError::Resolution {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SchemaHeroError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, SchemaHeroError::AlreadyExists { .. })
    }
}

impl From<serde_json::Error> for SchemaHeroError {
    fn from(e: serde_json::Error) -> Self {
        SchemaHeroError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for SchemaHeroError {
    fn from(e: serde_yaml::Error) -> Self {
        SchemaHeroError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(SchemaHeroError::resolution("vault sealed").kind().is_retryable());
        assert!(SchemaHeroError::Store("locked".into()).kind().is_retryable());
        assert!(!SchemaHeroError::invalid_spec("Table", "users", "no schema")
            .kind()
            .is_retryable());
        assert!(!SchemaHeroError::DriverUnavailable {
            driver: "postgres".into(),
            searched: "/nowhere".into(),
        }
        .kind()
        .is_retryable());
    }
}
