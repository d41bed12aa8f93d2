//! Newline-delimited JSON-RPC 2.0 spoken between the host and a driver plugin.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::table::SeedData;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PLANNING_ERROR: i64 = -32001;
pub const EXECUTION_ERROR: i64 = -32002;
pub const CONFIGURATION_ERROR: i64 = -32003;
pub const CONNECTION_ERROR: i64 = -32004;
pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

pub mod method {
    pub const CONNECT: &str = "connect";
    pub const PLAN_TABLE_SCHEMA: &str = "planTableSchema";
    pub const PLAN_VIEW_SCHEMA: &str = "planViewSchema";
    pub const PLAN_FUNCTION_SCHEMA: &str = "planFunctionSchema";
    pub const PLAN_EXTENSION_SCHEMA: &str = "planExtensionSchema";
    pub const GENERATE_FIXTURES: &str = "generateFixtures";
    pub const DEPLOY_STATEMENTS: &str = "deployStatements";
    pub const DESCRIBE_CHARACTER_SETS: &str = "describeCharacterSets";
    pub const CLOSE: &str = "close";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<u64>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Encode a driver-side failure for the wire.
    pub fn from_error(error: &SchemaHeroError) -> Self {
        match error {
            SchemaHeroError::Planning { message } => Self::new(PLANNING_ERROR, message.clone()),
            SchemaHeroError::Execution { index, message } => Self {
                code: EXECUTION_ERROR,
                message: message.clone(),
                data: Some(json!({ "index": index })),
            },
            SchemaHeroError::Connection { message, .. } => {
                Self::new(CONNECTION_ERROR, message.clone())
            }
            other => match other.kind() {
                schemahero_core::error::ErrorKind::Configuration => {
                    Self::new(CONFIGURATION_ERROR, other.to_string())
                }
                _ => Self::new(INTERNAL_ERROR, other.to_string()),
            },
        }
    }

    /// Decode a wire error returned by the named driver.
    pub fn into_error(self, driver: &str) -> SchemaHeroError {
        match self.code {
            PLANNING_ERROR => SchemaHeroError::Planning {
                message: self.message,
            },
            EXECUTION_ERROR => SchemaHeroError::Execution {
                index: self
                    .data
                    .as_ref()
                    .and_then(|d| d.get("index"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as usize,
                message: self.message,
            },
            CONFIGURATION_ERROR => SchemaHeroError::Config {
                message: self.message,
            },
            CONNECTION_ERROR => SchemaHeroError::Connection {
                driver: driver.to_string(),
                message: self.message,
            },
            code => SchemaHeroError::Protocol {
                message: format!("{driver} returned error {code}: {}", self.message),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    pub uri: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResult {
    pub connection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTableParams {
    pub connection: String,
    pub name: String,
    pub schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_data: Option<SeedData>,
}

/// Params of the view, function and extension planning calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanObjectParams {
    pub connection: String,
    pub name: String,
    pub schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturesParams {
    pub connection: String,
    pub name: String,
    pub spec: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployParams {
    pub connection: String,
    pub statements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSetParams {
    pub connection: String,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseParams {
    pub connection: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanResult {
    pub statements: Vec<String>,
}
