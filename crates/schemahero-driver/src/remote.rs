use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::table::SeedData;
use schemahero_core::models::Dialect;

use crate::host::Lease;
use crate::protocol::{
    method, CharacterSetParams, CloseParams, ConnectParams, ConnectResult, DeployParams,
    FixturesParams, PlanObjectParams, PlanResult, PlanTableParams,
};
use crate::transport::RpcClient;
use crate::{CharacterSets, DatabaseDriver, DriverConnection};

/// A driver reached over an already established RPC channel.
pub struct RpcDriver {
    rpc: Arc<RpcClient>,
}

impl RpcDriver {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl DatabaseDriver for RpcDriver {
    async fn connect(
        &self,
        _dialect: Dialect,
        uri: &str,
        options: &Value,
    ) -> Result<Box<dyn DriverConnection>, SchemaHeroError> {
        let conn = open(self.rpc.clone(), uri, options, None).await?;
        Ok(Box::new(conn))
    }
}

/// A connection held open inside a plugin process.
pub struct RemoteConnection {
    rpc: Arc<RpcClient>,
    id: String,
    // Keeps the plugin process alive until the connection is dropped.
    _lease: Option<Lease>,
}

pub(crate) async fn open(
    rpc: Arc<RpcClient>,
    uri: &str,
    options: &Value,
    lease: Option<Lease>,
) -> Result<RemoteConnection, SchemaHeroError> {
    let params = ConnectParams {
        uri: uri.to_string(),
        options: options.clone(),
    };
    let result: ConnectResult = call(&rpc, method::CONNECT, &params).await?;
    tracing::debug!(driver = rpc.driver(), connection = %result.connection, "driver connection opened");
    Ok(RemoteConnection {
        rpc,
        id: result.connection,
        _lease: lease,
    })
}

async fn call<P: Serialize, T: DeserializeOwned>(
    rpc: &RpcClient,
    method: &str,
    params: &P,
) -> Result<T, SchemaHeroError> {
    let value = rpc.call(method, serde_json::to_value(params)?).await?;
    serde_json::from_value(value).map_err(|e| SchemaHeroError::Protocol {
        message: format!("{} {method} result: {e}", rpc.driver()),
    })
}

impl RemoteConnection {
    async fn plan<P: Serialize>(&self, method: &str, params: &P) -> Result<Vec<String>, SchemaHeroError> {
        let result: PlanResult = call(&self.rpc, method, params).await?;
        Ok(result.statements)
    }

    fn object_params(&self, name: &str, schema: &Value) -> PlanObjectParams {
        PlanObjectParams {
            connection: self.id.clone(),
            name: name.to_string(),
            schema: schema.clone(),
        }
    }
}

#[async_trait]
impl DriverConnection for RemoteConnection {
    async fn plan_table_schema(
        &self,
        name: &str,
        schema: &Value,
        seed_data: Option<&SeedData>,
    ) -> Result<Vec<String>, SchemaHeroError> {
        let params = PlanTableParams {
            connection: self.id.clone(),
            name: name.to_string(),
            schema: schema.clone(),
            seed_data: seed_data.cloned(),
        };
        self.plan(method::PLAN_TABLE_SCHEMA, &params).await
    }

    async fn plan_view_schema(&self, name: &str, schema: &Value) -> Result<Vec<String>, SchemaHeroError> {
        self.plan(method::PLAN_VIEW_SCHEMA, &self.object_params(name, schema))
            .await
    }

    async fn plan_function_schema(&self, name: &str, schema: &Value) -> Result<Vec<String>, SchemaHeroError> {
        self.plan(method::PLAN_FUNCTION_SCHEMA, &self.object_params(name, schema))
            .await
    }

    async fn plan_extension_schema(&self, name: &str, schema: &Value) -> Result<Vec<String>, SchemaHeroError> {
        self.plan(method::PLAN_EXTENSION_SCHEMA, &self.object_params(name, schema))
            .await
    }

    async fn generate_fixtures(&self, name: &str, spec: &Value) -> Result<Vec<String>, SchemaHeroError> {
        let params = FixturesParams {
            connection: self.id.clone(),
            name: name.to_string(),
            spec: spec.clone(),
        };
        self.plan(method::GENERATE_FIXTURES, &params).await
    }

    async fn deploy_statements(&self, statements: &[String]) -> Result<(), SchemaHeroError> {
        let params = DeployParams {
            connection: self.id.clone(),
            statements: statements.to_vec(),
        };
        let _: Value = call(&self.rpc, method::DEPLOY_STATEMENTS, &params).await?;
        Ok(())
    }

    async fn describe_character_sets(&self, database: &str) -> Result<CharacterSets, SchemaHeroError> {
        let params = CharacterSetParams {
            connection: self.id.clone(),
            database: database.to_string(),
        };
        call(&self.rpc, method::DESCRIBE_CHARACTER_SETS, &params).await
    }

    async fn close(&self) -> Result<(), SchemaHeroError> {
        let params = CloseParams {
            connection: self.id.clone(),
        };
        let _: Value = call(&self.rpc, method::CLOSE, &params).await?;
        Ok(())
    }
}
