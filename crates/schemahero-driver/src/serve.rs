//! Plugin side of the driver protocol. A driver executable wraps its
//! [`DatabaseDriver`] implementation in [`serve_stdio`].

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::Dialect;

use crate::protocol::{
    method, CharacterSetParams, CloseParams, ConnectParams, DeployParams, FixturesParams,
    PlanObjectParams, PlanTableParams, Request, Response, RpcError, INVALID_PARAMS,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::{DatabaseDriver, DriverConnection};

type Connections = HashMap<String, Box<dyn DriverConnection>>;

/// Answer requests from `reader` until it closes.
pub async fn serve<D, R, W>(
    driver: D,
    dialect: Dialect,
    reader: R,
    mut writer: W,
) -> Result<(), SchemaHeroError>
where
    D: DatabaseDriver,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut connections = Connections::new();
    let mut next_connection = 1u64;
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Err(e) => Response::err(None, RpcError::new(PARSE_ERROR, e.to_string())),
            Ok(request) => {
                let id = request.id;
                let result = dispatch(
                    &driver,
                    dialect,
                    &mut connections,
                    &mut next_connection,
                    request,
                )
                .await;
                match result {
                    Ok(value) => Response::ok(id, value),
                    Err(error) => Response::err(Some(id), error),
                }
            }
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    for (_, conn) in connections.drain() {
        let _ = conn.close().await;
    }
    Ok(())
}

/// Serve on the process's own stdin and stdout.
pub async fn serve_stdio<D: DatabaseDriver>(driver: D, dialect: Dialect) -> Result<(), SchemaHeroError> {
    serve(driver, dialect, tokio::io::stdin(), tokio::io::stdout()).await
}

fn params<T: DeserializeOwned>(value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))
}

fn connection<'a>(connections: &'a Connections, id: &str) -> Result<&'a dyn DriverConnection, RpcError> {
    connections
        .get(id)
        .map(|c| c.as_ref())
        .ok_or_else(|| RpcError::new(INVALID_PARAMS, format!("unknown connection {id}")))
}

fn rpc(error: SchemaHeroError) -> RpcError {
    RpcError::from_error(&error)
}

fn statements(result: Result<Vec<String>, SchemaHeroError>) -> Result<Value, RpcError> {
    result.map(|s| json!({ "statements": s })).map_err(rpc)
}

async fn dispatch<D: DatabaseDriver>(
    driver: &D,
    dialect: Dialect,
    connections: &mut Connections,
    next_connection: &mut u64,
    request: Request,
) -> Result<Value, RpcError> {
    match request.method.as_str() {
        method::CONNECT => {
            let p: ConnectParams = params(request.params)?;
            let conn = driver
                .connect(dialect, &p.uri, &p.options)
                .await
                .map_err(rpc)?;
            let id = format!("c{next_connection}");
            *next_connection += 1;
            connections.insert(id.clone(), conn);
            Ok(json!({ "connection": id }))
        }
        method::PLAN_TABLE_SCHEMA => {
            let p: PlanTableParams = params(request.params)?;
            let conn = connection(connections, &p.connection)?;
            statements(
                conn.plan_table_schema(&p.name, &p.schema, p.seed_data.as_ref())
                    .await,
            )
        }
        method::PLAN_VIEW_SCHEMA => {
            let p: PlanObjectParams = params(request.params)?;
            statements(
                connection(connections, &p.connection)?
                    .plan_view_schema(&p.name, &p.schema)
                    .await,
            )
        }
        method::PLAN_FUNCTION_SCHEMA => {
            let p: PlanObjectParams = params(request.params)?;
            statements(
                connection(connections, &p.connection)?
                    .plan_function_schema(&p.name, &p.schema)
                    .await,
            )
        }
        method::PLAN_EXTENSION_SCHEMA => {
            let p: PlanObjectParams = params(request.params)?;
            statements(
                connection(connections, &p.connection)?
                    .plan_extension_schema(&p.name, &p.schema)
                    .await,
            )
        }
        method::GENERATE_FIXTURES => {
            let p: FixturesParams = params(request.params)?;
            statements(
                connection(connections, &p.connection)?
                    .generate_fixtures(&p.name, &p.spec)
                    .await,
            )
        }
        method::DEPLOY_STATEMENTS => {
            let p: DeployParams = params(request.params)?;
            connection(connections, &p.connection)?
                .deploy_statements(&p.statements)
                .await
                .map_err(rpc)?;
            Ok(json!({}))
        }
        method::DESCRIBE_CHARACTER_SETS => {
            let p: CharacterSetParams = params(request.params)?;
            let sets = connection(connections, &p.connection)?
                .describe_character_sets(&p.database)
                .await
                .map_err(rpc)?;
            serde_json::to_value(sets).map_err(|e| rpc(e.into()))
        }
        method::CLOSE => {
            let p: CloseParams = params(request.params)?;
            if let Some(conn) = connections.remove(&p.connection) {
                conn.close().await.map_err(rpc)?;
            }
            Ok(json!({}))
        }
        other => Err(RpcError::new(METHOD_NOT_FOUND, format!("unknown method {other}"))),
    }
}
