use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use schemahero_core::error::SchemaHeroError;

use crate::protocol::{Request, Response};

type Reply = Result<Value, SchemaHeroError>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Client half of a driver RPC channel.
///
/// Calls may be issued concurrently; responses are matched by id. When the
/// plugin's output closes, every outstanding call fails with `DriverCrashed`.
pub struct RpcClient {
    driver: String,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

/// Removes a pending slot if the caller stops waiting.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

fn crashed(driver: &str, message: impl Into<String>) -> SchemaHeroError {
    SchemaHeroError::DriverCrashed {
        driver: driver.to_string(),
        message: message.into(),
    }
}

impl RpcClient {
    pub fn new<R, W>(driver: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_responses(
            driver.to_string(),
            reader,
            pending.clone(),
            closed.clone(),
        ));
        Self {
            driver: driver.to_string(),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Whether the plugin side has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, SchemaHeroError> {
        if self.is_closed() {
            return Err(crashed(&self.driver, "plugin output closed"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| SchemaHeroError::Internal("rpc pending table poisoned".into()))?
            .insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        let mut line = serde_json::to_vec(&Request::new(id, method, params))?;
        line.push(b'\n');
        {
            let mut writer = self.writer.lock().await;
            let written = async {
                writer.write_all(&line).await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = written {
                return Err(crashed(&self.driver, format!("write {method}: {e}")));
            }
        }
        tracing::trace!(driver = %self.driver, id, method, "rpc request sent");

        match rx.await {
            Ok(reply) => reply,
            Err(_) => Err(crashed(&self.driver, format!("no response to {method}"))),
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_responses<R>(driver: String, reader: R, pending: Pending, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    let reason = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response: Response = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(driver = %driver, error = %e, "discarding malformed driver output");
                        continue;
                    }
                };
                let Some(id) = response.id else {
                    tracing::warn!(driver = %driver, "driver response without id");
                    continue;
                };
                let reply = match (response.error, response.result) {
                    (Some(err), _) => Err(err.into_error(&driver)),
                    (None, result) => Ok(result.unwrap_or(Value::Null)),
                };
                let sender = pending.lock().ok().and_then(|mut p| p.remove(&id));
                match sender {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => tracing::debug!(driver = %driver, id, "response for abandoned call"),
                }
            }
            Ok(None) => break "unexpected EOF".to_string(),
            Err(e) => break format!("read failed: {e}"),
        }
    };

    closed.store(true, Ordering::SeqCst);
    tracing::warn!(driver = %driver, reason = %reason, "driver plugin output closed");
    let drained: Vec<_> = match pending.lock() {
        Ok(mut p) => p.drain().collect(),
        Err(_) => Vec::new(),
    };
    for (_, tx) in drained {
        let _ = tx.send(Err(crashed(&driver, reason.clone())));
    }
}
