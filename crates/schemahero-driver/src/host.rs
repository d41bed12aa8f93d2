use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::{Child, Command};

use schemahero_core::config::SchemaHeroConfig;
use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::Dialect;

use crate::remote;
use crate::transport::RpcClient;
use crate::{DatabaseDriver, DriverConnection};

/// Spawns `schemahero-<dialect>` plugin executables and shares one process per
/// dialect between all open connections.
#[derive(Clone)]
pub struct PluginHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    search_paths: Vec<PathBuf>,
    processes: Mutex<HashMap<Dialect, Entry>>,
}

struct Entry {
    process: Arc<PluginProcess>,
    refs: usize,
}

struct PluginProcess {
    rpc: Arc<RpcClient>,
    path: PathBuf,
    // Killed when the last lease goes away.
    _child: Child,
}

/// One connection's claim on a plugin process.
pub struct Lease {
    host: Arc<HostInner>,
    dialect: Dialect,
    process: Arc<PluginProcess>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.host.release(self.dialect, &self.process);
    }
}

fn poisoned() -> SchemaHeroError {
    SchemaHeroError::Internal("plugin process table poisoned".into())
}

impl HostInner {
    fn release(&self, dialect: Dialect, process: &Arc<PluginProcess>) {
        let Ok(mut processes) = self.processes.lock() else {
            return;
        };
        let Some(entry) = processes.get_mut(&dialect) else {
            return;
        };
        // A crashed process may already have been replaced.
        if !Arc::ptr_eq(&entry.process, process) {
            return;
        }
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            tracing::debug!(driver = %dialect, path = %entry.process.path.display(), "stopping idle driver plugin");
            processes.remove(&dialect);
        }
    }
}

impl PluginHost {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            inner: Arc::new(HostInner {
                search_paths,
                processes: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(config: &SchemaHeroConfig) -> Self {
        Self::new(config.plugin_paths.clone())
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.inner.search_paths
    }

    /// First `schemahero-<dialect>` file found on the search path.
    pub fn discover(&self, dialect: Dialect) -> Result<PathBuf, SchemaHeroError> {
        let binary = dialect.plugin_binary();
        self.inner
            .search_paths
            .iter()
            .map(|dir| dir.join(&binary))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| SchemaHeroError::DriverUnavailable {
                driver: dialect.to_string(),
                searched: self
                    .inner
                    .search_paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Number of plugin processes currently running.
    pub fn running(&self) -> usize {
        self.inner.processes.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn spawn(&self, dialect: Dialect, path: &Path) -> Result<PluginProcess, SchemaHeroError> {
        let crashed = |message: String| SchemaHeroError::DriverCrashed {
            driver: dialect.to_string(),
            message,
        };
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| crashed(format!("failed to start {}: {e}", path.display())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| crashed("plugin stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| crashed("plugin stdout unavailable".into()))?;
        tracing::info!(driver = %dialect, path = %path.display(), pid = child.id(), "started driver plugin");
        Ok(PluginProcess {
            rpc: Arc::new(RpcClient::new(dialect.as_str(), stdout, stdin)),
            path: path.to_path_buf(),
            _child: child,
        })
    }

    fn acquire(&self, dialect: Dialect) -> Result<Lease, SchemaHeroError> {
        let mut processes = self.inner.processes.lock().map_err(|_| poisoned())?;
        if let Some(entry) = processes.get_mut(&dialect) {
            if !entry.process.rpc.is_closed() {
                entry.refs += 1;
                return Ok(Lease {
                    host: self.inner.clone(),
                    dialect,
                    process: entry.process.clone(),
                });
            }
            tracing::warn!(driver = %dialect, "driver plugin exited, restarting");
        }

        let path = self.discover(dialect)?;
        let process = Arc::new(self.spawn(dialect, &path)?);
        processes.insert(
            dialect,
            Entry {
                process: process.clone(),
                refs: 1,
            },
        );
        Ok(Lease {
            host: self.inner.clone(),
            dialect,
            process,
        })
    }
}

#[async_trait]
impl DatabaseDriver for PluginHost {
    async fn connect(
        &self,
        dialect: Dialect,
        uri: &str,
        options: &Value,
    ) -> Result<Box<dyn DriverConnection>, SchemaHeroError> {
        let lease = self.acquire(dialect)?;
        let rpc = lease.process.rpc.clone();
        let conn = remote::open(rpc, uri, options, Some(lease)).await?;
        Ok(Box::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_missing_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let host = PluginHost::new(vec![dir.path().to_path_buf()]);
        let err = host.discover(Dialect::Postgres).unwrap_err();
        assert!(matches!(err, SchemaHeroError::DriverUnavailable { .. }));
        assert!(err.to_string().contains(&dir.path().display().to_string()));
        assert!(!err.kind().is_retryable());
    }

    #[test]
    fn test_discover_follows_search_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("schemahero-mysql"), "").unwrap();
        let host = PluginHost::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(
            host.discover(Dialect::Mysql).unwrap(),
            second.path().join("schemahero-mysql")
        );

        std::fs::write(first.path().join("schemahero-mysql"), "").unwrap();
        assert_eq!(
            host.discover(Dialect::Mysql).unwrap(),
            first.path().join("schemahero-mysql")
        );
    }

    #[cfg(unix)]
    fn write_plugin(dir: &Path, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_plugin_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(
            dir.path(),
            "schemahero-postgres",
            "#!/bin/sh\n\
             read line\n\
             echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"connection\":\"c1\"}}'\n\
             read line\n\
             echo '{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"statements\":[\"create table t (id int)\"]}}'\n\
             read line\n",
        );
        write_plugin(dir.path(), "schemahero-mysql", "#!/bin/sh\nexit 0\n");
        let host = PluginHost::new(vec![dir.path().to_path_buf()]);

        let conn = host
            .connect(Dialect::Postgres, "postgres://h/d", &Value::Null)
            .await
            .unwrap();
        assert_eq!(host.running(), 1);
        let plan = conn
            .plan_table_schema("t", &serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(plan, vec!["create table t (id int)".to_string()]);
        drop(conn);
        assert_eq!(host.running(), 0);

        // A plugin that exits immediately is a crash, not a hang.
        let err = match host.connect(Dialect::Mysql, "u:p@tcp(h)/d", &Value::Null).await {
            Ok(_) => panic!("connect to an exiting plugin succeeded"),
            Err(e) => e,
        };
        assert!(matches!(err, SchemaHeroError::DriverCrashed { .. }));
        assert_eq!(host.running(), 0);
    }
}
