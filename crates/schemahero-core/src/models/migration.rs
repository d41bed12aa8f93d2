use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, ObjectRef, Resource, SCHEMAS_API_VERSION};
use crate::ddl;
use crate::error::SchemaHeroError;

/// Prefix of migrations produced by the batch coalescer.
pub const BATCH_PREFIX: &str = "batch-";

/// A reviewable DDL plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub metadata: ObjectMeta,
    pub spec: MigrationSpec,
    #[serde(default)]
    pub status: MigrationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSpec {
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub table_namespace: String,
    pub database_name: String,
    /// Statements joined by `;\n`.
    #[serde(default, rename = "generatedDDL")]
    pub generated_ddl: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<ObjectRef>,
}

/// Stored phase. `executedAt` stays authoritative for "executed".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Planned,
    Executed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Planned => write!(f, "Planned"),
            Phase::Executed => write!(f, "Executed"),
        }
    }
}

/// Unix-second timestamps; zero means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub planned_at: i64,
    #[serde(default)]
    pub approved_at: i64,
    #[serde(default)]
    pub rejected_at: i64,
    #[serde(default)]
    pub executed_at: i64,
    #[serde(default)]
    pub invalidated_at: i64,
    /// First failure seen while executing; blocks automatic re-execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// State derived from the status timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Planned,
    Approved,
    Rejected,
    Executed,
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationState::Planned => write!(f, "planned"),
            MigrationState::Approved => write!(f, "approved"),
            MigrationState::Rejected => write!(f, "rejected"),
            MigrationState::Executed => write!(f, "executed"),
        }
    }
}

impl Migration {
    /// A freshly planned migration. `immediate_deploy` approves it on creation.
    pub fn planned(
        namespace: &str,
        name: &str,
        spec: MigrationSpec,
        now: i64,
        immediate_deploy: bool,
    ) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: MigrationStatus {
                phase: Phase::Planned,
                planned_at: now,
                approved_at: if immediate_deploy { now } else { 0 },
                ..Default::default()
            },
        }
    }

    pub fn state(&self) -> MigrationState {
        if self.status.executed_at > 0 {
            MigrationState::Executed
        } else if self.status.rejected_at > 0 {
            MigrationState::Rejected
        } else if self.status.approved_at > 0 {
            MigrationState::Approved
        } else {
            MigrationState::Planned
        }
    }

    pub fn is_batch(&self) -> bool {
        self.metadata.name.starts_with(BATCH_PREFIX)
    }

    /// Approved, not yet executed, and not blocked by an earlier failure.
    pub fn is_ready_to_execute(&self) -> bool {
        self.state() == MigrationState::Approved && self.status.last_error.is_none()
    }

    fn transition_error(&self, action: &str, reason: &str) -> SchemaHeroError {
        SchemaHeroError::InvalidTransition {
            action: action.to_string(),
            name: self.metadata.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Planned → Approved. Approving an already approved migration is a no-op.
    pub fn approve(&mut self, now: i64) -> Result<(), SchemaHeroError> {
        if self.status.rejected_at > 0 {
            return Err(self.transition_error("approve", "it has been rejected"));
        }
        if self.status.executed_at > 0 {
            return Err(self.transition_error("approve", "it has already been executed"));
        }
        if self.status.approved_at == 0 {
            self.status.approved_at = now;
        }
        Ok(())
    }

    /// Planned → Rejected.
    pub fn reject(&mut self, now: i64) -> Result<(), SchemaHeroError> {
        if self.status.approved_at > 0 {
            return Err(self.transition_error("reject", "it has already been approved"));
        }
        if self.status.executed_at > 0 {
            return Err(self.transition_error("reject", "it has already been executed"));
        }
        if self.status.rejected_at == 0 {
            self.status.rejected_at = now;
        }
        Ok(())
    }

    /// Approved → Executed.
    pub fn mark_executed(&mut self, now: i64) -> Result<(), SchemaHeroError> {
        if self.status.approved_at == 0 {
            return Err(self.transition_error("execute", "it has not been approved"));
        }
        if self.status.rejected_at > 0 {
            return Err(self.transition_error("execute", "it has been rejected"));
        }
        self.status.executed_at = now;
        self.status.phase = Phase::Executed;
        self.status.last_error = None;
        Ok(())
    }

    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.status.last_error = Some(message.into());
    }

    /// The plan as individual statements.
    pub fn statements(&self) -> Vec<String> {
        ddl::split_statements(&self.spec.generated_ddl)
    }

    /// References to every table this migration was planned from.
    pub fn table_refs(&self) -> Vec<ObjectRef> {
        if !self.spec.tables.is_empty() {
            return self.spec.tables.clone();
        }
        if self.spec.table_name.is_empty() {
            return Vec::new();
        }
        let namespace = if self.spec.table_namespace.is_empty() {
            self.metadata.namespace.clone()
        } else {
            self.spec.table_namespace.clone()
        };
        vec![ObjectRef::new(namespace, self.spec.table_name.clone())]
    }
}

impl Resource for Migration {
    const KIND: &'static str = "Migration";
    const API_VERSION: &'static str = SCHEMAS_API_VERSION;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
