//! An in-process driver with canned plans, for tests of the layers above the host.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::table::SeedData;
use schemahero_core::models::Dialect;

use crate::{CharacterSets, DatabaseDriver, DriverConnection, FIXTURE_ONLY_SCHEME};

#[derive(Default)]
struct State {
    plans: HashMap<String, Vec<String>>,
    plan_failures: HashMap<String, String>,
    deploy_failure: Option<(usize, String)>,
    character_sets: Option<CharacterSets>,
    connects: Vec<(Dialect, String)>,
    plan_calls: Vec<String>,
    deployed: Vec<Vec<String>>,
    open: usize,
}

/// Returns the plan registered for an object name (empty when none) and
/// records every connect, plan and deploy call.
#[derive(Clone, Default)]
pub struct RecordingDriver {
    state: Arc<Mutex<State>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn with_plan(self, name: &str, statements: &[&str]) -> Self {
        self.set_plan(name, statements);
        self
    }

    pub fn set_plan(&self, name: &str, statements: &[&str]) {
        self.state().plans.insert(
            name.to_string(),
            statements.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn fail_plan(&self, name: &str, message: &str) {
        self.state()
            .plan_failures
            .insert(name.to_string(), message.to_string());
    }

    /// Make deploys fail on the statement at `index`.
    pub fn fail_deploy_at(&self, index: usize, message: &str) {
        self.state().deploy_failure = Some((index, message.to_string()));
    }

    pub fn set_character_sets(&self, sets: CharacterSets) {
        self.state().character_sets = Some(sets);
    }

    pub fn connects(&self) -> Vec<(Dialect, String)> {
        self.state().connects.clone()
    }

    pub fn plan_calls(&self) -> Vec<String> {
        self.state().plan_calls.clone()
    }

    /// Statements successfully issued by each deploy call.
    pub fn deployed(&self) -> Vec<Vec<String>> {
        self.state().deployed.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.state().open
    }
}

#[async_trait]
impl DatabaseDriver for RecordingDriver {
    async fn connect(
        &self,
        dialect: Dialect,
        uri: &str,
        _options: &Value,
    ) -> Result<Box<dyn DriverConnection>, SchemaHeroError> {
        let mut state = self.state();
        state.connects.push((dialect, uri.to_string()));
        state.open += 1;
        Ok(Box::new(RecordingConnection {
            driver: self.clone(),
            fixture_only: uri.starts_with(FIXTURE_ONLY_SCHEME),
        }))
    }
}

struct RecordingConnection {
    driver: RecordingDriver,
    fixture_only: bool,
}

impl RecordingConnection {
    fn plan(&self, call: &str, name: &str) -> Result<Vec<String>, SchemaHeroError> {
        let mut state = self.driver.state();
        state.plan_calls.push(format!("{call}:{name}"));
        if self.fixture_only {
            return Err(SchemaHeroError::Planning {
                message: "planning needs a live connection".into(),
            });
        }
        if let Some(message) = state.plan_failures.get(name) {
            return Err(SchemaHeroError::Planning {
                message: message.clone(),
            });
        }
        Ok(state.plans.get(name).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DriverConnection for RecordingConnection {
    async fn plan_table_schema(
        &self,
        name: &str,
        _schema: &Value,
        seed_data: Option<&SeedData>,
    ) -> Result<Vec<String>, SchemaHeroError> {
        let mut plan = self.plan("table", name)?;
        if let Some(seed) = seed_data {
            for (i, _) in seed.rows.iter().enumerate() {
                plan.push(format!("insert into {name} seed row {i}"));
            }
        }
        Ok(plan)
    }

    async fn plan_view_schema(&self, name: &str, _schema: &Value) -> Result<Vec<String>, SchemaHeroError> {
        self.plan("view", name)
    }

    async fn plan_function_schema(&self, name: &str, _schema: &Value) -> Result<Vec<String>, SchemaHeroError> {
        self.plan("function", name)
    }

    async fn plan_extension_schema(&self, name: &str, _schema: &Value) -> Result<Vec<String>, SchemaHeroError> {
        self.plan("extension", name)
    }

    async fn generate_fixtures(&self, name: &str, _spec: &Value) -> Result<Vec<String>, SchemaHeroError> {
        self.driver
            .state()
            .plan_calls
            .push(format!("fixtures:{name}"));
        Ok(vec![format!("create table {name} (fixture)")])
    }

    async fn deploy_statements(&self, statements: &[String]) -> Result<(), SchemaHeroError> {
        let mut state = self.driver.state();
        let failure = state.deploy_failure.clone();
        match failure {
            Some((index, message)) if index < statements.len() => {
                state.deployed.push(statements[..index].to_vec());
                Err(SchemaHeroError::Execution { index, message })
            }
            _ => {
                state.deployed.push(statements.to_vec());
                Ok(())
            }
        }
    }

    async fn describe_character_sets(&self, _database: &str) -> Result<CharacterSets, SchemaHeroError> {
        Ok(self.driver.state().character_sets.clone().unwrap_or_default())
    }

    async fn close(&self) -> Result<(), SchemaHeroError> {
        Ok(())
    }
}

impl Drop for RecordingConnection {
    fn drop(&mut self) {
        let mut state = self.driver.state();
        state.open = state.open.saturating_sub(1);
    }
}
