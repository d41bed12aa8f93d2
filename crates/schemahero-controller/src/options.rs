use async_trait::async_trait;

use schemahero_auth::Scope;
use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::connection::ConnectionVariant;
use schemahero_core::models::{Database, Resource};
use schemahero_driver::CharacterSets;
use schemahero_planner::Planner;

use crate::runtime::{Action, Reconciler};
use crate::ManagedDatabases;

/// Enforces database-wide character set and collation where the dialect has them.
pub struct DatabaseOptionsReconciler {
    planner: Planner,
    managed: ManagedDatabases,
}

impl DatabaseOptionsReconciler {
    pub fn new(planner: Planner, managed: ManagedDatabases) -> Self {
        Self { planner, managed }
    }
}

/// The `(charset, collation)` pair a database should have.
///
/// Both given: use both. Only a charset: its default collation. Only a
/// collation: the charset it belongs to. Neither: the server defaults.
pub fn desired_character_set(
    charset: Option<&str>,
    collation: Option<&str>,
    live: &CharacterSets,
) -> Result<(String, String), SchemaHeroError> {
    let charset = charset.filter(|s| !s.is_empty());
    let collation = collation.filter(|s| !s.is_empty());
    match (charset, collation) {
        (Some(cs), Some(co)) => Ok((cs.to_string(), co.to_string())),
        (Some(cs), None) => live
            .collations
            .iter()
            .find(|c| c.charset == cs && c.is_default)
            .map(|c| (cs.to_string(), c.collation.clone()))
            .ok_or_else(|| SchemaHeroError::Config {
                message: format!("no default collation known for character set {cs}"),
            }),
        (None, Some(co)) => live
            .collations
            .iter()
            .find(|c| c.collation == co)
            .map(|c| (c.charset.clone(), co.to_string()))
            .ok_or_else(|| SchemaHeroError::Config {
                message: format!("unknown collation {co}"),
            }),
        (None, None) => Ok((live.default_charset.clone(), live.default_collation.clone())),
    }
}

pub fn alter_database_statement(database: &str, charset: &str, collation: &str) -> String {
    if database.is_empty() {
        format!("ALTER DATABASE CHARACTER SET {charset} COLLATE {collation}")
    } else {
        format!("ALTER DATABASE `{database}` CHARACTER SET {charset} COLLATE {collation}")
    }
}

#[async_trait]
impl Reconciler for DatabaseOptionsReconciler {
    type Object = Database;

    fn name(&self) -> &'static str {
        "database-options"
    }

    fn owns(&self, database: &Database) -> bool {
        self.managed.contains(database.name())
    }

    async fn reconcile(&self, database: Database) -> Result<Action, SchemaHeroError> {
        let variant = database
            .spec
            .connection
            .variant()
            .map_err(|e| SchemaHeroError::invalid_spec(Database::KIND, database.name(), e))?;
        if !variant.dialect().supports_character_sets() {
            return Ok(Action::Done);
        }
        let ConnectionVariant::Mysql(mysql) = variant else {
            return Ok(Action::Done);
        };

        let scope = Scope::new(database.namespace(), database.name());
        let dbname = if mysql.dbname.is_empty() {
            String::new()
        } else {
            self.planner.resolver().resolve(&mysql.dbname, scope).await?
        };

        let conn = self.planner.connect(&database).await?;
        let result = async {
            let live = conn.describe_character_sets(&dbname).await?;
            let (charset, collation) = desired_character_set(
                mysql.default_charset.as_deref(),
                mysql.collation.as_deref(),
                &live,
            )?;
            if live.current_charset == charset && live.current_collation == collation {
                return Ok(None);
            }
            let statement = alter_database_statement(&dbname, &charset, &collation);
            conn.deploy_statements(std::slice::from_ref(&statement)).await?;
            Ok::<_, SchemaHeroError>(Some(statement))
        }
        .await;
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "closing driver connection failed");
        }

        if let Some(statement) = result? {
            tracing::info!(
                namespace = %database.namespace(),
                database = %database.name(),
                statement = %statement,
                "updated database character set"
            );
        }
        Ok(Action::Done)
    }
}
