use std::sync::Arc;

use schemahero_auth::CredentialResolver;
use schemahero_core::config::SchemaHeroConfig;
use schemahero_core::models::{Database, Migration, MigrationState, ObjectKind, SchemaObject, Table};
use schemahero_core::spec_file::{load_path, Document};
use schemahero_driver::testing::RecordingDriver;
use schemahero_migrate::{ExecuteOutcome, MigrationEngine};
use schemahero_planner::{PlanOutcome, Planner};
use schemahero_store::{Client, SqliteStore};

const RESOURCES: &str = r#"
apiVersion: databases.schemahero.io/v1alpha4
kind: Database
metadata:
  name: app
spec:
  connection:
    postgres:
      uri:
        value: postgres://u:pw@db/app
---
apiVersion: schemas.schemahero.io/v1alpha4
kind: Table
metadata:
  name: users
spec:
  database: app
  name: users
  schema:
    postgres:
      primaryKey: [id]
      columns:
        - name: id
          type: integer
"#;

#[test]
fn test_config_defaults() {
    let config = SchemaHeroConfig::default();
    assert_eq!(config.reconcile_workers, 4);
    assert_eq!(config.reconcile_timeout_secs, 120);
    assert_eq!(config.resync_interval_secs, 300);
    assert!(!config.deploy_seed_data);
    assert_eq!(config.manager_image, "schemahero/schemahero:latest");
}

#[test]
fn test_config_roundtrip() {
    let config = SchemaHeroConfig::default();
    let serialized = toml::to_string_pretty(&config).unwrap();
    let deserialized: SchemaHeroConfig = toml::from_str(&serialized).unwrap();
    assert_eq!(config.reconcile_workers, deserialized.reconcile_workers);
    assert_eq!(config.vault_agent_uri_path, deserialized.vault_agent_uri_path);
}

#[tokio::test]
async fn test_full_pipeline_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let spec_path = dir.path().join("app.yaml");
    std::fs::write(&spec_path, RESOURCES).unwrap();
    let store_path = dir.path().join("store").join("schemahero.db");

    // 1. Import the resource documents
    let (documents, errors) = load_path(&spec_path, ObjectKind::Table).unwrap();
    assert!(errors.is_empty());
    assert_eq!(documents.len(), 2);

    let client = Client::new(Arc::new(SqliteStore::open(&store_path).unwrap()));
    for loaded in &documents {
        loaded.document.validate(None).unwrap();
        match &loaded.document {
            Document::Database(db) => {
                client.upsert(db).await.unwrap();
            }
            Document::Table(t) => {
                client.upsert(t).await.unwrap();
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    // 2. Plan the table
    let driver = RecordingDriver::new().with_plan("users", &["create table users (id integer)"]);
    let resolver = Arc::new(CredentialResolver::new(client.clone()).unwrap());
    let planner = Planner::new(client.clone(), resolver, Arc::new(driver.clone()));
    let database: Database = client.get_required("default", "app").await.unwrap();
    let users: Table = client.get_required("default", "users").await.unwrap();
    let sha = users.spec_sha().unwrap();

    let outcome = planner.plan_object(&users, &database).await.unwrap();
    assert!(matches!(outcome, PlanOutcome::Created { statements: 1, approved: false, .. }));

    // 3. Approve and execute
    let engine = MigrationEngine::new(planner);
    engine.approve(Some("default"), &sha).await.unwrap();
    match engine.execute("default", &sha).await.unwrap() {
        ExecuteOutcome::Executed { statements } => assert_eq!(statements, 1),
        other => panic!("expected execution, got {other:?}"),
    }
    assert_eq!(driver.connects()[0].1, "postgres://u:pw@db/app");

    // 4. Everything survives reopening the store
    drop(engine);
    drop(client);
    let reopened = Client::new(Arc::new(SqliteStore::open(&store_path).unwrap()));
    let migration: Migration = reopened.get_required("default", &sha).await.unwrap();
    assert_eq!(migration.state(), MigrationState::Executed);
    assert_eq!(migration.spec.table_name, "users");
    let users: Table = reopened.get_required("default", "users").await.unwrap();
    assert_eq!(users.last_planned_sha(), Some(sha.as_str()));
}
