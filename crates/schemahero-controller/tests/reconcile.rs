use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use schemahero_auth::CredentialResolver;
use schemahero_controller::workload::{ServiceAccount, Workload};
use schemahero_controller::{
    run_databases, Action, BatchCoalescer, DatabaseOptionsReconciler, DatabaseReconciler,
    ManagedDatabases, MigrationReconciler, Reconciler, RuntimeSettings, StoreWorkloadHost,
    TableReconciler,
};
use schemahero_core::models::connection::{MysqlConnection, PostgresConnection};
use schemahero_core::models::{
    Database, DatabaseConnection, Dialect, DialectSchema, Migration, MigrationState, ObjectRef,
    Resource, SchemaObject, Secret, Table, TableSpec, ValueOrValueFrom,
};
use schemahero_driver::testing::RecordingDriver;
use schemahero_driver::{CharacterSets, Collation};
use schemahero_migrate::MigrationEngine;
use schemahero_planner::Planner;
use schemahero_store::{Client, MemoryStore};

struct Fixture {
    client: Client,
    driver: RecordingDriver,
    planner: Planner,
}

fn fixture() -> Fixture {
    let client = Client::new(Arc::new(MemoryStore::new()));
    let driver = RecordingDriver::new();
    for name in ["a", "b", "c", "users"] {
        driver.set_plan(name, &[&format!("create table {name} (id integer)")]);
    }
    let resolver = Arc::new(CredentialResolver::new(client.clone()).unwrap());
    let planner = Planner::new(client.clone(), resolver, Arc::new(driver.clone()));
    Fixture {
        client,
        driver,
        planner,
    }
}

fn postgres_database(name: &str, batch_window: Option<&str>) -> Database {
    let mut db = Database::new(
        "default",
        name,
        DatabaseConnection {
            postgres: Some(PostgresConnection {
                uri: ValueOrValueFrom::literal(format!("postgres://u:pw@db/{name}")),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    db.spec.batch_window = batch_window.map(str::to_string);
    db
}

fn table(name: &str, database: &str, dialect: Dialect) -> Table {
    Table::new(
        "default",
        name,
        TableSpec {
            database: database.into(),
            name: name.into(),
            schema: DialectSchema::for_dialect(dialect, json!({"columns": [{"name": "id"}]})),
            ..Default::default()
        },
    )
}

fn table_reconciler(f: &Fixture) -> TableReconciler {
    TableReconciler::new(
        f.planner.clone(),
        ManagedDatabases::All,
        BatchCoalescer::new(f.planner.clone()),
    )
}

#[tokio::test]
async fn test_table_reconcile_plans_once() {
    let f = fixture();
    f.client.create(&postgres_database("app", None)).await.unwrap();
    let users = f.client.create(&table("users", "app", Dialect::Postgres)).await.unwrap();
    let reconciler = table_reconciler(&f);

    assert_eq!(reconciler.reconcile(users).await.unwrap(), Action::Done);
    let migrations: Vec<Migration> = f.client.list(None).await.unwrap();
    assert_eq!(migrations.len(), 1);

    // Reconciling the unchanged spec writes nothing.
    let stored: Table = f.client.get_required("default", "users").await.unwrap();
    let version = stored.metadata.resource_version;
    reconciler.reconcile(stored).await.unwrap();
    let after: Table = f.client.get_required("default", "users").await.unwrap();
    assert_eq!(after.metadata.resource_version, version);
    assert_eq!(f.driver.connects().len(), 1);
}

#[tokio::test]
async fn test_missing_database_requeues() {
    let f = fixture();
    let users = f.client.create(&table("users", "app", Dialect::Postgres)).await.unwrap();
    let action = table_reconciler(&f).reconcile(users).await.unwrap();
    assert_eq!(action, Action::RequeueAfter(Duration::from_secs(10)));
}

#[tokio::test]
async fn test_dialect_mismatch_is_terminal() {
    let f = fixture();
    f.client.create(&postgres_database("app", None)).await.unwrap();
    let users = f.client.create(&table("users", "app", Dialect::Mysql)).await.unwrap();
    let reconciler = table_reconciler(&f);
    let err = reconciler.reconcile(users).await.unwrap_err();
    assert!(!err.kind().is_retryable());
    assert!(f.driver.connects().is_empty());

    // The failure is surfaced on the table itself.
    let stored: Table = f.client.get_required("default", "users").await.unwrap();
    assert_eq!(stored.last_error(), Some(err.to_string().as_str()));
    assert!(stored.last_planned_sha().is_none());

    // Fixing the spec plans it and clears the diagnostic.
    let mut fixed = stored;
    fixed.spec.schema = DialectSchema::for_dialect(Dialect::Postgres, json!({"columns": [{"name": "id"}]}));
    let fixed = f.client.update(&fixed).await.unwrap();
    reconciler.reconcile(fixed.clone()).await.unwrap();
    let after: Table = f.client.get_required("default", "users").await.unwrap();
    assert!(after.last_error().is_none());
    assert_eq!(after.last_planned_sha(), Some(fixed.spec_sha().unwrap().as_str()));
}

#[tokio::test]
async fn test_ownership_filter() {
    let f = fixture();
    let reconciler = TableReconciler::new(
        f.planner.clone(),
        ManagedDatabases::from_names(["app"]),
        BatchCoalescer::new(f.planner.clone()),
    );
    assert!(reconciler.owns(&table("users", "app", Dialect::Postgres)));
    assert!(!reconciler.owns(&table("users", "other", Dialect::Postgres)));
}

#[tokio::test(start_paused = true)]
async fn test_batch_window_coalesces_tables() {
    let f = fixture();
    let db = f
        .client
        .create(&postgres_database("app", Some("2s")))
        .await
        .unwrap();
    let coalescer = BatchCoalescer::new(f.planner.clone());
    let reconciler = TableReconciler::new(f.planner.clone(), ManagedDatabases::All, Arc::clone(&coalescer));

    for name in ["a", "b", "c"] {
        let t = f.client.create(&table(name, "app", Dialect::Postgres)).await.unwrap();
        reconciler.reconcile(t).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    assert_eq!(coalescer.pending(&db.object_ref()).await, 3);
    let before: Vec<Migration> = f.client.list(None).await.unwrap();
    assert!(before.is_empty());

    tokio::time::sleep(Duration::from_secs(4)).await;
    let migrations: Vec<Migration> = f.client.list(Some("default")).await.unwrap();
    assert_eq!(migrations.len(), 1);
    let batch = &migrations[0];
    assert!(batch.name().starts_with("batch-"));
    assert_eq!(batch.name().len(), "batch-".len() + 7);
    assert_eq!(
        batch.spec.tables,
        vec![
            ObjectRef::new("default", "a"),
            ObjectRef::new("default", "b"),
            ObjectRef::new("default", "c"),
        ]
    );
    assert_eq!(coalescer.pending(&db.object_ref()).await, 0);
    for name in ["a", "b", "c"] {
        let t: Table = f.client.get_required("default", name).await.unwrap();
        assert_eq!(t.last_planned_sha(), Some(t.spec_sha().unwrap().as_str()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_restarts_batch_window() {
    let f = fixture();
    let db = f
        .client
        .create(&postgres_database("app", Some("2s")))
        .await
        .unwrap();
    let coalescer = BatchCoalescer::new(f.planner.clone());
    let reconciler = TableReconciler::new(f.planner.clone(), ManagedDatabases::All, Arc::clone(&coalescer));

    let a = f.client.create(&table("a", "app", Dialect::Postgres)).await.unwrap();
    reconciler.reconcile(a).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let b = f.client.create(&table("b", "app", Dialect::Postgres)).await.unwrap();
    reconciler.reconcile(b).await.unwrap();

    // Past the first table's window, but the second enqueue restarted it.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(coalescer.pending(&db.object_ref()).await, 2);
    let before: Vec<Migration> = f.client.list(None).await.unwrap();
    assert!(before.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let migrations: Vec<Migration> = f.client.list(None).await.unwrap();
    assert_eq!(migrations.len(), 1);
    assert_eq!(
        migrations[0].spec.tables,
        vec![ObjectRef::new("default", "a"), ObjectRef::new("default", "b")]
    );
    assert_eq!(coalescer.tracked(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_databases_batch_independently() {
    let f = fixture();
    f.client.create(&postgres_database("app", Some("2s"))).await.unwrap();
    f.client.create(&postgres_database("shop", Some("2s"))).await.unwrap();
    let coalescer = BatchCoalescer::new(f.planner.clone());
    let reconciler = TableReconciler::new(f.planner.clone(), ManagedDatabases::All, Arc::clone(&coalescer));

    for (name, database) in [("a", "app"), ("b", "shop"), ("c", "app")] {
        let t = f.client.create(&table(name, database, Dialect::Postgres)).await.unwrap();
        reconciler.reconcile(t).await.unwrap();
    }
    assert_eq!(coalescer.tracked(), 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let migrations: Vec<Migration> = f.client.list(None).await.unwrap();
    assert_eq!(migrations.len(), 2);
    assert!(migrations.iter().all(|m| m.is_batch()));
    let app = migrations
        .iter()
        .find(|m| m.spec.database_name == "app")
        .unwrap();
    assert_eq!(
        app.spec.tables,
        vec![ObjectRef::new("default", "a"), ObjectRef::new("default", "c")]
    );
    let shop = migrations
        .iter()
        .find(|m| m.spec.database_name == "shop")
        .unwrap();
    assert_eq!(shop.spec.tables, vec![ObjectRef::new("default", "b")]);
    assert_eq!(coalescer.tracked(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_flush_is_retried() {
    let f = fixture();
    let mut db = postgres_database("app", Some("2s"));
    db.spec.connection.postgres = Some(PostgresConnection {
        uri: ValueOrValueFrom::from_secret("app-creds", "uri"),
        ..Default::default()
    });
    let db = f.client.create(&db).await.unwrap();
    let coalescer = BatchCoalescer::new(f.planner.clone());
    let reconciler = TableReconciler::new(f.planner.clone(), ManagedDatabases::All, Arc::clone(&coalescer));

    let a = f.client.create(&table("a", "app", Dialect::Postgres)).await.unwrap();
    reconciler.reconcile(a).await.unwrap();

    // The credential secret does not exist yet, so the flush cannot connect
    // and the table stays queued.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(coalescer.pending(&db.object_ref()).await, 1);
    let before: Vec<Migration> = f.client.list(None).await.unwrap();
    assert!(before.is_empty());

    f.client
        .create(&Secret::new("default", "app-creds").with_data("uri", "postgres://u:pw@db/app"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let migrations: Vec<Migration> = f.client.list(None).await.unwrap();
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].spec.tables, vec![ObjectRef::new("default", "a")]);
    assert_eq!(coalescer.pending(&db.object_ref()).await, 0);
    assert_eq!(coalescer.tracked(), 0);
    assert_eq!(f.driver.connects()[0].1, "postgres://u:pw@db/app");
}

#[tokio::test]
async fn test_without_batch_window_each_table_is_separate() {
    let f = fixture();
    f.client.create(&postgres_database("app", Some("0s"))).await.unwrap();
    let reconciler = table_reconciler(&f);
    for name in ["a", "b"] {
        let t = f.client.create(&table(name, "app", Dialect::Postgres)).await.unwrap();
        reconciler.reconcile(t).await.unwrap();
    }
    let migrations: Vec<Migration> = f.client.list(None).await.unwrap();
    assert_eq!(migrations.len(), 2);
    assert!(migrations.iter().all(|m| m.table_refs().len() == 1 && !m.is_batch()));
}

#[tokio::test]
async fn test_migration_reconciler_executes_approved() {
    let f = fixture();
    let mut db = postgres_database("app", None);
    db.spec.immediate_deploy = true;
    f.client.create(&db).await.unwrap();
    let users = f.client.create(&table("users", "app", Dialect::Postgres)).await.unwrap();
    table_reconciler(&f).reconcile(users.clone()).await.unwrap();

    let reconciler = MigrationReconciler::new(MigrationEngine::new(f.planner.clone()), ManagedDatabases::All);
    let migration: Migration = f
        .client
        .get_required("default", &users.spec_sha().unwrap())
        .await
        .unwrap();
    reconciler.reconcile(migration).await.unwrap();

    let executed: Migration = f
        .client
        .get_required("default", &users.spec_sha().unwrap())
        .await
        .unwrap();
    assert_eq!(executed.state(), MigrationState::Executed);
    assert_eq!(
        f.driver.deployed(),
        vec![vec!["create table users (id integer)".to_string()]]
    );
}

fn mysql_database(collation: Option<&str>) -> Database {
    Database::new(
        "default",
        "shop",
        DatabaseConnection {
            mysql: Some(MysqlConnection {
                uri: ValueOrValueFrom::literal("u:p@tcp(db:3306)/shop"),
                dbname: ValueOrValueFrom::literal("shop"),
                collation: collation.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
}

fn live_character_sets() -> CharacterSets {
    CharacterSets {
        current_charset: "latin1".into(),
        current_collation: "latin1_swedish_ci".into(),
        default_charset: "latin1".into(),
        default_collation: "latin1_swedish_ci".into(),
        collations: vec![
            Collation {
                collation: "latin1_swedish_ci".into(),
                charset: "latin1".into(),
                is_default: true,
            },
            Collation {
                collation: "utf8mb4_bin".into(),
                charset: "utf8mb4".into(),
                is_default: false,
            },
        ],
    }
}

#[tokio::test]
async fn test_database_options_alter_only_when_different() {
    let f = fixture();
    f.driver.set_character_sets(live_character_sets());
    let reconciler = DatabaseOptionsReconciler::new(f.planner.clone(), ManagedDatabases::All);

    reconciler.reconcile(mysql_database(None)).await.unwrap();
    assert!(f.driver.deployed().is_empty());

    reconciler
        .reconcile(mysql_database(Some("utf8mb4_bin")))
        .await
        .unwrap();
    assert_eq!(
        f.driver.deployed(),
        vec![vec![
            "ALTER DATABASE `shop` CHARACTER SET utf8mb4 COLLATE utf8mb4_bin".to_string()
        ]]
    );

    // Dialects without database options never connect.
    let connects = f.driver.connects().len();
    reconciler
        .reconcile(postgres_database("app", None))
        .await
        .unwrap();
    assert_eq!(f.driver.connects().len(), connects);
}

#[tokio::test]
async fn test_database_worker_lifecycle() {
    let f = fixture();
    let db = f.client.create(&postgres_database("app", None)).await.unwrap();
    let host = Arc::new(StoreWorkloadHost::new(f.client.clone()));
    let reconciler = DatabaseReconciler::new(host, "schemahero/schemahero:latest");

    reconciler.reconcile(db.clone()).await.unwrap();
    let workload: Workload = f.client.get_required("default", "app-controller").await.unwrap();
    assert_eq!(workload.spec.service_account_name, "schemahero-app");
    let version = workload.metadata.resource_version;

    reconciler.reconcile(db).await.unwrap();
    let again: Workload = f.client.get_required("default", "app-controller").await.unwrap();
    assert_eq!(again.metadata.resource_version, version);

    f.client.delete::<Database>("default", "app").await.unwrap();
    assert!(f.client.get::<Workload>("default", "app-controller").await.unwrap().is_none());
    assert!(f
        .client
        .get::<ServiceAccount>("default", "schemahero-app")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_manager_plans_and_executes_from_watch_events() {
    let f = fixture();
    let settings = RuntimeSettings {
        workers: 2,
        timeout: Duration::from_secs(5),
        resync: Duration::from_secs(60),
    };
    let cancel = CancellationToken::new();
    let manager = tokio::spawn(run_databases(
        f.planner.clone(),
        ManagedDatabases::All,
        settings,
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut db = postgres_database("app", None);
    db.spec.immediate_deploy = true;
    f.client.create(&db).await.unwrap();
    let users = f.client.create(&table("users", "app", Dialect::Postgres)).await.unwrap();
    let sha = users.spec_sha().unwrap();

    let mut state = None;
    for _ in 0..100 {
        if let Some(m) = f.client.get::<Migration>("default", &sha).await.unwrap() {
            state = Some(m.state());
            if state == Some(MigrationState::Executed) {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(state, Some(MigrationState::Executed));

    cancel.cancel();
    manager.await.unwrap().unwrap();
}
