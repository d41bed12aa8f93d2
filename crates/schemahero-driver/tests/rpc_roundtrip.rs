use std::sync::Arc;

use serde_json::{json, Value};

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::table::{SeedData, SeedRow};
use schemahero_core::models::Dialect;
use schemahero_driver::testing::RecordingDriver;
use schemahero_driver::{
    fixture_uri, serve, CharacterSets, Collation, DatabaseDriver, RpcClient, RpcDriver,
};

/// A driver served over an in-memory pipe, as a plugin process would be.
fn piped(driver: RecordingDriver) -> RpcDriver {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let (read, write) = tokio::io::split(server_io);
        serve(driver, Dialect::Postgres, read, write).await
    });
    let (read, write) = tokio::io::split(client_io);
    RpcDriver::new(Arc::new(RpcClient::new("postgres", read, write)))
}

#[tokio::test]
async fn test_plan_and_deploy_over_rpc() {
    let recording = RecordingDriver::new().with_plan(
        "users",
        &["create table users (id integer)", "create index users_id on users (id)"],
    );
    let driver = piped(recording.clone());

    let conn = driver
        .connect(Dialect::Postgres, "postgres://u@h/d", &Value::Null)
        .await
        .unwrap();
    let plan = conn
        .plan_table_schema("users", &json!({"columns": []}), None)
        .await
        .unwrap();
    assert_eq!(plan.len(), 2);

    let seed = SeedData {
        rows: vec![SeedRow::default(), SeedRow::default()],
    };
    let seeded = conn
        .plan_table_schema("users", &json!({}), Some(&seed))
        .await
        .unwrap();
    assert_eq!(seeded.len(), 4);

    conn.deploy_statements(&plan).await.unwrap();
    conn.close().await.unwrap();

    assert_eq!(recording.connects(), vec![(Dialect::Postgres, "postgres://u@h/d".to_string())]);
    assert_eq!(recording.deployed(), vec![plan]);
}

#[tokio::test]
async fn test_structured_errors_cross_the_wire() {
    let recording = RecordingDriver::new().with_plan("a", &["one", "two", "three"]);
    recording.fail_plan("broken", "unsupported column type: geography");
    recording.fail_deploy_at(1, "syntax error at or near \"two\"");
    let driver = piped(recording);

    let conn = driver
        .connect(Dialect::Postgres, "postgres://h/d", &Value::Null)
        .await
        .unwrap();

    let err = conn
        .plan_view_schema("broken", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaHeroError::Planning { .. }));
    assert!(err.to_string().contains("geography"));

    let plan = conn.plan_table_schema("a", &json!({}), None).await.unwrap();
    let err = conn.deploy_statements(&plan).await.unwrap_err();
    match err {
        SchemaHeroError::Execution { index, message } => {
            assert_eq!(index, 1);
            assert!(message.contains("syntax error"));
        }
        other => panic!("expected execution error, got {other}"),
    }
}

#[tokio::test]
async fn test_character_sets_and_fixtures() {
    let recording = RecordingDriver::new();
    recording.set_character_sets(CharacterSets {
        current_charset: "latin1".into(),
        current_collation: "latin1_swedish_ci".into(),
        default_charset: "utf8mb4".into(),
        default_collation: "utf8mb4_0900_ai_ci".into(),
        collations: vec![Collation {
            collation: "utf8mb4_bin".into(),
            charset: "utf8mb4".into(),
            is_default: false,
        }],
    });
    let driver = piped(recording.clone());

    let conn = driver
        .connect(Dialect::Postgres, "mysql://h/d", &Value::Null)
        .await
        .unwrap();
    let sets = conn.describe_character_sets("app").await.unwrap();
    assert_eq!(sets.current_charset, "latin1");
    assert_eq!(sets.collations.len(), 1);

    let fixtures_conn = driver
        .connect(Dialect::Postgres, &fixture_uri(Dialect::Postgres), &Value::Null)
        .await
        .unwrap();
    let fixtures = fixtures_conn
        .generate_fixtures("users", &json!({}))
        .await
        .unwrap();
    assert_eq!(fixtures, vec!["create table users (fixture)".to_string()]);
    assert!(fixtures_conn
        .plan_table_schema("users", &json!({}), None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_unknown_connection_is_rejected() {
    let driver = piped(RecordingDriver::new());
    let conn = driver
        .connect(Dialect::Postgres, "postgres://h/d", &Value::Null)
        .await
        .unwrap();
    conn.close().await.unwrap();

    // The plugin forgot the connection on close.
    let err = conn
        .plan_table_schema("users", &json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaHeroError::Protocol { .. }));
}
