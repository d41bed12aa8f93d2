use std::sync::Arc;

use schemahero_core::models::{Migration, MigrationSpec, Resource, Table, TableSpec};
use schemahero_store::{Client, SqliteStore};

fn table(name: &str) -> Table {
    Table::new(
        "default",
        name,
        TableSpec {
            database: "app".into(),
            name: name.into(),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_table_deletion_collects_owned_migration() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("schemahero.db")).unwrap();
    let client = Client::new(Arc::new(store));

    let users = client.create(&table("users")).await.unwrap();
    let mut migration = Migration::planned(
        "default",
        "1a2b3c4",
        MigrationSpec {
            table_name: "users".into(),
            database_name: "app".into(),
            generated_ddl: "create table users (id integer)".into(),
            ..Default::default()
        },
        100,
        false,
    );
    migration
        .metadata
        .owner_references
        .push(users.owner_reference().unwrap());
    client.create(&migration).await.unwrap();

    // An unowned migration survives.
    client
        .create(&Migration::planned(
            "default",
            "7777777",
            MigrationSpec {
                database_name: "app".into(),
                ..Default::default()
            },
            100,
            false,
        ))
        .await
        .unwrap();

    assert!(client.delete::<Table>("default", "users").await.unwrap());

    let left: Vec<Migration> = client.list(Some("default")).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].metadata.name, "7777777");
}
