use rusqlite::Connection;

use crate::schema;

/// Run all pending store schema migrations.
pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(schema::CREATE_SCHEMA_VERSION)?;

    let current = get_version(conn)?;

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn get_version(conn: &Connection) -> anyhow::Result<i64> {
    let version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);
    Ok(version)
}

fn set_version(conn: &Connection, version: i64) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// v1: resource documents and their owner references.
fn migrate_v1(conn: &Connection) -> anyhow::Result<()> {
    tracing::info!("applying store migration v1: resources");
    conn.execute_batch(schema::CREATE_RESOURCES)?;
    conn.execute_batch(schema::CREATE_OWNER_REFERENCES)?;
    conn.execute_batch(schema::CREATE_RESOURCE_VERSION_COUNTER)?;
    conn.execute_batch(schema::SEED_RESOURCE_VERSION_COUNTER)?;
    set_version(conn, 1)?;
    Ok(())
}

/// v2: list-by-kind index.
fn migrate_v2(conn: &Connection) -> anyhow::Result<()> {
    tracing::info!("applying store migration v2: kind index");
    conn.execute_batch(schema::CREATE_KIND_INDEX)?;
    set_version(conn, 2)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), 2);
    }
}
