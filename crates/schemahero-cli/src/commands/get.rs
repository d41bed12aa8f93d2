use clap::{Args, ValueEnum};
use comfy_table::{Cell, Color, Table as Grid};

use schemahero_core::models::{
    DataMigration, Database, Migration, MigrationState, Resource, SchemaObject, Table,
};
use schemahero_core::spec_file::DEFAULT_NAMESPACE;

use super::context::{format_timestamp, Context};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    #[value(alias = "database", alias = "db")]
    Databases,
    #[value(alias = "table")]
    Tables,
    #[value(alias = "migration", alias = "m")]
    Migrations,
    #[value(alias = "datamigration")]
    Datamigrations,
}

#[derive(Args)]
pub struct GetArgs {
    /// What to list
    pub resource: ResourceKind,

    #[arg(short, long, env = "SCHEMAHERO_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// List across every namespace
    #[arg(short = 'A', long, env = "SCHEMAHERO_ALL_NAMESPACES")]
    pub all_namespaces: bool,
}

pub async fn run(args: GetArgs) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let scope = if args.all_namespaces {
        None
    } else {
        Some(args.namespace.as_str())
    };

    let (grid, empty) = match args.resource {
        ResourceKind::Databases => {
            let items: Vec<Database> = ctx.client.list(scope).await?;
            (databases_grid(&items), items.is_empty())
        }
        ResourceKind::Tables => {
            let items: Vec<Table> = ctx.client.list(scope).await?;
            (tables_grid(&items), items.is_empty())
        }
        ResourceKind::Migrations => {
            let items: Vec<Migration> = ctx.client.list(scope).await?;
            (migrations_grid(&items), items.is_empty())
        }
        ResourceKind::Datamigrations => {
            let items: Vec<DataMigration> = ctx.client.list(scope).await?;
            (data_migrations_grid(&items), items.is_empty())
        }
    };

    if empty {
        match scope {
            Some(ns) => println!("No resources found in namespace {ns}."),
            None => println!("No resources found."),
        }
        return Ok(());
    }
    println!("{grid}");
    Ok(())
}

pub fn databases_grid(items: &[Database]) -> Grid {
    let mut grid = Grid::new();
    grid.set_header(vec!["NAMESPACE", "NAME", "DRIVER", "IMMEDIATE DEPLOY", "BATCH WINDOW"]);
    for db in items {
        let driver = db
            .spec
            .connection
            .dialect()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "invalid".to_string());
        grid.add_row(vec![
            db.namespace().to_string(),
            db.name().to_string(),
            driver,
            db.spec.immediate_deploy.to_string(),
            db.spec.batch_window.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    grid
}

pub fn tables_grid(items: &[Table]) -> Grid {
    let mut grid = Grid::new();
    grid.set_header(vec!["NAMESPACE", "NAME", "DATABASE", "SPEC SHA", "PLANNED"]);
    for table in items {
        let sha = table.spec_sha().unwrap_or_default();
        let planned = table.last_planned_sha() == Some(sha.as_str());
        grid.add_row(vec![
            Cell::new(table.namespace()),
            Cell::new(table.name()),
            Cell::new(&table.spec.database),
            Cell::new(&sha),
            if planned {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("pending").fg(Color::Yellow)
            },
        ]);
    }
    grid
}

pub fn migrations_grid(items: &[Migration]) -> Grid {
    let mut grid = Grid::new();
    grid.set_header(vec![
        "NAMESPACE", "NAME", "DATABASE", "TABLE", "STATE", "PLANNED", "APPROVED", "REJECTED",
        "EXECUTED",
    ]);
    for m in items {
        let tables = if m.is_batch() {
            m.table_refs()
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        } else if m.spec.table_name.is_empty() {
            m.metadata
                .owner_references
                .first()
                .map(|o| format!("{}/{}", o.kind, o.name))
                .unwrap_or_default()
        } else {
            m.spec.table_name.clone()
        };
        let state = m.state();
        let color = match state {
            MigrationState::Planned => Color::Yellow,
            MigrationState::Approved => Color::Cyan,
            MigrationState::Rejected => Color::Red,
            MigrationState::Executed => Color::Green,
        };
        let state_cell = if m.status.last_error.is_some() {
            Cell::new(format!("{state} (failed)")).fg(Color::Red)
        } else {
            Cell::new(state.to_string()).fg(color)
        };
        grid.add_row(vec![
            Cell::new(m.namespace()),
            Cell::new(m.name()),
            Cell::new(&m.spec.database_name),
            Cell::new(tables),
            state_cell,
            Cell::new(format_timestamp(m.status.planned_at)),
            Cell::new(format_timestamp(m.status.approved_at)),
            Cell::new(format_timestamp(m.status.rejected_at)),
            Cell::new(format_timestamp(m.status.executed_at)),
        ]);
    }
    grid
}

pub fn data_migrations_grid(items: &[DataMigration]) -> Grid {
    let mut grid = Grid::new();
    grid.set_header(vec!["NAMESPACE", "NAME", "DATABASE", "MIGRATIONS", "EXECUTED"]);
    for dm in items {
        grid.add_row(vec![
            dm.namespace().to_string(),
            dm.name().to_string(),
            dm.spec.database.clone(),
            dm.spec.migrations.len().to_string(),
            format_timestamp(dm.status.executed_at),
        ]);
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemahero_core::models::{MigrationSpec, ObjectRef};

    #[test]
    fn test_batch_migration_lists_every_table() {
        let spec = MigrationSpec {
            database_name: "app".into(),
            generated_ddl: "create table a (id integer)".into(),
            tables: vec![ObjectRef::new("default", "a"), ObjectRef::new("default", "b")],
            ..Default::default()
        };
        let migration = Migration::planned("default", "batch-abc1234", spec, 0, false);
        let rendered = migrations_grid(&[migration]).to_string();
        assert!(rendered.contains("batch-abc1234"));
        assert!(rendered.contains("a,b"));
        assert!(rendered.contains("planned"));
    }
}
