use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use serde_json::Value;

use schemahero_auth::redact_uri;
use schemahero_core::ddl::join_statements;
use schemahero_core::models::{Dialect, ObjectKind, Resource, SchemaObject, Table};
use schemahero_core::spec_file::{load_path, Document};
use schemahero_driver::{fixture_uri, DatabaseDriver, DriverConnection, PluginHost};
use schemahero_planner::{object_statements, order_by_requires, Plannable, Requires};

#[derive(Args)]
pub struct PlanArgs {
    /// Database driver (postgres, mysql, cockroachdb, sqlite, rqlite, timescaledb, cassandra)
    #[arg(long, env = "SCHEMAHERO_DRIVER")]
    pub driver: Dialect,

    /// Connection URI of the live database
    #[arg(long, env = "SCHEMAHERO_URI", required_unless_present = "fixtures")]
    pub uri: Option<String>,

    /// Spec file or directory of spec files
    #[arg(long, env = "SCHEMAHERO_SPEC_FILE")]
    pub spec_file: PathBuf,

    /// Write the DDL here instead of stdout
    #[arg(long, env = "SCHEMAHERO_OUT")]
    pub out: Option<PathBuf>,

    /// Kind given to bare specs (table, view, function, extension)
    #[arg(long, env = "SCHEMAHERO_SPEC_TYPE", default_value = "table")]
    pub spec_type: ObjectKind,

    /// Include seed data in table plans
    #[arg(long, env = "SCHEMAHERO_SEED_DATA")]
    pub seed_data: bool,

    /// Generate CREATE statements offline instead of diffing a live database
    #[arg(long, env = "SCHEMAHERO_FIXTURES")]
    pub fixtures: bool,
}

/// How `plan_documents` talks to the connection.
#[derive(Debug, Clone, Copy)]
pub struct PlanMode {
    pub seed_data: bool,
    pub fixtures: bool,
}

pub async fn run(args: PlanArgs) -> anyhow::Result<()> {
    let (documents, errors) = load_path(&args.spec_file, args.spec_type)?;
    if let Some(first) = errors.first() {
        for e in &errors {
            eprintln!("{}: {}", e.path.display(), e.error);
        }
        anyhow::bail!("could not read {}", first.path.display());
    }
    let documents: Vec<Document> = documents.into_iter().map(|d| d.document).collect();

    let uri = match (&args.uri, args.fixtures) {
        (_, true) => fixture_uri(args.driver),
        (Some(uri), false) => uri.clone(),
        (None, false) => anyhow::bail!("--uri is required unless --fixtures is set"),
    };
    tracing::debug!(driver = %args.driver, uri = %redact_uri(&uri), "planning");

    let host = PluginHost::from_config(&schemahero_core::config::SchemaHeroConfig::load()?);
    let conn = host.connect(args.driver, &uri, &Value::Null).await?;
    let mode = PlanMode {
        seed_data: args.seed_data,
        fixtures: args.fixtures,
    };
    let planned = plan_documents(conn.as_ref(), args.driver, args.spec_type, documents, mode).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "closing driver connection failed");
    }
    let statements = planned?;

    let ddl = join_statements(&statements);
    match &args.out {
        Some(path) => {
            std::fs::write(path, &ddl)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote {} statements to {}", statements.len(), path.display());
        }
        None => {
            if !ddl.is_empty() {
                println!("{ddl}");
            }
        }
    }
    Ok(())
}

/// Plan every document of `kind`, in `requires` order, against one connection.
pub async fn plan_documents(
    conn: &dyn DriverConnection,
    dialect: Dialect,
    kind: ObjectKind,
    documents: Vec<Document>,
    mode: PlanMode,
) -> anyhow::Result<Vec<String>> {
    if mode.fixtures && kind != ObjectKind::Table {
        anyhow::bail!("fixtures can only be generated for tables, not {kind}");
    }
    match kind {
        ObjectKind::Table => {
            let tables = select(documents, |d| match d {
                Document::Table(t) => Some(t),
                _ => None,
            });
            if mode.fixtures {
                return fixtures(conn, dialect, tables).await;
            }
            plan_objects(conn, dialect, tables, mode.seed_data).await
        }
        ObjectKind::View => {
            let views = select(documents, |d| match d {
                Document::View(v) => Some(v),
                _ => None,
            });
            plan_objects(conn, dialect, views, false).await
        }
        ObjectKind::Function => {
            let functions = select(documents, |d| match d {
                Document::Function(f) => Some(f),
                _ => None,
            });
            plan_objects(conn, dialect, functions, false).await
        }
        ObjectKind::Extension => {
            let extensions = select(documents, |d| match d {
                Document::DatabaseExtension(e) => Some(e),
                _ => None,
            });
            plan_objects(conn, dialect, extensions, false).await
        }
    }
}

fn select<T>(documents: Vec<Document>, pick: impl Fn(Document) -> Option<T>) -> Vec<T> {
    documents.into_iter().filter_map(pick).collect()
}

/// The object's schema document for `dialect`, or an error naming both.
fn schema_for<T: SchemaObject>(obj: &T, dialect: Dialect) -> anyhow::Result<&Value> {
    let (found, document) = obj
        .schema()
        .variant()
        .map_err(|e| anyhow::anyhow!("{} {}: {e}", T::KIND, obj.name()))?;
    if found != dialect {
        anyhow::bail!(
            "{} {} has a {found} schema but the driver is {dialect}",
            T::KIND,
            obj.name()
        );
    }
    Ok(document)
}

async fn plan_objects<T: Plannable + Requires>(
    conn: &dyn DriverConnection,
    dialect: Dialect,
    objects: Vec<T>,
    seed_data: bool,
) -> anyhow::Result<Vec<String>> {
    let mut statements = Vec::new();
    for obj in order_by_requires(objects)? {
        let document = schema_for(&obj, dialect)?;
        let planned = object_statements(conn, &obj, document, seed_data)
            .await
            .with_context(|| format!("planning {} {}", T::KIND, obj.name()))?;
        tracing::debug!(name = %obj.name(), statements = planned.len(), "planned");
        statements.extend(planned);
    }
    Ok(statements)
}

async fn fixtures(
    conn: &dyn DriverConnection,
    dialect: Dialect,
    tables: Vec<Table>,
) -> anyhow::Result<Vec<String>> {
    let mut statements = Vec::new();
    for table in order_by_requires(tables)? {
        schema_for(&table, dialect)?;
        let spec = serde_json::to_value(&table.spec)?;
        let generated = conn
            .generate_fixtures(&table.spec.name, &spec)
            .await
            .with_context(|| format!("generating fixtures for {}", table.name()))?;
        statements.extend(generated);
    }
    Ok(statements)
}
