use schemahero_core::models::{Migration, Resource};

use super::context::{format_timestamp, Context};
use super::migration::Target;

pub async fn run(target: Target) -> anyhow::Result<()> {
    let Target::Migration(args) = target;
    let engine = Context::load()?.engine()?;
    let migration = engine.find(args.scope(), &args.name).await?;
    print!("{}", render(&migration));
    Ok(())
}

/// Human-readable summary of a migration followed by its DDL.
pub fn render(m: &Migration) -> String {
    let mut out = String::new();
    out.push_str(&format!("Migration {}/{}\n", m.namespace(), m.name()));
    out.push_str(&format!("  Database:  {}\n", m.spec.database_name));
    if m.is_batch() {
        let tables: Vec<String> = m.table_refs().iter().map(ToString::to_string).collect();
        out.push_str(&format!("  Tables:    {}\n", tables.join(", ")));
    } else if m.spec.table_name.is_empty() {
        for owner in &m.metadata.owner_references {
            out.push_str(&format!("  {:<10} {}/{}\n", format!("{}:", owner.kind), m.namespace(), owner.name));
        }
    } else {
        out.push_str(&format!(
            "  Table:     {}/{}\n",
            m.spec.table_namespace, m.spec.table_name
        ));
    }
    out.push_str(&format!("  State:     {}\n", m.state()));
    out.push_str(&format!("  Planned:   {}\n", format_timestamp(m.status.planned_at)));
    out.push_str(&format!("  Approved:  {}\n", format_timestamp(m.status.approved_at)));
    out.push_str(&format!("  Rejected:  {}\n", format_timestamp(m.status.rejected_at)));
    out.push_str(&format!("  Executed:  {}\n", format_timestamp(m.status.executed_at)));
    if let Some(error) = &m.status.last_error {
        out.push_str(&format!("  Error:     {error}\n"));
    }
    out.push_str("\nGenerated DDL:\n");
    for statement in m.statements() {
        out.push_str(&format!("  {statement};\n"));
    }
    out
}
