use clap::{Args, Subcommand};

use schemahero_core::models::Resource;
use schemahero_core::spec_file::DEFAULT_NAMESPACE;

use super::context::Context;

#[derive(Subcommand)]
pub enum Target {
    /// A migration by name
    Migration(MigrationRef),
}

#[derive(Args)]
pub struct MigrationRef {
    /// Migration name (spec SHA or batch-<sha>)
    pub name: String,

    #[arg(short, long, env = "SCHEMAHERO_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Look the migration up in every namespace
    #[arg(short = 'A', long, env = "SCHEMAHERO_ALL_NAMESPACES")]
    pub all_namespaces: bool,
}

impl MigrationRef {
    pub fn scope(&self) -> Option<&str> {
        if self.all_namespaces {
            None
        } else {
            Some(&self.namespace)
        }
    }
}

fn migration_ref(target: Target) -> MigrationRef {
    match target {
        Target::Migration(args) => args,
    }
}

pub async fn approve(target: Target) -> anyhow::Result<()> {
    let args = migration_ref(target);
    let engine = Context::load()?.engine()?;
    let migration = engine.approve(args.scope(), &args.name).await?;
    println!("Migration {}/{} approved", migration.namespace(), migration.name());
    Ok(())
}

pub async fn reject(target: Target) -> anyhow::Result<()> {
    let args = migration_ref(target);
    let engine = Context::load()?.engine()?;
    let migration = engine.reject(args.scope(), &args.name).await?;
    println!("Migration {}/{} rejected", migration.namespace(), migration.name());
    Ok(())
}

pub async fn recalculate(target: Target) -> anyhow::Result<()> {
    let args = migration_ref(target);
    let engine = Context::load()?.engine()?;
    let cleared = engine.recalculate(args.scope(), &args.name).await?;
    println!("Migration {} deleted", args.name);
    for object in cleared {
        println!("  {object} will be planned again");
    }
    Ok(())
}
