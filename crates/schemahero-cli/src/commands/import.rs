use std::path::PathBuf;

use clap::Args;

use schemahero_core::models::ObjectKind;
use schemahero_core::spec_file::{load_path, Document};
use schemahero_store::Client;

use super::context::Context;

#[derive(Args)]
pub struct ImportArgs {
    /// Resource file or directory of resource files
    #[arg(short, long, env = "SCHEMAHERO_FILE")]
    pub file: PathBuf,

    /// Kind given to bare specs
    #[arg(long, env = "SCHEMAHERO_SPEC_TYPE", default_value = "table")]
    pub spec_type: ObjectKind,
}

pub async fn run(args: ImportArgs) -> anyhow::Result<()> {
    let (documents, errors) = load_path(&args.file, args.spec_type)?;
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{}: {}", e.path.display(), e.error);
        }
        anyhow::bail!("{} document(s) could not be read; nothing imported", errors.len());
    }

    let ctx = Context::load()?;
    let documents: Vec<Document> = documents.into_iter().map(|d| d.document).collect();
    let imported = import_documents(&ctx.client, &documents).await?;
    println!("Imported {imported} resource(s)");
    Ok(())
}

/// Validate every document, then create or update each one in the store.
pub async fn import_documents(client: &Client, documents: &[Document]) -> anyhow::Result<usize> {
    for document in documents {
        document.validate(None)?;
    }
    for document in documents {
        match document {
            Document::Database(r) => {
                client.upsert(r).await?;
            }
            Document::Table(r) => {
                client.upsert(r).await?;
            }
            Document::View(r) => {
                client.upsert(r).await?;
            }
            Document::Function(r) => {
                client.upsert(r).await?;
            }
            Document::DatabaseExtension(r) => {
                client.upsert(r).await?;
            }
            Document::Migration(r) => {
                client.upsert(r).await?;
            }
            Document::DataMigration(r) => {
                client.upsert(r).await?;
            }
            Document::Secret(r) => {
                client.upsert(r).await?;
            }
        }
        tracing::info!(kind = document.kind(), name = %document.name(), "imported");
    }
    Ok(documents.len())
}
