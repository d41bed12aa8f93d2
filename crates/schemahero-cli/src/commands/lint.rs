use std::path::PathBuf;

use clap::Args;

use schemahero_core::models::{Dialect, ObjectKind};
use schemahero_core::spec_file::load_path;

#[derive(Args)]
pub struct LintArgs {
    /// Dialect every schema must target
    #[arg(long, env = "SCHEMAHERO_DRIVER")]
    pub driver: Option<Dialect>,

    /// Spec file or directory of spec files
    #[arg(long, env = "SCHEMAHERO_SPEC_FILE")]
    pub spec_file: PathBuf,

    /// Kind given to bare specs
    #[arg(long, env = "SCHEMAHERO_SPEC_TYPE", default_value = "table")]
    pub spec_type: ObjectKind,
}

/// Problems found below `args.spec_file`, one line each.
pub fn problems(args: &LintArgs) -> anyhow::Result<Vec<String>> {
    let (documents, errors) = load_path(&args.spec_file, args.spec_type)?;
    let mut problems: Vec<String> = errors
        .iter()
        .map(|e| format!("{}: {}", e.path.display(), e.error))
        .collect();
    for loaded in &documents {
        if let Err(e) = loaded.document.validate(args.driver) {
            problems.push(format!("{}: {e}", loaded.path.display()));
        }
    }
    tracing::debug!(documents = documents.len(), problems = problems.len(), "linted");
    Ok(problems)
}

pub fn run(args: LintArgs) -> anyhow::Result<()> {
    let problems = problems(&args)?;
    if problems.is_empty() {
        println!("{}: ok", args.spec_file.display());
        return Ok(());
    }
    for problem in &problems {
        eprintln!("{problem}");
    }
    anyhow::bail!("{} invalid spec(s)", problems.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lint_reports_wrong_dialect() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("users.yaml"),
            "database: app\nname: users\nschema:\n  mysql:\n    columns: []\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("orders.yaml"),
            "database: app\nname: orders\nschema:\n  postgres:\n    columns: []\n",
        )
        .unwrap();

        let args = LintArgs {
            driver: Some(Dialect::Postgres),
            spec_file: dir.path().to_path_buf(),
            spec_type: ObjectKind::Table,
        };
        let problems = problems(&args).unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("users.yaml"));
    }
}
