use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::SchemaHeroError;
use crate::models::meta::{DATABASES_API_VERSION, SCHEMAS_API_VERSION};
use crate::models::{
    DataMigration, Database, DatabaseExtension, Dialect, Function, Migration, ObjectKind,
    ObjectMeta, ObjectSpec, Resource, Secret, Table, TableSpec, View,
};

/// Versions served without conversion.
pub const SERVED_API_VERSIONS: &[&str] = &[SCHEMAS_API_VERSION, DATABASES_API_VERSION];

const SPEC_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Namespace given to documents that do not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A parsed resource document.
#[derive(Debug, Clone)]
pub enum Document {
    Database(Database),
    Table(Table),
    View(View),
    Function(Function),
    DatabaseExtension(DatabaseExtension),
    Migration(Migration),
    DataMigration(DataMigration),
    Secret(Secret),
}

impl Document {
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Database(_) => Database::KIND,
            Document::Table(_) => Table::KIND,
            Document::View(_) => View::KIND,
            Document::Function(_) => Function::KIND,
            Document::DatabaseExtension(_) => DatabaseExtension::KIND,
            Document::Migration(_) => Migration::KIND,
            Document::DataMigration(_) => DataMigration::KIND,
            Document::Secret(_) => Secret::KIND,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Document::Database(r) => r.metadata(),
            Document::Table(r) => r.metadata(),
            Document::View(r) => r.metadata(),
            Document::Function(r) => r.metadata(),
            Document::DatabaseExtension(r) => r.metadata(),
            Document::Migration(r) => r.metadata(),
            Document::DataMigration(r) => r.metadata(),
            Document::Secret(r) => r.metadata(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Structural checks shared by `lint` and `import`.
    ///
    /// With `dialect` set, schema objects must carry a schema for that dialect.
    pub fn validate(&self, dialect: Option<Dialect>) -> Result<(), SchemaHeroError> {
        let kind = self.kind();
        let name = self.name();
        if name.is_empty() {
            return Err(SchemaHeroError::invalid_spec(kind, name, "metadata.name is required"));
        }
        let check_schema =
            |sql_name: &str, schema: &crate::models::DialectSchema| -> Result<(), SchemaHeroError> {
                if sql_name.is_empty() {
                    return Err(SchemaHeroError::invalid_spec(kind, name, "spec.name is required"));
                }
                let found = schema
                    .dialect()
                    .map_err(|e| SchemaHeroError::invalid_spec(kind, name, e))?;
                match dialect {
                    Some(expected) if expected != found => Err(SchemaHeroError::invalid_spec(
                        kind,
                        name,
                        format!("schema is for {found}, expected {expected}"),
                    )),
                    _ => Ok(()),
                }
            };
        match self {
            Document::Database(db) => {
                db.spec
                    .connection
                    .variant()
                    .map_err(|e| SchemaHeroError::invalid_spec(kind, name, e))?;
                db.batch_window()?;
                Ok(())
            }
            Document::Table(t) => check_schema(&t.spec.name, &t.spec.schema),
            Document::View(o) => check_schema(&o.spec.name, &o.spec.schema),
            Document::Function(o) => check_schema(&o.spec.name, &o.spec.schema),
            Document::DatabaseExtension(o) => check_schema(&o.spec.name, &o.spec.schema),
            Document::Migration(m) => {
                if m.spec.database_name.is_empty() {
                    return Err(SchemaHeroError::invalid_spec(
                        kind,
                        name,
                        "spec.databaseName is required",
                    ));
                }
                Ok(())
            }
            Document::DataMigration(_) | Document::Secret(_) => Ok(()),
        }
    }
}

/// Spec files under `path`: the file itself, or every yaml/json file below a directory.
pub fn collect_spec_files(path: &Path) -> Result<Vec<PathBuf>, SchemaHeroError> {
    if !path.exists() {
        return Err(SchemaHeroError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| SPEC_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    Ok(files)
}

/// Every non-empty document of a (possibly multi-document) YAML or JSON text.
pub fn parse_documents(content: &str) -> Result<Vec<Value>, SchemaHeroError> {
    let mut docs = Vec::new();
    for de in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(de)?;
        if !value.is_null() {
            docs.push(value);
        }
    }
    Ok(docs)
}

/// Reject documents of a version this build cannot serve.
///
/// Older resource versions would be converted here; none are supported yet.
pub fn convert_document(doc: Value) -> Result<Value, SchemaHeroError> {
    let Some(api_version) = doc.get("apiVersion").and_then(Value::as_str) else {
        return Ok(doc);
    };
    if SERVED_API_VERSIONS.contains(&api_version) {
        return Ok(doc);
    }
    let kind = doc.get("kind").and_then(Value::as_str).unwrap_or("document");
    let name = doc
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("");
    Err(SchemaHeroError::invalid_spec(
        kind,
        name,
        format!("apiVersion {api_version} is not supported, expected one of {SERVED_API_VERSIONS:?}"),
    ))
}

fn is_full_resource(doc: &Value) -> bool {
    doc.get("kind").is_some() || doc.get("apiVersion").is_some()
}

/// Turn one document into a typed resource.
///
/// A document without `kind` is a bare spec of `bare_kind`, named after its `name` field.
pub fn document_from_value(doc: Value, bare_kind: ObjectKind) -> Result<Document, SchemaHeroError> {
    let doc = convert_document(doc)?;
    if !is_full_resource(&doc) {
        return bare_document(doc, bare_kind);
    }

    let kind = doc
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaHeroError::invalid_spec("document", "", "kind is required"))?
        .to_string();
    let mut document = match kind.as_str() {
        "Database" => Document::Database(serde_json::from_value(doc)?),
        "Table" => Document::Table(serde_json::from_value(doc)?),
        "View" => Document::View(serde_json::from_value(doc)?),
        "Function" => Document::Function(serde_json::from_value(doc)?),
        "DatabaseExtension" => Document::DatabaseExtension(serde_json::from_value(doc)?),
        "Migration" => Document::Migration(serde_json::from_value(doc)?),
        "DataMigration" => Document::DataMigration(serde_json::from_value(doc)?),
        "Secret" => Document::Secret(serde_json::from_value(doc)?),
        other => {
            return Err(SchemaHeroError::invalid_spec(other, "", "unknown kind"));
        }
    };
    default_namespace(&mut document);
    Ok(document)
}

fn bare_document(doc: Value, kind: ObjectKind) -> Result<Document, SchemaHeroError> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(match kind {
        ObjectKind::Table => {
            let spec: TableSpec = serde_json::from_value(doc)?;
            Document::Table(Table::new(DEFAULT_NAMESPACE, &name, spec))
        }
        ObjectKind::View => {
            let spec: ObjectSpec = serde_json::from_value(doc)?;
            Document::View(View::new(DEFAULT_NAMESPACE, &name, spec))
        }
        ObjectKind::Function => {
            let spec: ObjectSpec = serde_json::from_value(doc)?;
            Document::Function(Function::new(DEFAULT_NAMESPACE, &name, spec))
        }
        ObjectKind::Extension => {
            let spec: ObjectSpec = serde_json::from_value(doc)?;
            Document::DatabaseExtension(DatabaseExtension::new(DEFAULT_NAMESPACE, &name, spec))
        }
    })
}

fn default_namespace(document: &mut Document) {
    let meta = match document {
        Document::Database(r) => r.metadata_mut(),
        Document::Table(r) => r.metadata_mut(),
        Document::View(r) => r.metadata_mut(),
        Document::Function(r) => r.metadata_mut(),
        Document::DatabaseExtension(r) => r.metadata_mut(),
        Document::Migration(r) => r.metadata_mut(),
        Document::DataMigration(r) => r.metadata_mut(),
        Document::Secret(r) => r.metadata_mut(),
    };
    if meta.namespace.is_empty() {
        meta.namespace = DEFAULT_NAMESPACE.to_string();
    }
}

/// A document together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub document: Document,
}

/// A document that failed to parse or convert.
#[derive(Debug)]
pub struct DocumentError {
    pub path: PathBuf,
    pub error: SchemaHeroError,
}

/// Load every document below `path`. Parse failures are collected, not fatal.
pub fn load_path(
    path: &Path,
    bare_kind: ObjectKind,
) -> Result<(Vec<LoadedDocument>, Vec<DocumentError>), SchemaHeroError> {
    let mut loaded = Vec::new();
    let mut errors = Vec::new();

    for file in collect_spec_files(path)? {
        tracing::debug!(path = %file.display(), "reading spec file");
        let content = std::fs::read_to_string(&file)?;
        let docs = match parse_documents(&content) {
            Ok(docs) => docs,
            Err(error) => {
                errors.push(DocumentError { path: file, error });
                continue;
            }
        };
        for doc in docs {
            match document_from_value(doc, bare_kind) {
                Ok(document) => loaded.push(LoadedDocument {
                    path: file.clone(),
                    document,
                }),
                Err(error) => errors.push(DocumentError {
                    path: file.clone(),
                    error,
                }),
            }
        }
    }

    Ok((loaded, errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_YAML: &str = r#"
apiVersion: schemas.schemahero.io/v1alpha4
kind: Table
metadata:
  name: users
spec:
  database: app
  name: users
  schema:
    postgres:
      primaryKey: [id]
      columns:
        - name: id
          type: integer
---
apiVersion: databases.schemahero.io/v1alpha4
kind: Database
metadata:
  name: app
  namespace: prod
spec:
  batchWindow: 2s
  connection:
    postgres:
      uri:
        value: postgres://localhost/app
"#;

    #[test]
    fn test_multi_document_yaml() {
        let docs = parse_documents(TABLE_YAML).unwrap();
        assert_eq!(docs.len(), 2);

        let table = document_from_value(docs[0].clone(), ObjectKind::Table).unwrap();
        assert_eq!(table.kind(), "Table");
        assert_eq!(table.metadata().namespace, "default");
        table.validate(Some(Dialect::Postgres)).unwrap();
        assert!(table.validate(Some(Dialect::Mysql)).is_err());

        let db = document_from_value(docs[1].clone(), ObjectKind::Table).unwrap();
        match db {
            Document::Database(db) => {
                assert_eq!(db.metadata.namespace, "prod");
                assert_eq!(db.batch_window().unwrap(), Some(std::time::Duration::from_secs(2)));
            }
            other => panic!("expected database, got {}", other.kind()),
        }
    }

    #[test]
    fn test_bare_spec() {
        let docs = parse_documents("name: active\nschema:\n  postgres:\n    query: select 1\n").unwrap();
        let doc = document_from_value(docs[0].clone(), ObjectKind::View).unwrap();
        assert_eq!(doc.kind(), "View");
        assert_eq!(doc.name(), "active");
        doc.validate(None).unwrap();
    }

    #[test]
    fn test_json_is_accepted() {
        let docs = parse_documents(r#"{"name": "t", "schema": {"sqlite": {"columns": []}}}"#).unwrap();
        let doc = document_from_value(docs[0].clone(), ObjectKind::Table).unwrap();
        doc.validate(Some(Dialect::Sqlite)).unwrap();
    }

    #[test]
    fn test_old_api_version_rejected() {
        let doc = serde_json::json!({
            "apiVersion": "schemas.schemahero.io/v1alpha3",
            "kind": "Table",
            "metadata": {"name": "users"},
            "spec": {"name": "users", "schema": {}}
        });
        let err = document_from_value(doc, ObjectKind::Table).unwrap_err();
        assert!(err.to_string().contains("v1alpha3"));
    }

    #[test]
    fn test_two_dialects_fail_validation() {
        let docs = parse_documents(
            "name: t\nschema:\n  postgres: {}\n  mysql: {}\n",
        )
        .unwrap();
        let doc = document_from_value(docs[0].clone(), ObjectKind::Table).unwrap();
        assert!(doc.validate(None).is_err());
    }

    #[test]
    fn test_load_directory_collects_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), TABLE_YAML).unwrap();
        std::fs::write(dir.path().join("b.yml"), "kind: Gadget\nmetadata:\n  name: x\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (loaded, errors) = load_path(dir.path(), ObjectKind::Table).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].path.ends_with("b.yml"));
    }

    #[test]
    fn test_missing_path() {
        let err = collect_spec_files(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, SchemaHeroError::PathNotFound { .. }));
    }
}
