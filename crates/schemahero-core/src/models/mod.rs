pub mod connection;
pub mod data_migration;
pub mod database;
pub mod dialect;
pub mod meta;
pub mod migration;
pub mod object;
pub mod schema;
pub mod schema_objects;
pub mod secret;
pub mod table;
pub mod value;

pub use connection::{ConnectionVariant, DatabaseConnection};
pub use data_migration::DataMigration;
pub use database::Database;
pub use dialect::Dialect;
pub use meta::{ObjectMeta, ObjectRef, OwnerReference, Resource};
pub use migration::{Migration, MigrationSpec, MigrationState, Phase};
pub use object::{ObjectKind, SchemaObject};
pub use schema::DialectSchema;
pub use schema_objects::{DatabaseExtension, Function, ObjectSpec, View};
pub use secret::Secret;
pub use table::{SeedData, Table, TableSpec};
pub use value::{CredentialSource, ValueOrValueFrom};
