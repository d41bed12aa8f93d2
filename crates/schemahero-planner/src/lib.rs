pub mod batch;
pub mod order;
pub mod plan;

use std::sync::Arc;

use schemahero_auth::{assemble, redact_uri, Resolve};
use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{Database, Migration, Resource};
use schemahero_driver::{DatabaseDriver, DriverConnection};
use schemahero_store::Client;

pub use batch::BatchOutcome;
pub use order::{order_by_requires, Requires};
pub use plan::{check_dialect, object_statements, PlanOutcome, Plannable};

/// Turns declarative specs into `Migration` resources.
#[derive(Clone)]
pub struct Planner {
    client: Client,
    resolver: Arc<dyn Resolve>,
    driver: Arc<dyn DatabaseDriver>,
    deploy_seed_data: bool,
}

impl Planner {
    pub fn new(client: Client, resolver: Arc<dyn Resolve>, driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            client,
            resolver,
            driver,
            deploy_seed_data: false,
        }
    }

    /// Plan seed rows for every database, not only those that ask for it.
    pub fn with_deploy_seed_data(mut self, enabled: bool) -> Self {
        self.deploy_seed_data = enabled;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn resolver(&self) -> &dyn Resolve {
        self.resolver.as_ref()
    }

    fn seeds(&self, database: &Database) -> bool {
        self.deploy_seed_data || database.spec.deploy_seed_data
    }

    /// Resolve credentials and open a driver connection for `database`.
    pub async fn connect(&self, database: &Database) -> Result<Box<dyn DriverConnection>, SchemaHeroError> {
        let conn = assemble(self.resolver.as_ref(), database).await?;
        tracing::debug!(
            namespace = %database.namespace(),
            database = %database.name(),
            driver = %conn.dialect,
            uri = %redact_uri(&conn.uri),
            "connecting to database"
        );
        self.driver
            .connect(conn.dialect, &conn.uri, &conn.options)
            .await
    }

    /// The migration named `sha` in `namespace`, if any.
    pub async fn existing_migration(
        &self,
        namespace: &str,
        sha: &str,
    ) -> Result<Option<Migration>, SchemaHeroError> {
        self.client.get(namespace, sha).await
    }
}

async fn close(conn: Box<dyn DriverConnection>) {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "closing driver connection failed");
    }
}
