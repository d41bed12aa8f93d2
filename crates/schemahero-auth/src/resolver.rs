use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::value::{SsmParameter, Vault};
use schemahero_core::models::{CredentialSource, ValueOrValueFrom};
use schemahero_store::Client;

use crate::secret;
use crate::ssm::{SsmClient, SsmCredentials};
use crate::vault::{self, VaultClient};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a value is being resolved: the enclosing resource's namespace and database.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub namespace: &'a str,
    pub database: &'a str,
}

impl<'a> Scope<'a> {
    pub fn new(namespace: &'a str, database: &'a str) -> Self {
        Self {
            namespace,
            database,
        }
    }
}

/// Turns a value-or-reference into its concrete string.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(
        &self,
        value: &ValueOrValueFrom,
        scope: Scope<'_>,
    ) -> Result<String, SchemaHeroError>;
}

/// Resolves literals, secrets, vault credentials and parameter-store values.
pub struct CredentialResolver {
    client: Client,
    http: reqwest::Client,
    vault_agent_uri_path: PathBuf,
    ssm_endpoint: Option<String>,
}

impl CredentialResolver {
    pub fn new(client: Client) -> Result<Self, SchemaHeroError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("schemahero/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SchemaHeroError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            http,
            vault_agent_uri_path: PathBuf::from("/vault/secrets/schemaherouri"),
            ssm_endpoint: None,
        })
    }

    /// File the vault agent renders the connection URI into.
    pub fn with_vault_agent_uri_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vault_agent_uri_path = path.into();
        self
    }

    /// Send parameter-store calls here instead of the regional endpoint.
    pub fn with_ssm_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ssm_endpoint = Some(endpoint.into());
        self
    }

    pub fn vault_agent_uri_path(&self) -> &Path {
        &self.vault_agent_uri_path
    }

    async fn resolve_vault(&self, v: &Vault, scope: Scope<'_>) -> Result<String, SchemaHeroError> {
        if v.agent_inject {
            tracing::debug!(path = %self.vault_agent_uri_path.display(), "reading vault agent rendered uri");
            let uri = tokio::fs::read_to_string(&self.vault_agent_uri_path)
                .await
                .map_err(|e| {
                    SchemaHeroError::resolution(format!(
                        "read vault agent uri {}: {e}",
                        self.vault_agent_uri_path.display()
                    ))
                })?;
            return Ok(uri.trim().to_string());
        }

        let endpoint = v
            .endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| SchemaHeroError::resolution("vault endpoint is required"))?;
        let service_account = v.service_account.as_deref().unwrap_or("default");
        let sa_namespace = v
            .service_account_namespace
            .as_deref()
            .unwrap_or(scope.namespace);
        let jwt = secret::service_account_token(&self.client, sa_namespace, service_account).await?;

        let vault = VaultClient::new(&self.http, endpoint);
        let auth_path = v
            .kubernetes_auth_endpoint
            .as_deref()
            .unwrap_or(vault::DEFAULT_AUTH_PATH);
        let token = vault.login(auth_path, &v.role, &jwt).await?;
        let creds = vault.database_creds(&token, &v.secret).await?;
        tracing::debug!(role = %v.role, lease_duration = creds.lease_duration, "issued vault database credentials");

        let template = match v.connection_template.as_deref().filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => vault.connection_url(&token, scope.database).await?,
        };
        Ok(vault::render_template(&template, &creds.username, &creds.password))
    }

    async fn resolve_ssm(&self, p: &SsmParameter, scope: Scope<'_>) -> Result<String, SchemaHeroError> {
        let access_key_id = match &p.access_key_id {
            Some(v) => Some(self.resolve(v, scope).await?),
            None => std::env::var("AWS_ACCESS_KEY_ID").ok(),
        };
        let secret_access_key = match &p.secret_access_key {
            Some(v) => Some(self.resolve(v, scope).await?),
            None => std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
        };
        let (Some(access_key_id), Some(secret_access_key)) = (access_key_id, secret_access_key)
        else {
            return Err(SchemaHeroError::resolution(
                "ssm access key id and secret access key are required",
            ));
        };
        let credentials = SsmCredentials {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        };

        let region = p
            .region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .unwrap_or_else(|| "us-east-1".to_string());
        let ssm = SsmClient::new(&self.http, &region, self.ssm_endpoint.as_deref());
        ssm.get_parameter(&credentials, &p.name, p.with_decryption).await
    }
}

#[async_trait]
impl Resolve for CredentialResolver {
    async fn resolve(
        &self,
        value: &ValueOrValueFrom,
        scope: Scope<'_>,
    ) -> Result<String, SchemaHeroError> {
        match value.source().map_err(SchemaHeroError::resolution)? {
            CredentialSource::Empty => Ok(String::new()),
            CredentialSource::Literal(v) => Ok(v.to_string()),
            CredentialSource::Secret(r) => {
                secret::read_key(&self.client, scope.namespace, &r.name, &r.key).await
            }
            CredentialSource::Vault(v) => self.resolve_vault(v, scope).await,
            CredentialSource::Ssm(p) => self.resolve_ssm(p, scope).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use schemahero_core::models::Secret;
    use schemahero_store::MemoryStore;

    fn client() -> Client {
        Client::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_literal_and_empty() {
        let resolver = CredentialResolver::new(client()).unwrap();
        let scope = Scope::new("default", "app");
        assert_eq!(
            resolver
                .resolve(&ValueOrValueFrom::literal("h"), scope)
                .await
                .unwrap(),
            "h"
        );
        assert_eq!(
            resolver
                .resolve(&ValueOrValueFrom::default(), scope)
                .await
                .unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_secret_key_ref() {
        let client = client();
        client
            .create(&Secret::new("default", "db").with_data("uri", "postgres://a"))
            .await
            .unwrap();
        let resolver = CredentialResolver::new(client).unwrap();

        let uri = resolver
            .resolve(&ValueOrValueFrom::from_secret("db", "uri"), Scope::new("default", "app"))
            .await
            .unwrap();
        assert_eq!(uri, "postgres://a");

        let err = resolver
            .resolve(&ValueOrValueFrom::from_secret("db", "missing"), Scope::new("default", "app"))
            .await
            .unwrap_err();
        assert!(err.kind().is_retryable());

        // Secrets are read from the resource's own namespace.
        assert!(resolver
            .resolve(&ValueOrValueFrom::from_secret("db", "uri"), Scope::new("other", "app"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_vault_agent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemaherouri");
        std::fs::write(&path, "postgres://agent@db/app\n").unwrap();
        let resolver = CredentialResolver::new(client())
            .unwrap()
            .with_vault_agent_uri_path(&path);

        let value = ValueOrValueFrom::from_vault(Vault {
            secret: "database/creds/app".into(),
            role: "app".into(),
            agent_inject: true,
            ..Default::default()
        });
        let uri = resolver.resolve(&value, Scope::new("default", "app")).await.unwrap();
        assert_eq!(uri, "postgres://agent@db/app");
    }

    #[tokio::test]
    async fn test_vault_without_endpoint_is_resolution_error() {
        let resolver = CredentialResolver::new(client()).unwrap();
        let value = ValueOrValueFrom::from_vault(Vault {
            secret: "app".into(),
            role: "app".into(),
            ..Default::default()
        });
        let err = resolver
            .resolve(&value, Scope::new("default", "app"))
            .await
            .unwrap_err();
        assert_eq!(
            err.kind(),
            schemahero_core::error::ErrorKind::Resolution
        );
    }
}
