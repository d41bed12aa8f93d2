//! Vault database secrets engine: native login and agent-injection templates.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::value::Vault;
use schemahero_core::models::Dialect;

pub const DEFAULT_AUTH_PATH: &str = "/v1/auth/kubernetes/login";

/// Name of the agent-rendered secret file, under `/vault/secrets/`.
pub const AGENT_SECRET_NAME: &str = "schemaherouri";

const CREDS_PREFIX: &str = "database/creds/";

pub struct VaultClient<'a> {
    http: &'a reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCreds {
    pub username: String,
    pub password: String,
    pub lease_duration: u64,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Deserialize)]
struct CredsResponse {
    data: CredsData,
    #[serde(default)]
    lease_duration: u64,
}

#[derive(Deserialize)]
struct CredsData {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct ConfigResponse {
    data: ConfigData,
}

#[derive(Deserialize)]
struct ConfigData {
    connection_details: ConnectionDetails,
}

#[derive(Deserialize)]
struct ConnectionDetails {
    connection_url: String,
}

impl<'a> VaultClient<'a> {
    pub fn new(http: &'a reqwest::Client, endpoint: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    async fn read<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, SchemaHeroError> {
        let resp = resp.map_err(|e| SchemaHeroError::Vault {
            path: path.to_string(),
            status: 0,
            message: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(SchemaHeroError::Vault {
                path: path.to_string(),
                status,
                message: body,
            });
        }
        resp.json().await.map_err(|e| SchemaHeroError::Vault {
            path: path.to_string(),
            status,
            message: format!("JSON parse error: {e}"),
        })
    }

    /// Exchange a service-account JWT for a client token.
    pub async fn login(&self, auth_path: &str, role: &str, jwt: &str) -> Result<String, SchemaHeroError> {
        let resp = self
            .http
            .post(self.url(auth_path))
            .json(&json!({"role": role, "jwt": jwt}))
            .send()
            .await;
        let login: LoginResponse = self.read(auth_path, resp).await?;
        Ok(login.auth.client_token)
    }

    /// Issue credentials for a database role. `secret` may carry the `database/creds/` prefix.
    pub async fn database_creds(&self, token: &str, secret: &str) -> Result<DatabaseCreds, SchemaHeroError> {
        let role = secret.strip_prefix(CREDS_PREFIX).unwrap_or(secret);
        let path = format!("/v1/{CREDS_PREFIX}{role}");
        let resp = self
            .http
            .get(self.url(&path))
            .header("X-Vault-Token", token)
            .send()
            .await;
        let creds: CredsResponse = self.read(&path, resp).await?;
        Ok(DatabaseCreds {
            username: creds.data.username,
            password: creds.data.password,
            lease_duration: creds.lease_duration,
        })
    }

    /// The connection URL template stored with the database config.
    pub async fn connection_url(&self, token: &str, database: &str) -> Result<String, SchemaHeroError> {
        let path = format!("/v1/database/config/{database}");
        let resp = self
            .http
            .get(self.url(&path))
            .header("X-Vault-Token", token)
            .send()
            .await;
        let config: ConfigResponse = self.read(&path, resp).await?;
        Ok(config.data.connection_details.connection_url)
    }
}

/// Substitute `{{ .username }}` and `{{ .password }}` (spacing and the dot are optional).
pub fn render_template(template: &str, username: &str, password: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let end = start + len + 2;
        let field = rest[start + 2..start + len].trim().trim_start_matches('.');
        match field {
            "username" => out.push_str(username),
            "password" => out.push_str(password),
            _ => out.push_str(&rest[start..end]),
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Template the vault agent renders into the connection URI file.
pub fn agent_template(vault: &Vault, dialect: Dialect, database: &str) -> Result<String, SchemaHeroError> {
    let body = match vault.connection_template.as_deref().filter(|t| !t.is_empty()) {
        Some(template) => template.to_string(),
        None => match dialect {
            Dialect::Postgres | Dialect::Timescaledb => format!(
                "postgres://{{{{ .Data.username }}}}:{{{{ .Data.password }}}}@postgres:5432/{database}"
            ),
            Dialect::Cockroachdb => format!(
                "postgres://{{{{ .Data.username }}}}:{{{{ .Data.password }}}}@cockroachdb:26257/{database}"
            ),
            Dialect::Mysql => format!(
                "{{{{ .Data.username }}}}:{{{{ .Data.password }}}}@tcp(mysql:3306)/{database}"
            ),
            other => {
                return Err(SchemaHeroError::Config {
                    message: format!("no default vault connection template for {other}"),
                })
            }
        },
    };
    Ok(format!(
        "\n{{{{- with secret \"{}\" -}}}}\n{body}{{{{- end }}}}",
        vault.secret
    ))
}

/// Pod annotations that make the vault agent render the connection URI.
pub fn agent_annotations(
    vault: &Vault,
    dialect: Dialect,
    database: &str,
) -> Result<BTreeMap<String, String>, SchemaHeroError> {
    let mut annotations = BTreeMap::new();
    annotations.insert("vault.hashicorp.com/agent-inject".to_string(), "true".to_string());
    annotations.insert("vault.hashicorp.com/role".to_string(), vault.role.clone());
    annotations.insert(
        format!("vault.hashicorp.com/agent-inject-secret-{AGENT_SECRET_NAME}"),
        vault.secret.clone(),
    );
    annotations.insert(
        format!("vault.hashicorp.com/agent-inject-template-{AGENT_SECRET_NAME}"),
        agent_template(vault, dialect, database)?,
    );
    Ok(annotations)
}
