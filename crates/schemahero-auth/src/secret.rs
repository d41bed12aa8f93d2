use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::Secret;
use schemahero_store::Client;

/// `data[key]` of the named secret.
pub async fn read_key(
    client: &Client,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<String, SchemaHeroError> {
    let secret: Secret = client.get(namespace, name).await?.ok_or_else(|| {
        SchemaHeroError::resolution(format!("secret {namespace}/{name} not found"))
    })?;
    secret.data.get(key).cloned().ok_or_else(|| {
        SchemaHeroError::resolution(format!("secret {namespace}/{name} has no key {key}"))
    })
}

/// The token of a service account, taken from its token secret.
pub async fn service_account_token(
    client: &Client,
    namespace: &str,
    service_account: &str,
) -> Result<String, SchemaHeroError> {
    let secrets: Vec<Secret> = client.list(Some(namespace)).await?;
    secrets
        .iter()
        .filter(|s| s.is_token_for(service_account))
        .find_map(|s| s.data.get("token").cloned())
        .ok_or_else(|| {
            SchemaHeroError::resolution(format!(
                "no token secret for service account {namespace}/{service_account}"
            ))
        })
}
