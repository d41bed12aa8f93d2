use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use schemahero_auth::{CredentialResolver, Resolve, Scope};
use schemahero_core::error::ErrorKind;
use schemahero_core::models::secret::{SERVICE_ACCOUNT_NAME_ANNOTATION, SERVICE_ACCOUNT_TOKEN_TYPE};
use schemahero_core::models::value::{SsmParameter, ValueFrom, Vault};
use schemahero_core::models::{Secret, ValueOrValueFrom};
use schemahero_store::{Client, MemoryStore};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn client_with_token() -> Client {
    let client = Client::new(Arc::new(MemoryStore::new()));
    let mut token = Secret::new("default", "schemahero-token-abc").with_data("token", "sa-jwt");
    token.type_ = Some(SERVICE_ACCOUNT_TOKEN_TYPE.into());
    token
        .metadata
        .annotations
        .insert(SERVICE_ACCOUNT_NAME_ANNOTATION.into(), "default".into());
    client.create(&token).await.unwrap();
    client
}

fn vault_app() -> Router {
    Router::new()
        .route(
            "/v1/auth/kubernetes/login",
            post(|Json(body): Json<Value>| async move {
                if body["role"] != "app" || body["jwt"] != "sa-jwt" {
                    return (StatusCode::FORBIDDEN, Json(json!({"errors": ["permission denied"]})));
                }
                (StatusCode::OK, Json(json!({"auth": {"client_token": "s.token"}})))
            }),
        )
        .route(
            "/v1/database/creds/app",
            get(|headers: HeaderMap| async move {
                if headers.get("x-vault-token").map(|v| v.as_bytes()) != Some(b"s.token".as_slice()) {
                    return (StatusCode::FORBIDDEN, Json(json!({"errors": ["bad token"]})));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "lease_duration": 3600,
                        "data": {"username": "v-app-xyz", "password": "A1b2"}
                    })),
                )
            }),
        )
        .route(
            "/v1/database/config/app",
            get(|| async {
                Json(json!({
                    "data": {
                        "connection_details": {
                            "connection_url": "postgres://{{username}}:{{password}}@db:5432/app"
                        }
                    }
                }))
            }),
        )
}

fn vault_value(endpoint: &str, role: &str) -> ValueOrValueFrom {
    ValueOrValueFrom::from_vault(Vault {
        secret: "database/creds/app".into(),
        role: role.into(),
        endpoint: Some(endpoint.into()),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_native_vault_login_and_template() {
    let endpoint = serve(vault_app()).await;
    let resolver = CredentialResolver::new(client_with_token().await).unwrap();

    let uri = resolver
        .resolve(&vault_value(&endpoint, "app"), Scope::new("default", "app"))
        .await
        .unwrap();
    assert_eq!(uri, "postgres://v-app-xyz:A1b2@db:5432/app");
}

#[tokio::test]
async fn test_vault_denied_login_is_retryable() {
    let endpoint = serve(vault_app()).await;
    let resolver = CredentialResolver::new(client_with_token().await).unwrap();

    let err = resolver
        .resolve(&vault_value(&endpoint, "wrong"), Scope::new("default", "app"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(err.to_string().contains("403"));
}

#[tokio::test]
async fn test_ssm_get_parameter_is_signed() {
    let app = Router::new().route(
        "/",
        post(|headers: HeaderMap, body: String| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let target = headers
                .get("x-amz-target")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if !auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDTEST/")
                || !auth.contains("/eu-west-1/ssm/aws4_request")
                || target != "AmazonSSM.GetParameter"
            {
                return (StatusCode::FORBIDDEN, Json(json!({"message": "bad signature"})));
            }
            let request: Value = serde_json::from_str(&body).unwrap_or_default();
            if request["Name"] != "/app/db-uri" || request["WithDecryption"] != true {
                return (StatusCode::BAD_REQUEST, Json(json!({"message": "bad request"})));
            }
            (
                StatusCode::OK,
                Json(json!({"Parameter": {"Name": "/app/db-uri", "Value": "postgres://ssm@db/app"}})),
            )
        }),
    );
    let endpoint = serve(app).await;

    let resolver = CredentialResolver::new(Client::new(Arc::new(MemoryStore::new())))
        .unwrap()
        .with_ssm_endpoint(endpoint);
    let value = ValueOrValueFrom {
        value: None,
        value_from: Some(ValueFrom {
            ssm: Some(SsmParameter {
                name: "/app/db-uri".into(),
                region: Some("eu-west-1".into()),
                with_decryption: true,
                access_key_id: Some(Box::new(ValueOrValueFrom::literal("AKIDTEST"))),
                secret_access_key: Some(Box::new(ValueOrValueFrom::literal("shh"))),
            }),
            ..Default::default()
        }),
    };

    let uri = resolver
        .resolve(&value, Scope::new("default", "app"))
        .await
        .unwrap();
    assert_eq!(uri, "postgres://ssm@db/app");
}
