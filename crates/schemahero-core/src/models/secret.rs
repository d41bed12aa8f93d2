use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, Resource};

/// Annotation that ties a service-account token secret to its service account.
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Secret type carried by service-account token secrets.
pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";

/// Opaque key/value data referenced by `secretKeyRef` and the vault login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    /// Whether this is the token secret of the named service account.
    pub fn is_token_for(&self, service_account: &str) -> bool {
        self.type_.as_deref() == Some(SERVICE_ACCOUNT_TOKEN_TYPE)
            && self
                .metadata
                .annotations
                .get(SERVICE_ACCOUNT_NAME_ANNOTATION)
                .map(|sa| sa == service_account)
                .unwrap_or(false)
    }
}

impl Resource for Secret {
    const KIND: &'static str = "Secret";
    const API_VERSION: &'static str = "v1";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
