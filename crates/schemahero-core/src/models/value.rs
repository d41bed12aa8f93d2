use serde::{Deserialize, Serialize};

/// A field that is either a literal string or a reference to where the string lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueOrValueFrom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueFrom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<Vault>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssm: Option<SsmParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    /// Name of the vault database role the credentials are issued for.
    pub secret: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_namespace: Option<String>,
    /// Login path, defaults to `/v1/auth/kubernetes/login`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_auth_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_template: Option<String>,
    #[serde(default)]
    pub agent_inject: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsmParameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub with_decryption: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<Box<ValueOrValueFrom>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<Box<ValueOrValueFrom>>,
}

/// The single place a [`ValueOrValueFrom`] takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource<'a> {
    Empty,
    Literal(&'a str),
    Secret(&'a SecretKeyRef),
    Vault(&'a Vault),
    Ssm(&'a SsmParameter),
}

impl ValueOrValueFrom {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            value_from: None,
        }
    }

    pub fn from_secret(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            value: None,
            value_from: Some(ValueFrom {
                secret_key_ref: Some(SecretKeyRef {
                    name: name.into(),
                    key: key.into(),
                }),
                ..Default::default()
            }),
        }
    }

    pub fn from_vault(vault: Vault) -> Self {
        Self {
            value: None,
            value_from: Some(ValueFrom {
                vault: Some(vault),
                ..Default::default()
            }),
        }
    }

    /// Determine which branch is set. More than one branch is an error.
    pub fn source(&self) -> Result<CredentialSource<'_>, String> {
        let mut found = Vec::new();
        if let Some(v) = self.value.as_deref().filter(|v| !v.is_empty()) {
            found.push(CredentialSource::Literal(v));
        }
        if let Some(from) = &self.value_from {
            if let Some(s) = &from.secret_key_ref {
                found.push(CredentialSource::Secret(s));
            }
            if let Some(v) = &from.vault {
                found.push(CredentialSource::Vault(v));
            }
            if let Some(p) = &from.ssm {
                found.push(CredentialSource::Ssm(p));
            }
        }
        match found.len() {
            0 => Ok(CredentialSource::Empty),
            1 => Ok(found[0]),
            n => Err(format!("expected one of value or valueFrom, found {n}")),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.source(), Ok(CredentialSource::Empty))
    }

    pub fn vault(&self) -> Option<&Vault> {
        self.value_from.as_ref().and_then(|f| f.vault.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_discriminant() {
        assert_eq!(
            ValueOrValueFrom::literal("x").source().unwrap(),
            CredentialSource::Literal("x")
        );
        assert!(ValueOrValueFrom::default().is_empty());
        assert!(matches!(
            ValueOrValueFrom::from_secret("db", "uri").source().unwrap(),
            CredentialSource::Secret(_)
        ));

        let mut both = ValueOrValueFrom::from_secret("db", "uri");
        both.value = Some("postgres://".into());
        assert!(both.source().is_err());
    }

    #[test]
    fn test_deserialize_vault_stanza() {
        let yaml = r#"
valueFrom:
  vault:
    secret: database/creds/test
    role: test
    agentInject: true
"#;
        let v: ValueOrValueFrom = serde_yaml::from_str(yaml).unwrap();
        let vault = v.vault().unwrap();
        assert_eq!(vault.role, "test");
        assert!(vault.agent_inject);
    }
}
