use serde::Deserialize;
use serde_json::json;

use schemahero_core::error::SchemaHeroError;

use crate::sigv4::{self, SigningParams};

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const GET_PARAMETER_TARGET: &str = "AmazonSSM.GetParameter";

pub struct SsmCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

pub struct SsmClient<'a> {
    http: &'a reqwest::Client,
    region: String,
    endpoint: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameterResponse {
    parameter: Parameter,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter {
    value: String,
}

impl<'a> SsmClient<'a> {
    pub fn new(http: &'a reqwest::Client, region: &str, endpoint: Option<&str>) -> Self {
        let endpoint = endpoint
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://ssm.{region}.amazonaws.com"));
        Self {
            http,
            region: region.to_string(),
            endpoint,
        }
    }

    /// `GetParameter({Name, WithDecryption})`, returning `Parameter.Value`.
    pub async fn get_parameter(
        &self,
        credentials: &SsmCredentials,
        name: &str,
        with_decryption: bool,
    ) -> Result<String, SchemaHeroError> {
        let parsed = url::Url::parse(&self.endpoint)
            .map_err(|e| SchemaHeroError::resolution(format!("ssm endpoint {}: {e}", self.endpoint)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(SchemaHeroError::resolution(format!(
                    "ssm endpoint {} has no host",
                    self.endpoint
                )))
            }
        };

        let body = serde_json::to_vec(&json!({"Name": name, "WithDecryption": with_decryption}))?;
        let signed = sigv4::sign(
            &SigningParams {
                access_key_id: &credentials.access_key_id,
                secret_access_key: &credentials.secret_access_key,
                session_token: credentials.session_token.as_deref(),
                region: &self.region,
                service: "ssm",
                time: chrono::Utc::now(),
            },
            "POST",
            "/",
            &[
                ("content-type", CONTENT_TYPE),
                ("host", host.as_str()),
                ("x-amz-target", GET_PARAMETER_TARGET),
            ],
            &body,
        )?;

        let mut request = self
            .http
            .post(format!("{}/", self.endpoint))
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", GET_PARAMETER_TARGET)
            .body(body);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let resp = request.send().await.map_err(|e| SchemaHeroError::ParameterStore {
            status: 0,
            message: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        if status != 200 {
            let message = resp.text().await.unwrap_or_default();
            return Err(SchemaHeroError::ParameterStore { status, message });
        }
        let parsed: GetParameterResponse =
            resp.json().await.map_err(|e| SchemaHeroError::ParameterStore {
                status,
                message: format!("JSON parse error: {e}"),
            })?;
        tracing::debug!(parameter = name, region = %self.region, "read ssm parameter");
        Ok(parsed.parameter.value)
    }
}
