use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::credentials::SecretStoreConfig;
use crate::secrets::{truncate_body, SecretFetchError, SecretMaterial, SecretRef, SecretSource};
use crate::utils::constants::{AWS_SECRETS_EXTENSION_ENDPOINT, AWS_SESSION_TOKEN_ENV};

const SESSION_TOKEN_HEADER: &str = "X-Aws-Parameters-Secrets-Token";

/// AWS Secrets Manager through the local Parameters and Secrets extension,
/// which caches secrets next to the process.
#[derive(Debug, Clone)]
pub struct AwsSecretSource {
    client: Client,
    endpoint: String,
    session_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueResponse {
    secret_string: Option<String>,
    secret_binary: Option<String>,
}

impl AwsSecretSource {
    pub fn new(client: Client, endpoint: impl Into<String>, session_token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            session_token,
        }
    }

    pub fn from_config(cfg: &SecretStoreConfig, client: Client) -> Self {
        Self::new(
            client,
            cfg.endpoint.clone().unwrap_or_else(|| AWS_SECRETS_EXTENSION_ENDPOINT.to_owned()),
            std::env::var(AWS_SESSION_TOKEN_ENV).ok(),
        )
    }
}

#[async_trait]
impl SecretSource for AwsSecretSource {
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<SecretMaterial, SecretFetchError> {
        let SecretRef::Named { secret_id } = secret_ref else {
            return Err(SecretFetchError::UnsupportedRef {
                provider: "AWS",
                secret: secret_ref.to_string(),
            });
        };
        let session_token = self
            .session_token
            .as_deref()
            .ok_or_else(|| SecretFetchError::Unauthenticated(format!("{} is not set", AWS_SESSION_TOKEN_ENV)))?;

        debug!(secret = %secret_id, "reading secret from extension cache");
        let response = self
            .client
            .get(format!("{}/secretsmanager/get", self.endpoint))
            .query(&[("secretId", secret_id.as_str())])
            .header(SESSION_TOKEN_HEADER, session_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SecretFetchError::Status {
                secret: secret_id.clone(),
                status: status.as_u16(),
                body: truncate_body(response.text().await.unwrap_or_default()),
            });
        }

        let value: GetSecretValueResponse = response.json().await?;
        match (value.secret_string, value.secret_binary) {
            (Some(text), _) => Ok(SecretMaterial::new(text.into_bytes())),
            (None, Some(binary)) => base64::engine::general_purpose::STANDARD
                .decode(binary.as_bytes())
                .map(SecretMaterial::new)
                .map_err(|e| SecretFetchError::Payload {
                    secret: secret_id.clone(),
                    reason: format!("base64 decode error: {}", e),
                }),
            (None, None) => Err(SecretFetchError::Payload {
                secret: secret_id.clone(),
                reason: "neither SecretString nor SecretBinary present".to_owned(),
            }),
        }
    }
}
