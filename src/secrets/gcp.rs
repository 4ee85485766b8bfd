use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::credentials::SecretStoreConfig;
use crate::secrets::{truncate_body, SecretFetchError, SecretMaterial, SecretRef, SecretSource};
use crate::utils::constants::{GCP_METADATA_TOKEN_URL, GCP_SECRET_MANAGER_API};

/// GCP Secret Manager, authenticated with the instance service account
/// token from the metadata server.
#[derive(Debug, Clone)]
pub struct GcpSecretSource {
    client: Client,
    api_base: String,
    metadata_url: String,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

impl GcpSecretSource {
    pub fn new(client: Client, api_base: impl Into<String>, metadata_url: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            metadata_url: metadata_url.into(),
        }
    }

    pub fn from_config(cfg: &SecretStoreConfig, client: Client) -> Self {
        Self::new(
            client,
            cfg.endpoint.clone().unwrap_or_else(|| GCP_SECRET_MANAGER_API.to_owned()),
            cfg.metadata_url.clone().unwrap_or_else(|| GCP_METADATA_TOKEN_URL.to_owned()),
        )
    }

    async fn access_token(&self) -> Result<String, SecretFetchError> {
        let response = self
            .client
            .get(&self.metadata_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SecretFetchError::Unauthenticated(format!(
                "metadata server returned {}",
                status
            )));
        }
        let token: MetadataToken = response.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl SecretSource for GcpSecretSource {
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<SecretMaterial, SecretFetchError> {
        let SecretRef::Versioned { .. } = secret_ref else {
            return Err(SecretFetchError::UnsupportedRef {
                provider: "GCP",
                secret: secret_ref.to_string(),
            });
        };

        let token = self.access_token().await?;
        let url = format!("{}/v1/{}:access", self.api_base, secret_ref);
        debug!(secret = %secret_ref, "accessing secret version");

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SecretFetchError::Status {
                secret: secret_ref.to_string(),
                status: status.as_u16(),
                body: truncate_body(response.text().await.unwrap_or_default()),
            });
        }

        let version: AccessSecretVersionResponse = response.json().await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(version.payload.data.as_bytes())
            .map_err(|e| SecretFetchError::Payload {
                secret: secret_ref.to_string(),
                reason: format!("base64 decode error: {}", e),
            })?;

        Ok(SecretMaterial::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    const METADATA_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
    const SECRET_PATH: &str = "/v1/projects/demo/secrets/issuer-key/versions/1:access";

    fn versioned() -> SecretRef {
        SecretRef::Versioned {
            project_id: "demo".into(),
            secret_id: "issuer-key".into(),
            version: "1".into(),
        }
    }

    fn source(server: &MockServer) -> GcpSecretSource {
        GcpSecretSource::new(Client::new(), server.base_url(), server.url(METADATA_PATH))
    }

    #[tokio::test]
    async fn fetches_and_decodes_secret_payload() {
        let server = MockServer::start_async().await;
        let metadata = server.mock(|when, then| {
            when.method(GET).path(METADATA_PATH).header("Metadata-Flavor", "Google");
            then.status(200).json_body(json!({"access_token": "sa-token", "expires_in": 3599}));
        });
        let secret = server.mock(|when, then| {
            when.method(GET).path(SECRET_PATH).header("authorization", "Bearer sa-token");
            then.status(200).json_body(json!({
                "name": "projects/demo/secrets/issuer-key/versions/1",
                "payload": { "data": STANDARD.encode(r#"{"client_id":"svc","client_secret":"s3cr3t"}"#) }
            }));
        });

        let material = source(&server).fetch(&versioned()).await.unwrap();

        assert_eq!(material.as_bytes(), br#"{"client_id":"svc","client_secret":"s3cr3t"}"#);
        metadata.assert();
        secret.assert();
    }

    #[tokio::test]
    async fn missing_secret_is_a_status_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(METADATA_PATH);
            then.status(200).json_body(json!({"access_token": "sa-token"}));
        });
        server.mock(|when, then| {
            when.method(GET).path(SECRET_PATH);
            then.status(404).body("Secret [projects/demo/secrets/issuer-key] not found");
        });

        let err = source(&server).fetch(&versioned()).await.unwrap_err();
        assert!(matches!(err, SecretFetchError::Status { status: 404, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn metadata_failure_is_unauthenticated() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(METADATA_PATH);
            then.status(403);
        });

        let err = source(&server).fetch(&versioned()).await.unwrap_err();
        assert!(matches!(err, SecretFetchError::Unauthenticated(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn named_refs_are_rejected() {
        let server = MockServer::start_async().await;
        let err = source(&server)
            .fetch(&SecretRef::Named { secret_id: "prod/key".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SecretFetchError::UnsupportedRef { provider: "GCP", .. }));
    }
}
