use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use super::{MediaKind, MediaRemover};
use crate::{errors::MediaError, settings::CloudinaryConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub usage: u64,
    pub limit: u64,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    storage: Option<UsageStorage>,
}

#[derive(Debug, Deserialize)]
struct UsageStorage {
    #[serde(default)]
    usage: u64,
    #[serde(default)]
    limit: u64,
}

/// Signed Admin API access. Only constructed when key, secret and cloud
/// name are all configured.
pub struct CloudinaryAdmin {
    client: Client,
    endpoint: String,
    cloud_name: String,
    api_key: String,
    api_secret: Zeroizing<String>,
}

impl CloudinaryAdmin {
    pub fn from_config(config: &CloudinaryConfig) -> Option<Self> {
        let (cloud_name, api_key, api_secret) = config.admin_credentials()?;
        Some(CloudinaryAdmin {
            client: Client::new(),
            endpoint: config.admin_endpoint.trim_end_matches('/').to_string(),
            cloud_name: cloud_name.to_string(),
            api_key: api_key.to_string(),
            api_secret: Zeroizing::new(api_secret.to_string()),
        })
    }

    async fn error_for(response: reqwest::Response) -> MediaError {
        let status = response.status();
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("admin request failed ({})", status));
        MediaError::Rejected(message)
    }

    /// Destroys an uploaded resource and invalidates cached copies. Returns
    /// the CDN's result body.
    #[tracing::instrument(skip(self))]
    pub async fn destroy(&self, public_id: &str, kind: MediaKind) -> Result<Value, MediaError> {
        let url = format!(
            "{}/{}/resources/{}/upload",
            self.endpoint,
            self.cloud_name,
            kind.resource_type()
        );
        let response = self
            .client
            .delete(url)
            .basic_auth(&self.api_key, Some(self.api_secret.as_str()))
            .query(&[("public_ids[]", public_id), ("invalidate", "true")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        tracing::info!("Destroyed CDN resource {}", public_id);
        Ok(response.json().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn usage(&self) -> Result<StorageUsage, MediaError> {
        let url = format!("{}/{}/usage", self.endpoint, self.cloud_name);
        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(self.api_secret.as_str()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        let body: UsageResponse = response.json().await?;
        let storage = body.storage.unwrap_or(UsageStorage { usage: 0, limit: 0 });
        Ok(StorageUsage { usage: storage.usage, limit: storage.limit })
    }
}

#[async_trait]
impl MediaRemover for CloudinaryAdmin {
    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<(), MediaError> {
        self.destroy(public_id, kind).await.map(|_| ())
    }
}
