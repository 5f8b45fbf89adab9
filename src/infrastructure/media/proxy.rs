use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{admin::StorageUsage, MediaKind, MediaRemover};
use crate::errors::MediaError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMediaRequest {
    #[serde(default)]
    pub public_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<MediaKind>,
}

/// Client of the same-origin media endpoints, for callers that hold no
/// CDN secrets themselves.
#[derive(Clone)]
pub struct MediaProxyClient {
    client: Client,
    base_url: String,
}

impl MediaProxyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        MediaProxyClient {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn usage(&self) -> Result<StorageUsage, MediaError> {
        let response = self
            .client
            .get(format!("{}/cloudinary-usage", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MediaError::Rejected(format!("usage request failed ({})", response.status())));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MediaRemover for MediaProxyClient {
    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<(), MediaError> {
        let body = DeleteMediaRequest {
            public_id: Some(public_id.to_string()),
            resource_type: Some(kind),
        };
        let response = self
            .client
            .post(format!("{}/delete-cloudinary", self.base_url))
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(MediaError::Rejected(format!("delete failed ({}): {}", status, text)))
        }
    }
}
