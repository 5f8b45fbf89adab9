use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;

use super::{MediaFile, MediaKind, MediaUploader};
use crate::{errors::MediaError, settings::CloudinaryConfig};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadFailure>,
}

#[derive(Debug, Deserialize)]
struct UploadFailure {
    message: String,
}

/// Unsigned preset uploads: the preset selects the image or video pipeline.
#[derive(Clone)]
pub struct CloudinaryUploader {
    client: Client,
    endpoint: String,
    cloud_name: String,
    image_preset: String,
    video_preset: String,
}

impl CloudinaryUploader {
    pub fn new(config: &CloudinaryConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &CloudinaryConfig) -> Self {
        CloudinaryUploader {
            client,
            endpoint: config.upload_endpoint.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            image_preset: config.image_preset.clone(),
            video_preset: config.video_preset.clone(),
        }
    }

    pub fn upload_url(&self, kind: MediaKind) -> String {
        format!("{}/{}/{}/upload", self.endpoint, self.cloud_name, kind.resource_type())
    }

    fn preset(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Image => &self.image_preset,
            MediaKind::Video => &self.video_preset,
        }
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    #[tracing::instrument(skip(self, file), fields(file = %file.file_name, size = file.size()))]
    async fn upload(&self, file: &MediaFile, kind: MediaKind, folder: &str) -> Result<String, MediaError> {
        if self.cloud_name.is_empty() {
            return Err(MediaError::MissingCredentials);
        }

        let mut part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        if let Some(mime) = &file.mime_type {
            part = part.mime_str(mime).map_err(MediaError::from)?;
        }

        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.preset(kind).to_string())
            .text("folder", folder.to_string());

        let response = self.client.post(self.upload_url(kind)).multipart(form).send().await?;
        let status = response.status();
        let body: UploadResponse = response.json().await?;

        match body.secure_url {
            Some(url) if status.is_success() => {
                tracing::info!("Uploaded {} to {}", file.file_name, url);
                Ok(url)
            }
            _ => {
                let reason = body
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("upload failed ({})", status));
                tracing::error!("CDN rejected {}: {}", file.file_name, reason);
                Err(MediaError::Rejected(reason))
            }
        }
    }
}
