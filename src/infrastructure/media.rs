//! Media CDN integration: classification, uploads, URL transforms and the
//! admin operations behind the serverless endpoints.

use std::{fmt, path::Path};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MediaError;

pub mod admin;
pub mod cloudinary;
pub mod metadata;
pub mod proxy;
pub mod urls;

pub use admin::{CloudinaryAdmin, StorageUsage};
pub use cloudinary::CloudinaryUploader;
pub use proxy::MediaProxyClient;

const IMAGE_EXTENSIONS: [&str; 12] = [
    "jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "avif", "bmp", "tif", "tiff", "svg",
];
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "m4v", "avi", "mkv", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// CDN resource type segment.
    pub fn resource_type(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Video only when the evidence is unambiguous: a video MIME type, or a
/// video extension that no image MIME type contradicts. Without a MIME
/// type the leading bytes are sniffed. Anything else is an image.
pub fn classify(file_name: &str, mime_type: Option<&str>, head: &[u8]) -> MediaKind {
    let mime = mime_type.map(str::to_ascii_lowercase).unwrap_or_default();
    let ext = extension(file_name);

    let mime_video = mime.starts_with("video/");
    let mime_image = mime.starts_with("image/");
    let video_ext = ext.as_deref().is_some_and(|e| VIDEO_EXTENSIONS.contains(&e));

    if mime_video || (video_ext && !mime_image) {
        return MediaKind::Video;
    }

    let image_ext = ext.as_deref().is_some_and(|e| IMAGE_EXTENSIONS.contains(&e));
    if mime.is_empty() && !image_ext {
        if let Some(sniffed) = infer::get(head) {
            if sniffed.matcher_type() == infer::MatcherType::Video {
                return MediaKind::Video;
            }
        }
    }

    MediaKind::Image
}

/// An upload candidate as received from the client.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
    /// File system modification time, the last-resort capture date.
    pub modified_at: Option<DateTime<Utc>>,
}

impl MediaFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn kind(&self) -> MediaKind {
        classify(&self.file_name, self.mime_type.as_deref(), &self.bytes)
    }
}

/// Pushes media to the CDN and returns its permanent URL.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file: &MediaFile, kind: MediaKind, folder: &str) -> Result<String, MediaError>;
}

/// Removes media from the CDN.
#[async_trait]
pub trait MediaRemover: Send + Sync {
    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<(), MediaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_files_are_images() {
        assert_eq!(classify("IMG_1.JPG", Some("image/jpeg"), &[]), MediaKind::Image);
        assert_eq!(classify("clip.mp4", Some("image/gif"), &[]), MediaKind::Image);
        assert_eq!(classify("notes.bin", Some("application/octet-stream"), &[]), MediaKind::Image);
        assert_eq!(classify("unknown", None, &[0, 1, 2]), MediaKind::Image);
    }

    #[test]
    fn videos_need_clear_evidence() {
        assert_eq!(classify("clip.MOV", None, &[]), MediaKind::Video);
        assert_eq!(classify("clip", Some("video/mp4"), &[]), MediaKind::Video);
        assert_eq!(classify("photo.jpg", Some("video/quicktime"), &[]), MediaKind::Video);
    }

    #[test]
    fn sniffs_bytes_without_mime() {
        // ISO base media header with an mp4 brand
        let mp4 = [0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'm', b'p', b'4', b'2'];
        assert_eq!(classify("upload", None, &mp4), MediaKind::Video);
    }
}
