use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::date_grouping::DateKey;

/// Emoji → members who reacted with it.
pub type Reactions = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Identifier assigned by the remote store; never persisted inside the document.
    #[serde(default, skip_serializing)]
    pub doc_id: Option<String>,
    /// Client identifier, `{basename}_{millis}`.
    pub id: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
    /// Fixed at upload; legacy records may lack it.
    #[serde(default)]
    pub date_group: Option<DateKey>,
    pub uploader: String,
    /// Upload time in epoch milliseconds, the timeline ordering field.
    pub timestamp: i64,
    #[serde(default)]
    pub name_base: String,
    #[serde(default)]
    pub original_file_name: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub reactions: Reactions,
    #[serde(default)]
    pub albums: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
}

impl Photo {
    /// Identifier the active backend addresses this photo by.
    pub fn record_id(&self) -> &str {
        self.doc_id.as_deref().unwrap_or(&self.id)
    }

    pub fn reaction_count(&self, emoji: &str) -> usize {
        self.reactions.get(emoji).map_or(0, |users| users.len())
    }

    /// Adds or removes `member` from the reactions for `emoji`, dropping
    /// emojis nobody reacts with any more. Returns whether the member now reacts.
    pub fn toggle_reaction(&mut self, emoji: &str, member: &str) -> bool {
        let users = self.reactions.entry(emoji.to_string()).or_default();
        let reacted = if users.remove(member) {
            false
        } else {
            users.insert(member.to_string());
            true
        };
        if users.is_empty() {
            self.reactions.remove(emoji);
        }
        reacted
    }
}

/// Fields a caller may change after upload. The date group is not among them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Reactions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub albums: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl PhotoPatch {
    pub fn reactions(reactions: Reactions) -> Self {
        PhotoPatch { reactions: Some(reactions), ..Default::default() }
    }

    pub fn albums(albums: BTreeSet<String>) -> Self {
        PhotoPatch { albums: Some(albums), ..Default::default() }
    }
}

/// Two photos sharing a file name and byte size.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePhoto {
    pub file_name: String,
    pub file_size: u64,
    pub original: String,
    pub duplicate: String,
}

/// Last path segment of a media URL without its extension.
pub fn file_name_from_url(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return "unknown".to_string();
    };
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    match segment.rfind('.') {
        Some(dot) if dot > 0 => segment[..dot].to_string(),
        _ => segment.to_string(),
    }
}

pub fn find_duplicates(photos: &[Photo]) -> Vec<DuplicatePhoto> {
    let mut seen: BTreeMap<(String, u64), &Photo> = BTreeMap::new();
    let mut duplicates = Vec::new();

    for photo in photos {
        let key = (file_name_from_url(&photo.url), photo.file_size);
        match seen.get(&key) {
            Some(original) => duplicates.push(DuplicatePhoto {
                file_name: key.0.clone(),
                file_size: key.1,
                original: original.record_id().to_string(),
                duplicate: photo.record_id().to_string(),
            }),
            None => {
                seen.insert(key, photo);
            }
        }
    }

    duplicates
}

/// Human readable byte size, e.g. `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let size = bytes as f64 / 1024f64.powi(exponent as i32);
    format!("{:.1} {}", size, UNITS[exponent])
}
