use serde::{Deserialize, Serialize};

/// Shared album name record, used for album list discovery across members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRecord {
    pub name: String,
    pub updated_at: i64,
}

/// Trims an album name; blank names are not albums.
pub fn clean_album_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Splits comma separated album input into clean, distinct names.
pub fn parse_album_list(input: &str) -> Vec<String> {
    let mut albums: Vec<String> = Vec::new();
    for name in input.split(',').filter_map(clean_album_name) {
        if !albums.contains(&name) {
            albums.push(name);
        }
    }
    albums
}
