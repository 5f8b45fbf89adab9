use serde::{Deserialize, Serialize};

use crate::{domain::date_grouping::DateKey, settings::AppConfig};

/// Per-profile preferences persisted in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyConfig {
    pub members: Vec<String>,
    /// Epoch date for age and D-Day labels.
    pub dday: DateKey,
    pub theme: String,
    pub albums: Vec<String>,
    pub use_remote: bool,
}

impl FamilyConfig {
    pub fn defaults(config: &AppConfig) -> Self {
        FamilyConfig {
            members: config.members.clone(),
            dday: config.epoch_date,
            theme: "default".to_string(),
            albums: config.default_albums.clone(),
            use_remote: config.use_remote,
        }
    }

    /// Overlays a stored blob onto defaults, field by field, so blobs
    /// written by older versions keep working.
    pub fn merged(stored: Option<serde_json::Value>, defaults: FamilyConfig) -> Self {
        let Some(serde_json::Value::Object(stored)) = stored else {
            return defaults;
        };

        let members = stored
            .get("members")
            .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            .filter(|m| !m.is_empty())
            .unwrap_or(defaults.members);
        let dday = stored
            .get("dday")
            .and_then(|v| v.as_str())
            .and_then(|s| DateKey::parse(s).ok())
            .unwrap_or(defaults.dday);
        let theme = stored
            .get("theme")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(defaults.theme);
        let albums = stored
            .get("albums")
            .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            .unwrap_or(defaults.albums);
        let use_remote = stored
            .get("useRemote")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.use_remote);

        FamilyConfig { members, dday, theme, albums, use_remote }
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }
}
