use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivityAction {
    Login,
    Logout,
    Upload,
    Comment,
    Other(String),
}

impl ActivityAction {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityAction::Login => "login",
            ActivityAction::Logout => "logout",
            ActivityAction::Upload => "upload",
            ActivityAction::Comment => "comment",
            ActivityAction::Other(action) => action,
        }
    }
}

impl From<&str> for ActivityAction {
    fn from(raw: &str) -> Self {
        match raw {
            "login" => ActivityAction::Login,
            "logout" => ActivityAction::Logout,
            "upload" => ActivityAction::Upload,
            "comment" => ActivityAction::Comment,
            other => ActivityAction::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActivityAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActivityAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ActivityAction::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: ActivityAction,
    pub user: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberActivity {
    pub logins: usize,
    pub uploads: usize,
    pub comments: usize,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Per-member activity counts for logs newer than `window` before `now`.
pub fn summarize_activity(
    logs: &[ActivityLog],
    now: DateTime<Utc>,
    window: Duration,
) -> BTreeMap<String, MemberActivity> {
    let since = now - window;
    let mut summary: BTreeMap<String, MemberActivity> = BTreeMap::new();

    for log in logs.iter().filter(|log| log.timestamp > since) {
        let stats = summary.entry(log.user.clone()).or_default();
        match log.action {
            ActivityAction::Login => stats.logins += 1,
            ActivityAction::Upload => stats.uploads += 1,
            ActivityAction::Comment => stats.comments += 1,
            _ => {}
        }
        if stats.last_seen.is_none_or(|seen| log.timestamp > seen) {
            stats.last_seen = Some(log.timestamp);
        }
    }

    summary
}
