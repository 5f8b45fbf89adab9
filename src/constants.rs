use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

pub static START_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

// Local store keys
pub const FAMILY_CONFIG_KEY: &str = "familyAppConfig";
pub const SETUP_DONE_KEY: &str = "familyAppConfigured";
pub const CURRENT_USER_KEY: &str = "currentUser";
pub const PHOTOS_KEY: &str = "familyPhotos";
pub const COMMENTS_KEY_PREFIX: &str = "comments_";
pub const SCHEDULES_KEY: &str = "familySchedules";
pub const GROWTH_RECORDS_KEY: &str = "growthRecords";
pub const ACTIVITY_LOGS_KEY: &str = "activityLogs";

// Remote collections
pub const PHOTOS_COLLECTION: &str = "family-photos";
pub const COMMENTS_SUBCOLLECTION: &str = "comments";
pub const ALBUMS_COLLECTION: &str = "shared_albums";
pub const SCHEDULES_COLLECTION: &str = "family-schedules";
pub const ACTIVITY_LOGS_COLLECTION: &str = "activity_logs";

pub const COMMENT_COUNT_FIELD: &str = "commentCount";

pub const DEFAULT_ACTIVITY_LOG_CAP: usize = 1000;
pub const UPLOAD_LOG_INTERVAL_SECS: u64 = 5 * 60;
pub const ACTIVITY_SUMMARY_DAYS: i64 = 7;

pub const MAX_VIDEO_BYTES: u64 = 500 * 1024 * 1024;
pub const EXIF_SCAN_BYTES: usize = 64 * 1024;
