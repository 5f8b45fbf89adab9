use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::backend::{apply_patch, BackendKind, Listener, StorageBackend, Subscription};
use crate::{
    constants::{
        ACTIVITY_LOGS_KEY, COMMENTS_KEY_PREFIX, FAMILY_CONFIG_KEY, PHOTOS_KEY, SCHEDULES_KEY, SETUP_DONE_KEY,
    },
    entities::{
        activity_log::ActivityLog,
        album::clean_album_name,
        comment::{Comment, CommentPatch},
        family_config::FamilyConfig,
        photo::{Photo, PhotoPatch},
        schedule::{sort_schedules, Schedule, SchedulePatch},
    },
    errors::StorageError,
    infrastructure::{
        kv::{read_json, read_list, write_json, KeyValueStore},
        utils::ids::generate_id,
    },
};

pub fn comments_key(photo_id: &str) -> String {
    format!("{}{}", COMMENTS_KEY_PREFIX, photo_id)
}

/// Backend over the device-local key-value store. Every list lives under a
/// single key and is rewritten whole, so every read-modify-write runs under
/// one backend-wide lock. Subscriptions deliver one snapshot synchronously
/// and never fire again.
pub struct LocalBackend {
    store: Arc<dyn KeyValueStore>,
    writes: Mutex<()>,
    activity_log_cap: usize,
    default_albums: Vec<String>,
}

impl LocalBackend {
    pub fn new(store: Arc<dyn KeyValueStore>, activity_log_cap: usize, default_albums: Vec<String>) -> Self {
        LocalBackend {
            store,
            writes: Mutex::new(()),
            activity_log_cap: activity_log_cap.max(1),
            default_albums,
        }
    }

    fn exclusive<T>(&self, op: impl FnOnce() -> Result<T, StorageError>) -> Result<T, StorageError> {
        let _guard = self.writes.lock();
        op()
    }

    fn photos(&self) -> Result<Vec<Photo>, StorageError> {
        read_list(self.store.as_ref(), PHOTOS_KEY)
    }

    fn comments(&self, photo_id: &str) -> Result<Vec<Comment>, StorageError> {
        read_list(self.store.as_ref(), &comments_key(photo_id))
    }

    fn schedules(&self) -> Result<Vec<Schedule>, StorageError> {
        read_list(self.store.as_ref(), SCHEDULES_KEY)
    }

    /// Newest first by timestamp. Local comment lists are authoritative, so
    /// counts are always derived.
    fn photos_with_counts(&self) -> Result<Vec<Photo>, StorageError> {
        let mut photos = self.photos()?;
        photos.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        for photo in photos.iter_mut() {
            let count = self.comments(&photo.id).map(|c| c.len()).unwrap_or_default();
            photo.comment_count = Some(count as u64);
        }
        Ok(photos)
    }

    fn family_config_blob(&self) -> Result<Map<String, Value>, StorageError> {
        Ok(match read_json::<Value>(self.store.as_ref(), FAMILY_CONFIG_KEY)? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        })
    }

    fn albums(&self) -> Result<Vec<String>, StorageError> {
        let blob = self.family_config_blob()?;
        Ok(blob
            .get("albums")
            .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            .unwrap_or_else(|| self.default_albums.clone()))
    }

    /// Replaces the family settings blob, including its album list.
    pub fn save_family_config(&self, config: &FamilyConfig) -> Result<(), StorageError> {
        self.exclusive(|| {
            write_json(self.store.as_ref(), FAMILY_CONFIG_KEY, config)?;
            write_json(self.store.as_ref(), SETUP_DONE_KEY, &true)
        })
    }

    fn write_albums(&self, albums: Vec<String>) -> Result<(), StorageError> {
        let mut blob = self.family_config_blob()?;
        blob.insert("albums".to_string(), Value::from(albums));
        write_json(self.store.as_ref(), FAMILY_CONFIG_KEY, &blob)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn create_photo(&self, photo: &Photo) -> Result<String, StorageError> {
        self.exclusive(|| {
            let mut photos = self.photos()?;
            photos.insert(0, photo.clone());
            write_json(self.store.as_ref(), PHOTOS_KEY, &photos)?;
            Ok(photo.id.clone())
        })
    }

    async fn subscribe_photos(&self, listener: Listener<Photo>) -> Result<Subscription, StorageError> {
        listener.deliver(self.photos_with_counts());
        Ok(Subscription::completed())
    }

    async fn update_photo(&self, id: &str, patch: &PhotoPatch) -> Result<(), StorageError> {
        self.exclusive(|| {
            let mut photos = self.photos()?;
            let photo = photos
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| StorageError::NotFound(format!("photo {}", id)))?;
            *photo = apply_patch(photo, patch)?;
            write_json(self.store.as_ref(), PHOTOS_KEY, &photos)
        })
    }

    async fn delete_photo(&self, id: &str) -> Result<(), StorageError> {
        self.exclusive(|| {
            self.store.remove(&comments_key(id))?;
            let mut photos = self.photos()?;
            photos.retain(|p| p.id != id);
            write_json(self.store.as_ref(), PHOTOS_KEY, &photos)
        })
    }

    async fn recount_comments(&self, photo_id: &str) -> Result<u64, StorageError> {
        Ok(self.comments(photo_id)?.len() as u64)
    }

    async fn add_comment(&self, photo_id: &str, comment: &Comment) -> Result<String, StorageError> {
        self.exclusive(|| {
            let mut comments = self.comments(photo_id)?;
            let id = generate_id("comment");
            comments.push(Comment { id: Some(id.clone()), ..comment.clone() });
            write_json(self.store.as_ref(), &comments_key(photo_id), &comments)?;
            Ok(id)
        })
    }

    async fn subscribe_comments(
        &self,
        photo_id: &str,
        listener: Listener<Comment>,
    ) -> Result<Subscription, StorageError> {
        let comments = self.comments(photo_id).map(|mut comments| {
            comments.sort_by_key(|c| c.created_at);
            comments
        });
        listener.deliver(comments);
        Ok(Subscription::completed())
    }

    async fn update_comment(&self, photo_id: &str, comment_id: &str, patch: &CommentPatch) -> Result<(), StorageError> {
        self.exclusive(|| {
            let mut comments = self.comments(photo_id)?;
            let comment = comments
                .iter_mut()
                .find(|c| c.id.as_deref() == Some(comment_id))
                .ok_or_else(|| StorageError::NotFound(format!("comment {}", comment_id)))?;
            *comment = apply_patch(comment, patch)?;
            write_json(self.store.as_ref(), &comments_key(photo_id), &comments)
        })
    }

    async fn delete_comment(&self, photo_id: &str, comment_id: &str) -> Result<(), StorageError> {
        self.exclusive(|| {
            let mut comments = self.comments(photo_id)?;
            comments.retain(|c| c.id.as_deref() != Some(comment_id));
            write_json(self.store.as_ref(), &comments_key(photo_id), &comments)
        })
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<String, StorageError> {
        self.exclusive(|| {
            let mut schedules = self.schedules()?;
            schedules.push(schedule.clone());
            sort_schedules(&mut schedules);
            write_json(self.store.as_ref(), SCHEDULES_KEY, &schedules)?;
            Ok(schedule.id.clone())
        })
    }

    async fn subscribe_schedules(&self, listener: Listener<Schedule>) -> Result<Subscription, StorageError> {
        let schedules = self.schedules().map(|mut schedules| {
            sort_schedules(&mut schedules);
            schedules
        });
        listener.deliver(schedules);
        Ok(Subscription::completed())
    }

    async fn update_schedule(&self, id: &str, patch: &SchedulePatch) -> Result<(), StorageError> {
        self.exclusive(|| {
            let mut schedules = self.schedules()?;
            let schedule = schedules
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| StorageError::NotFound(format!("schedule {}", id)))?;
            *schedule = apply_patch(schedule, patch)?;
            sort_schedules(&mut schedules);
            write_json(self.store.as_ref(), SCHEDULES_KEY, &schedules)
        })
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), StorageError> {
        self.exclusive(|| {
            let mut schedules = self.schedules()?;
            schedules.retain(|s| s.id != id);
            write_json(self.store.as_ref(), SCHEDULES_KEY, &schedules)
        })
    }

    async fn add_album(&self, name: &str) -> Result<Option<String>, StorageError> {
        let Some(name) = clean_album_name(name) else {
            return Ok(None);
        };
        self.exclusive(|| {
            let mut albums = self.albums()?;
            if !albums.contains(&name) {
                albums.push(name.clone());
                self.write_albums(albums)?;
            }
            Ok(Some(name))
        })
    }

    async fn subscribe_albums(&self, listener: Listener<String>) -> Result<Subscription, StorageError> {
        listener.deliver(self.albums());
        Ok(Subscription::completed())
    }

    async fn rename_album(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let Some(to) = clean_album_name(to) else {
            return Ok(());
        };
        self.exclusive(|| {
            let mut albums = self.albums()?;
            let position = albums
                .iter()
                .position(|a| a == from)
                .ok_or_else(|| StorageError::NotFound(format!("album {}", from)))?;
            if albums.contains(&to) {
                albums.remove(position);
            } else {
                albums[position] = to;
            }
            self.write_albums(albums)
        })
    }

    async fn remove_album(&self, name: &str) -> Result<(), StorageError> {
        self.exclusive(|| {
            let mut albums = self.albums()?;
            albums.retain(|a| a != name);
            self.write_albums(albums)
        })
    }

    async fn append_activity_log(&self, log: &ActivityLog) -> Result<String, StorageError> {
        self.exclusive(|| {
            let mut logs: Vec<ActivityLog> = read_list(self.store.as_ref(), ACTIVITY_LOGS_KEY)?;
            let id = generate_id("log");
            logs.push(ActivityLog { id: Some(id.clone()), ..log.clone() });
            if logs.len() > self.activity_log_cap {
                let excess = logs.len() - self.activity_log_cap;
                logs.drain(..excess);
            }
            write_json(self.store.as_ref(), ACTIVITY_LOGS_KEY, &logs)?;
            Ok(id)
        })
    }

    async fn load_activity_logs(&self) -> Result<Vec<ActivityLog>, StorageError> {
        read_list(self.store.as_ref(), ACTIVITY_LOGS_KEY)
    }
}
