use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    entities::{
        activity_log::ActivityLog,
        comment::{Comment, CommentPatch},
        photo::{Photo, PhotoPatch},
        schedule::{Schedule, SchedulePatch},
    },
    errors::StorageError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

type UpdateFn<T> = dyn Fn(Vec<T>) + Send + Sync;
type ErrorFn = dyn Fn(StorageError) + Send + Sync;

/// Callbacks receiving full result sets, or the error that ended a subscription.
pub struct Listener<T> {
    on_update: Arc<UpdateFn<T>>,
    on_error: Arc<ErrorFn>,
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Listener {
            on_update: Arc::clone(&self.on_update),
            on_error: Arc::clone(&self.on_error),
        }
    }
}

impl<T> Listener<T> {
    pub fn new(
        on_update: impl Fn(Vec<T>) + Send + Sync + 'static,
        on_error: impl Fn(StorageError) + Send + Sync + 'static,
    ) -> Self {
        Listener {
            on_update: Arc::new(on_update),
            on_error: Arc::new(on_error),
        }
    }

    pub fn update(&self, items: Vec<T>) {
        (self.on_update)(items)
    }

    pub fn error(&self, err: StorageError) {
        (self.on_error)(err)
    }

    pub fn deliver(&self, result: Result<Vec<T>, StorageError>) {
        match result {
            Ok(items) => self.update(items),
            Err(e) => self.error(e),
        }
    }
}

struct SubscriptionInner {
    active: Arc<AtomicBool>,
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Handle to a live query. Cloning shares the handle; cancelling any clone
/// cancels the query, and cancelling again is a no-op.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// `active` is shared with the delivering task so it can stop before
    /// the next callback once cancelled.
    pub fn new(active: Arc<AtomicBool>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            inner: Arc::new(SubscriptionInner {
                active,
                cancel: Mutex::new(Some(Box::new(cancel))),
            }),
        }
    }

    /// A subscription with nothing left to stop, e.g. a one-shot local read.
    pub fn completed() -> Self {
        Self::new(Arc::new(AtomicBool::new(true)), || {})
    }

    pub fn cancel(&self) {
        self.inner.active.store(false, Ordering::Release);
        let cancel = self.inner.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.is_active()).finish()
    }
}

/// Persistence operations for every collection, implemented once per backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Returns the identifier the photo is addressed by afterwards.
    async fn create_photo(&self, photo: &Photo) -> Result<String, StorageError>;
    async fn subscribe_photos(&self, listener: Listener<Photo>) -> Result<Subscription, StorageError>;
    async fn update_photo(&self, id: &str, patch: &PhotoPatch) -> Result<(), StorageError>;
    /// Removes the photo's comments, then the photo.
    async fn delete_photo(&self, id: &str) -> Result<(), StorageError>;
    /// Re-derives the stored comment count from the actual comments.
    async fn recount_comments(&self, photo_id: &str) -> Result<u64, StorageError>;

    async fn add_comment(&self, photo_id: &str, comment: &Comment) -> Result<String, StorageError>;
    async fn subscribe_comments(
        &self,
        photo_id: &str,
        listener: Listener<Comment>,
    ) -> Result<Subscription, StorageError>;
    async fn update_comment(&self, photo_id: &str, comment_id: &str, patch: &CommentPatch) -> Result<(), StorageError>;
    async fn delete_comment(&self, photo_id: &str, comment_id: &str) -> Result<(), StorageError>;

    async fn create_schedule(&self, schedule: &Schedule) -> Result<String, StorageError>;
    async fn subscribe_schedules(&self, listener: Listener<Schedule>) -> Result<Subscription, StorageError>;
    async fn update_schedule(&self, id: &str, patch: &SchedulePatch) -> Result<(), StorageError>;
    async fn delete_schedule(&self, id: &str) -> Result<(), StorageError>;

    /// Registers an album name; blank names are ignored.
    async fn add_album(&self, name: &str) -> Result<Option<String>, StorageError>;
    async fn subscribe_albums(&self, listener: Listener<String>) -> Result<Subscription, StorageError>;
    async fn rename_album(&self, from: &str, to: &str) -> Result<(), StorageError>;
    async fn remove_album(&self, name: &str) -> Result<(), StorageError>;

    async fn append_activity_log(&self, log: &ActivityLog) -> Result<String, StorageError>;
    /// All retained logs, oldest first.
    async fn load_activity_logs(&self) -> Result<Vec<ActivityLog>, StorageError>;
}

pub(crate) fn to_object<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Map<String, Value>, StorageError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Serialization(format!("expected an object, got {}", other))),
    }
}

/// Shallow-merges a serialized patch into a stored record.
pub(crate) fn apply_patch<T, P>(record: &T, patch: &P) -> Result<T, StorageError>
where
    T: Serialize + DeserializeOwned,
    P: Serialize + ?Sized,
{
    let mut merged = to_object(record)?;
    merged.extend(to_object(patch)?);
    Ok(serde_json::from_value(Value::Object(merged))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cancel_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = Subscription::new(Arc::new(AtomicBool::new(true)), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let clone = subscription.clone();
        subscription.cancel();
        clone.cancel();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!clone.is_active());
    }

    #[test]
    fn patch_overrides_only_present_fields() {
        let comment = Comment { id: None, user: "엄마".into(), text: "old".into(), created_at: 5 };
        let patched = apply_patch(&comment, &CommentPatch { text: Some("new".into()) }).unwrap();

        assert_eq!(patched.text, "new");
        assert_eq!(patched.user, "엄마");
        assert_eq!(patched.created_at, 5);
    }
}
