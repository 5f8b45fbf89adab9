use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::backend::{to_object, BackendKind, Listener, StorageBackend, Subscription};
use crate::{
    constants::COMMENT_COUNT_FIELD,
    entities::{
        activity_log::ActivityLog,
        album::{clean_album_name, AlbumRecord},
        comment::{Comment, CommentPatch},
        photo::{Photo, PhotoPatch},
        schedule::{Schedule, SchedulePatch},
    },
    errors::StorageError,
    infrastructure::documents::{CollectionPath, DocumentStore, OrderBy, StoredDocument},
};

/// Records that carry the store-assigned document id once loaded.
trait StoredRecord: DeserializeOwned {
    fn assign_id(&mut self, id: String);
}

impl StoredRecord for Photo {
    fn assign_id(&mut self, id: String) {
        self.doc_id = Some(id);
    }
}

impl StoredRecord for Schedule {
    fn assign_id(&mut self, id: String) {
        self.doc_id = Some(id);
    }
}

impl StoredRecord for Comment {
    fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

impl StoredRecord for ActivityLog {
    fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

/// Decodes documents, skipping (and logging) ones with an unexpected shape.
fn decode_all<T: StoredRecord>(collection: &CollectionPath, documents: Vec<StoredDocument>) -> Vec<T> {
    documents
        .into_iter()
        .filter_map(|doc| match serde_json::from_value::<T>(Value::Object(doc.data)) {
            Ok(mut record) => {
                record.assign_id(doc.id);
                Some(record)
            }
            Err(e) => {
                tracing::warn!("Skipping malformed document {}/{}: {}", collection, doc.id, e);
                None
            }
        })
        .collect()
}

async fn load_photos(store: &dyn DocumentStore) -> Result<Vec<Photo>, StorageError> {
    let collection = CollectionPath::photos();
    let documents = store.query(&collection, Some(OrderBy::desc("timestamp"))).await?;
    let mut photos: Vec<Photo> = decode_all(&collection, documents);

    for photo in photos.iter_mut().filter(|p| p.comment_count.is_none()) {
        let comments = CollectionPath::comments(photo.record_id());
        let count = match store.count(&comments).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Could not count comments of {}: {}", photo.record_id(), e);
                0
            }
        };
        photo.comment_count = Some(count as u64);
    }

    Ok(photos)
}

async fn load_comments(store: &dyn DocumentStore, photo_id: &str) -> Result<Vec<Comment>, StorageError> {
    let collection = CollectionPath::comments(photo_id);
    let documents = store.query(&collection, Some(OrderBy::asc("createdAt"))).await?;
    Ok(decode_all(&collection, documents))
}

async fn load_schedules(store: &dyn DocumentStore) -> Result<Vec<Schedule>, StorageError> {
    let collection = CollectionPath::schedules();
    let documents = store.query(&collection, Some(OrderBy::asc("date"))).await?;
    Ok(decode_all(&collection, documents))
}

async fn load_albums(store: &dyn DocumentStore) -> Result<Vec<String>, StorageError> {
    let documents = store.query(&CollectionPath::albums(), None).await?;
    let mut names: Vec<String> = documents
        .into_iter()
        .filter_map(|doc| doc.data.get("name").and_then(Value::as_str).and_then(clean_album_name))
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// Backend over the shared realtime document store.
pub struct RemoteBackend {
    store: Arc<dyn DocumentStore>,
}

impl RemoteBackend {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        RemoteBackend { store }
    }

    /// Delivers a fresh snapshot now and after every change to `collection`
    /// until cancelled.
    async fn live_query<T, F, Fut>(
        &self,
        collection: CollectionPath,
        listener: Listener<T>,
        load: F,
    ) -> Result<Subscription, StorageError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn DocumentStore>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, StorageError>> + Send,
    {
        // Watch before the first read so no change slips between them.
        let mut changes = self.store.watch(&collection).await?;
        let store = Arc::clone(&self.store);
        let active = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&active);

        let handle = tokio::spawn(async move {
            loop {
                let snapshot = load(Arc::clone(&store)).await;
                if !running.load(Ordering::Acquire) {
                    break;
                }
                listener.deliver(snapshot);
                if changes.next().await.is_none() {
                    tracing::warn!("Change feed for {} closed", collection);
                    break;
                }
            }
        });

        Ok(Subscription::new(active, move || handle.abort()))
    }

    async fn adjust_comment_count(&self, photo_id: &str, delta: i64) {
        if let Err(e) = self
            .store
            .increment(&CollectionPath::photos(), photo_id, COMMENT_COUNT_FIELD, delta)
            .await
        {
            tracing::warn!("Comment count update for {} failed: {}", photo_id, e);
        }
    }
}

#[async_trait]
impl StorageBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn create_photo(&self, photo: &Photo) -> Result<String, StorageError> {
        self.store.add(&CollectionPath::photos(), to_object(photo)?).await
    }

    async fn subscribe_photos(&self, listener: Listener<Photo>) -> Result<Subscription, StorageError> {
        self.live_query(CollectionPath::photos(), listener, |store| async move {
            load_photos(store.as_ref()).await
        })
        .await
    }

    async fn update_photo(&self, id: &str, patch: &PhotoPatch) -> Result<(), StorageError> {
        self.store.merge(&CollectionPath::photos(), id, to_object(patch)?).await
    }

    async fn delete_photo(&self, id: &str) -> Result<(), StorageError> {
        let comments = CollectionPath::comments(id);
        for comment in self.store.query(&comments, None).await? {
            self.store.delete(&comments, &comment.id).await?;
        }
        self.store.delete(&CollectionPath::photos(), id).await
    }

    async fn recount_comments(&self, photo_id: &str) -> Result<u64, StorageError> {
        let photos = CollectionPath::photos();
        let actual = self.store.count(&CollectionPath::comments(photo_id)).await? as i64;
        let stored = self
            .store
            .get(&photos, photo_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("photo {}", photo_id)))?
            .data
            .get(COMMENT_COUNT_FIELD)
            .and_then(Value::as_i64);

        if stored != Some(actual) {
            let delta = actual - stored.unwrap_or(0);
            self.store.increment(&photos, photo_id, COMMENT_COUNT_FIELD, delta).await?;
        }
        Ok(actual as u64)
    }

    async fn add_comment(&self, photo_id: &str, comment: &Comment) -> Result<String, StorageError> {
        let document = to_object(&Comment { id: None, ..comment.clone() })?;
        let id = self.store.add(&CollectionPath::comments(photo_id), document).await?;
        self.adjust_comment_count(photo_id, 1).await;
        Ok(id)
    }

    async fn subscribe_comments(
        &self,
        photo_id: &str,
        listener: Listener<Comment>,
    ) -> Result<Subscription, StorageError> {
        let photo_id = photo_id.to_string();
        self.live_query(CollectionPath::comments(&photo_id), listener, move |store| {
            let photo_id = photo_id.clone();
            async move { load_comments(store.as_ref(), &photo_id).await }
        })
        .await
    }

    async fn update_comment(&self, photo_id: &str, comment_id: &str, patch: &CommentPatch) -> Result<(), StorageError> {
        self.store
            .merge(&CollectionPath::comments(photo_id), comment_id, to_object(patch)?)
            .await
    }

    async fn delete_comment(&self, photo_id: &str, comment_id: &str) -> Result<(), StorageError> {
        self.store.delete(&CollectionPath::comments(photo_id), comment_id).await?;
        self.adjust_comment_count(photo_id, -1).await;
        Ok(())
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<String, StorageError> {
        self.store.add(&CollectionPath::schedules(), to_object(schedule)?).await
    }

    async fn subscribe_schedules(&self, listener: Listener<Schedule>) -> Result<Subscription, StorageError> {
        self.live_query(CollectionPath::schedules(), listener, |store| async move {
            load_schedules(store.as_ref()).await
        })
        .await
    }

    async fn update_schedule(&self, id: &str, patch: &SchedulePatch) -> Result<(), StorageError> {
        self.store.merge(&CollectionPath::schedules(), id, to_object(patch)?).await
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), StorageError> {
        self.store.delete(&CollectionPath::schedules(), id).await
    }

    async fn add_album(&self, name: &str) -> Result<Option<String>, StorageError> {
        let Some(name) = clean_album_name(name) else {
            return Ok(None);
        };
        let record = AlbumRecord { name: name.clone(), updated_at: Utc::now().timestamp_millis() };
        self.store.set(&CollectionPath::albums(), &name, to_object(&record)?).await?;
        Ok(Some(name))
    }

    async fn subscribe_albums(&self, listener: Listener<String>) -> Result<Subscription, StorageError> {
        self.live_query(CollectionPath::albums(), listener, |store| async move {
            load_albums(store.as_ref()).await
        })
        .await
    }

    async fn rename_album(&self, from: &str, to: &str) -> Result<(), StorageError> {
        if self.add_album(to).await?.is_some() && from != to.trim() {
            self.store.delete(&CollectionPath::albums(), from).await?;
        }
        Ok(())
    }

    async fn remove_album(&self, name: &str) -> Result<(), StorageError> {
        self.store.delete(&CollectionPath::albums(), name).await
    }

    async fn append_activity_log(&self, log: &ActivityLog) -> Result<String, StorageError> {
        let document = to_object(&ActivityLog { id: None, ..log.clone() })?;
        self.store.add(&CollectionPath::activity_logs(), document).await
    }

    async fn load_activity_logs(&self) -> Result<Vec<ActivityLog>, StorageError> {
        let collection = CollectionPath::activity_logs();
        let documents = self.store.query(&collection, None).await?;
        let mut logs: Vec<ActivityLog> = decode_all(&collection, documents);
        logs.sort_by_key(|log| log.timestamp);
        Ok(logs)
    }
}
