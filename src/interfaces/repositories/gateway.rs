use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use super::{
    backend::{BackendKind, Listener, StorageBackend, Subscription},
    local::LocalBackend,
    remote::RemoteBackend,
    subscriptions::{SubscriptionKey, SubscriptionRegistry},
};
use crate::{
    constants::{CURRENT_USER_KEY, DEFAULT_ACTIVITY_LOG_CAP, FAMILY_CONFIG_KEY, SETUP_DONE_KEY, UPLOAD_LOG_INTERVAL_SECS},
    entities::{
        activity_log::{ActivityAction, ActivityLog},
        comment::{Comment, CommentPatch},
        family_config::FamilyConfig,
        photo::{Photo, PhotoPatch},
        schedule::{Schedule, SchedulePatch},
    },
    errors::StorageError,
    infrastructure::{
        documents::{DocumentStore, RedisDocumentStore},
        kv::{read_json, write_json, KeyValueStore},
        limiter::throttle::Throttle,
    },
    settings::{AppConfig, RemoteCredentials},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    Uninitialized,
    LocalOnly,
    RemoteAttempting,
    RemoteActive,
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub activity_log_cap: usize,
    pub default_albums: Vec<String>,
    pub upload_log_interval: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        GatewayOptions {
            activity_log_cap: DEFAULT_ACTIVITY_LOG_CAP,
            default_albums: Vec::new(),
            upload_log_interval: Duration::from_secs(UPLOAD_LOG_INTERVAL_SECS),
        }
    }
}

impl From<&AppConfig> for GatewayOptions {
    fn from(config: &AppConfig) -> Self {
        GatewayOptions {
            activity_log_cap: config.activity_log_cap,
            default_albums: config.default_albums.clone(),
            upload_log_interval: config.upload_log_interval(),
        }
    }
}

/// Single entry point for persistence.
///
/// Starts on the local store. `init_remote` may promote it to the shared
/// document store; any failed remote request or response demotes it back
/// to local for the rest of the session. Live queries are tracked by key so
/// at most one exists per collection (per photo for comments).
pub struct PersistenceGateway {
    local_store: Arc<dyn KeyValueStore>,
    local: Arc<LocalBackend>,
    remote: RwLock<Option<Arc<RemoteBackend>>>,
    state: RwLock<GatewayState>,
    subscriptions: SubscriptionRegistry,
    upload_throttle: Throttle,
}

fn demotes(err: &StorageError) -> bool {
    matches!(err, StorageError::Unavailable(_) | StorageError::Remote(_))
}

impl PersistenceGateway {
    pub fn new(local_store: Arc<dyn KeyValueStore>, options: GatewayOptions) -> Self {
        let local = Arc::new(LocalBackend::new(
            Arc::clone(&local_store),
            options.activity_log_cap,
            options.default_albums,
        ));
        PersistenceGateway {
            local_store,
            local,
            remote: RwLock::new(None),
            state: RwLock::new(GatewayState::Uninitialized),
            subscriptions: SubscriptionRegistry::new(),
            upload_throttle: Throttle::new(options.upload_log_interval),
        }
    }

    pub fn state(&self) -> GatewayState {
        *self.state.read()
    }

    pub fn active_kind(&self) -> BackendKind {
        self.backend().kind()
    }

    pub fn local_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.local_store)
    }

    pub fn use_local_only(&self) {
        self.subscriptions.cancel_all();
        *self.remote.write() = None;
        *self.state.write() = GatewayState::LocalOnly;
        tracing::info!("Persistence running on the local store");
    }

    /// Connects to the document store described by `credentials`. Missing
    /// credentials or a failed connection leave the gateway on local storage.
    pub async fn init_remote(&self, credentials: &RemoteCredentials) -> bool {
        if !credentials.is_complete() {
            tracing::warn!("Remote credentials incomplete, staying on local storage");
            self.use_local_only();
            return false;
        }
        match RedisDocumentStore::new(credentials) {
            Ok(store) => self.init_remote_with(Arc::new(store)).await,
            Err(e) => {
                tracing::warn!("Remote store setup failed, staying on local storage: {}", e);
                self.use_local_only();
                false
            }
        }
    }

    pub async fn init_remote_with(&self, store: Arc<dyn DocumentStore>) -> bool {
        self.subscriptions.cancel_all();
        *self.state.write() = GatewayState::RemoteAttempting;

        match store.connect().await {
            Ok(()) => {
                *self.remote.write() = Some(Arc::new(RemoteBackend::new(store)));
                *self.state.write() = GatewayState::RemoteActive;
                tracing::info!("Persistence running on the remote store");
                true
            }
            Err(e) => {
                tracing::warn!("Remote store connection failed, falling back to local: {}", e);
                self.use_local_only();
                false
            }
        }
    }

    fn backend(&self) -> Arc<dyn StorageBackend> {
        if *self.state.read() == GatewayState::RemoteActive {
            if let Some(remote) = self.remote.read().as_ref() {
                return Arc::clone(remote) as Arc<dyn StorageBackend>;
            }
        }
        Arc::clone(&self.local) as Arc<dyn StorageBackend>
    }

    fn demote(&self, err: &StorageError) {
        let was_remote = {
            let mut state = self.state.write();
            let was_remote = *state == GatewayState::RemoteActive;
            *state = GatewayState::LocalOnly;
            was_remote
        };
        if was_remote {
            tracing::warn!("Remote store failed ({}), continuing on local storage", err);
            *self.remote.write() = None;
            self.subscriptions.cancel_all();
        }
    }

    /// Runs `op` on the active backend, demoting on remote transport failures.
    async fn dispatch<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(Arc<dyn StorageBackend>) -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let backend = self.backend();
        let kind = backend.kind();
        let result = op(backend).await;

        if let Err(e) = &result {
            tracing::error!("{} failed on {:?} backend: {}", op_name, kind, e);
            if kind == BackendKind::Remote && demotes(e) {
                self.demote(e);
            }
        }
        result
    }

    /// Opens a live query under `key`, replacing any existing one.
    async fn subscribe_keyed<T, F, Fut>(
        &self,
        key: SubscriptionKey,
        listener: Listener<T>,
        open: F,
    ) -> Result<Subscription, StorageError>
    where
        F: FnOnce(Arc<dyn StorageBackend>, Listener<T>) -> Fut,
        Fut: Future<Output = Result<Subscription, StorageError>>,
    {
        self.subscriptions.cancel(&key);
        let subscription = self
            .dispatch("subscribe", |backend| open(backend, listener))
            .await?;
        self.subscriptions.register(key, subscription.clone());
        Ok(subscription)
    }

    /// First result set of a short-lived query that is not tracked by key.
    async fn snapshot<T, F, Fut>(&self, open: F) -> Result<Vec<T>, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn StorageBackend>, Listener<T>) -> Fut,
        Fut: Future<Output = Result<Subscription, StorageError>>,
    {
        let (tx, rx) = oneshot::channel::<Result<Vec<T>, StorageError>>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let error_tx = Arc::clone(&tx);
        let listener = Listener::new(
            move |items| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(Ok(items));
                }
            },
            move |err| {
                if let Some(tx) = error_tx.lock().take() {
                    let _ = tx.send(Err(err));
                }
            },
        );

        let subscription = self.dispatch("snapshot", |backend| open(backend, listener)).await?;
        let result = rx.await;
        subscription.cancel();
        result.map_err(|_| StorageError::Unavailable("query ended before delivering".into()))?
    }

    pub fn unsubscribe(&self, key: &SubscriptionKey) -> bool {
        self.subscriptions.cancel(key)
    }

    pub fn is_subscribed(&self, key: &SubscriptionKey) -> bool {
        self.subscriptions.contains(key)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // Photos

    pub async fn create_photo(&self, photo: &Photo) -> Result<String, StorageError> {
        self.dispatch("create_photo", |b| async move { b.create_photo(photo).await }).await
    }

    pub async fn subscribe_photos(
        &self,
        on_update: impl Fn(Vec<Photo>) + Send + Sync + 'static,
        on_error: impl Fn(StorageError) + Send + Sync + 'static,
    ) -> Result<Subscription, StorageError> {
        let listener = Listener::new(on_update, on_error);
        self.subscribe_keyed(SubscriptionKey::Photos, listener, |b, l| async move {
            b.subscribe_photos(l).await
        })
        .await
    }

    pub async fn fetch_photos(&self) -> Result<Vec<Photo>, StorageError> {
        self.snapshot(|b, l| async move { b.subscribe_photos(l).await }).await
    }

    pub async fn update_photo(&self, id: &str, patch: &PhotoPatch) -> Result<(), StorageError> {
        self.dispatch("update_photo", |b| async move { b.update_photo(id, patch).await }).await
    }

    pub async fn delete_photo(&self, id: &str) -> Result<(), StorageError> {
        self.dispatch("delete_photo", |b| async move { b.delete_photo(id).await }).await?;
        self.subscriptions.cancel(&SubscriptionKey::Comments(id.to_string()));
        Ok(())
    }

    pub async fn recount_comments(&self, photo_id: &str) -> Result<u64, StorageError> {
        self.dispatch("recount_comments", |b| async move { b.recount_comments(photo_id).await })
            .await
    }

    // Comments

    pub async fn add_comment(&self, photo_id: &str, comment: &Comment) -> Result<String, StorageError> {
        self.dispatch("add_comment", |b| async move { b.add_comment(photo_id, comment).await })
            .await
    }

    pub async fn subscribe_comments(
        &self,
        photo_id: &str,
        on_update: impl Fn(Vec<Comment>) + Send + Sync + 'static,
        on_error: impl Fn(StorageError) + Send + Sync + 'static,
    ) -> Result<Subscription, StorageError> {
        let listener = Listener::new(on_update, on_error);
        let key = SubscriptionKey::Comments(photo_id.to_string());
        self.subscribe_keyed(key, listener, |b, l| async move {
            b.subscribe_comments(photo_id, l).await
        })
        .await
    }

    pub async fn fetch_comments(&self, photo_id: &str) -> Result<Vec<Comment>, StorageError> {
        self.snapshot(|b, l| async move { b.subscribe_comments(photo_id, l).await })
            .await
    }

    pub async fn update_comment(
        &self,
        photo_id: &str,
        comment_id: &str,
        patch: &CommentPatch,
    ) -> Result<(), StorageError> {
        self.dispatch("update_comment", |b| async move {
            b.update_comment(photo_id, comment_id, patch).await
        })
        .await
    }

    pub async fn delete_comment(&self, photo_id: &str, comment_id: &str) -> Result<(), StorageError> {
        self.dispatch("delete_comment", |b| async move {
            b.delete_comment(photo_id, comment_id).await
        })
        .await
    }

    // Schedules

    pub async fn create_schedule(&self, schedule: &Schedule) -> Result<String, StorageError> {
        self.dispatch("create_schedule", |b| async move { b.create_schedule(schedule).await })
            .await
    }

    pub async fn subscribe_schedules(
        &self,
        on_update: impl Fn(Vec<Schedule>) + Send + Sync + 'static,
        on_error: impl Fn(StorageError) + Send + Sync + 'static,
    ) -> Result<Subscription, StorageError> {
        let listener = Listener::new(on_update, on_error);
        self.subscribe_keyed(SubscriptionKey::Schedules, listener, |b, l| async move {
            b.subscribe_schedules(l).await
        })
        .await
    }

    pub async fn fetch_schedules(&self) -> Result<Vec<Schedule>, StorageError> {
        self.snapshot(|b, l| async move { b.subscribe_schedules(l).await }).await
    }

    pub async fn update_schedule(&self, id: &str, patch: &SchedulePatch) -> Result<(), StorageError> {
        self.dispatch("update_schedule", |b| async move { b.update_schedule(id, patch).await })
            .await
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<(), StorageError> {
        self.dispatch("delete_schedule", |b| async move { b.delete_schedule(id).await }).await
    }

    // Albums

    pub async fn add_album(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.dispatch("add_album", |b| async move { b.add_album(name).await }).await
    }

    pub async fn subscribe_albums(
        &self,
        on_update: impl Fn(Vec<String>) + Send + Sync + 'static,
        on_error: impl Fn(StorageError) + Send + Sync + 'static,
    ) -> Result<Subscription, StorageError> {
        let listener = Listener::new(on_update, on_error);
        self.subscribe_keyed(SubscriptionKey::Albums, listener, |b, l| async move {
            b.subscribe_albums(l).await
        })
        .await
    }

    pub async fn fetch_albums(&self) -> Result<Vec<String>, StorageError> {
        self.snapshot(|b, l| async move { b.subscribe_albums(l).await }).await
    }

    pub async fn rename_album(&self, from: &str, to: &str) -> Result<(), StorageError> {
        self.dispatch("rename_album", |b| async move { b.rename_album(from, to).await }).await
    }

    pub async fn remove_album(&self, name: &str) -> Result<(), StorageError> {
        self.dispatch("remove_album", |b| async move { b.remove_album(name).await }).await
    }

    // Activity logs

    /// Appends an activity log. Upload entries closer together than the
    /// upload interval are dropped and yield `Ok(None)`; the interval only
    /// restarts once an upload entry is actually stored.
    pub async fn save_activity_log(
        &self,
        action: ActivityAction,
        user: &str,
        details: Value,
    ) -> Result<Option<String>, StorageError> {
        let permit = if action == ActivityAction::Upload {
            match self.upload_throttle.try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    tracing::debug!("Upload log for {} suppressed by throttle", user);
                    return Ok(None);
                }
            }
        } else {
            None
        };

        let log = ActivityLog {
            id: None,
            action,
            user: user.to_string(),
            timestamp: Utc::now(),
            details,
        };
        let id = self
            .dispatch("append_activity_log", |b| async move { b.append_activity_log(&log).await })
            .await?;

        if let Some(permit) = permit {
            permit.commit();
        }
        Ok(Some(id))
    }

    pub async fn load_activity_logs(&self) -> Result<Vec<ActivityLog>, StorageError> {
        self.dispatch("load_activity_logs", |b| async move { b.load_activity_logs().await })
            .await
    }

    // Device-local profile data, never shared remotely

    pub fn current_user(&self) -> Result<Option<String>, StorageError> {
        read_json(self.local_store.as_ref(), CURRENT_USER_KEY)
    }

    pub fn set_current_user(&self, member: &str) -> Result<(), StorageError> {
        write_json(self.local_store.as_ref(), CURRENT_USER_KEY, member)
    }

    pub fn clear_current_user(&self) -> Result<(), StorageError> {
        self.local_store.remove(CURRENT_USER_KEY)
    }

    pub fn is_configured(&self) -> Result<bool, StorageError> {
        Ok(read_json::<bool>(self.local_store.as_ref(), SETUP_DONE_KEY)?.unwrap_or(false))
    }

    pub fn load_family_config(&self, defaults: FamilyConfig) -> Result<FamilyConfig, StorageError> {
        let stored = read_json::<Value>(self.local_store.as_ref(), FAMILY_CONFIG_KEY)?;
        Ok(FamilyConfig::merged(stored, defaults))
    }

    pub fn save_family_config(&self, config: &FamilyConfig) -> Result<(), StorageError> {
        self.local.save_family_config(config)
    }

    /// Cancels every live query and forgets the remote session.
    pub fn cleanup(&self) {
        let live = self.subscriptions.len();
        self.subscriptions.cancel_all();
        *self.remote.write() = None;
        *self.state.write() = GatewayState::Uninitialized;
        self.upload_throttle.reset();
        tracing::info!("Persistence gateway cleaned up ({} subscriptions cancelled)", live);
    }
}
