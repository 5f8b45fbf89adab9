
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use family_album::{
    entities::{
        activity_log::ActivityAction,
        comment::CommentPatch,
        family_config::FamilyConfig,
        photo::PhotoPatch,
    },
    errors::StorageError,
    kv::{KeyValueStore, MemoryKeyValueStore},
    repositories::{BackendKind, GatewayState, PersistenceGateway, SubscriptionKey},
    settings::AppConfig,
};
use serde_json::json;
use test_utils::*;

#[tokio::test]
async fn gateway_starts_uninitialized_and_serves_locally() {
    let gateway = PersistenceGateway::new(Arc::new(MemoryKeyValueStore::new()), test_options());
    assert_eq!(gateway.state(), GatewayState::Uninitialized);
    assert_eq!(gateway.active_kind(), BackendKind::Local);

    gateway.use_local_only();
    assert_eq!(gateway.state(), GatewayState::LocalOnly);
}

#[tokio::test]
async fn created_photo_reads_back_unchanged() {
    let gateway = local_gateway();
    let photo = sample_photo("beach", 1_710_460_800_000);

    let id = gateway.create_photo(&photo).await.unwrap();
    assert_eq!(id, photo.id);

    let photos = gateway.fetch_photos().await.unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].date_group, photo.date_group);
    assert_eq!(photos[0].url, photo.url);
    assert_eq!(photos[0].id, photo.id);
}

#[tokio::test]
async fn photos_are_listed_newest_first() {
    let gateway = local_gateway();
    gateway.create_photo(&sample_photo("older", 1_000)).await.unwrap();
    gateway.create_photo(&sample_photo("newer", 2_000)).await.unwrap();

    let photos = gateway.fetch_photos().await.unwrap();
    let names: Vec<&str> = photos.iter().map(|p| p.name_base.as_str()).collect();
    assert_eq!(names, ["newer", "older"]);
}

#[tokio::test]
async fn imported_older_photo_is_listed_by_timestamp() {
    let gateway = local_gateway();
    gateway.create_photo(&sample_photo("recent", 3_000)).await.unwrap();
    gateway.create_photo(&sample_photo("imported", 1_000)).await.unwrap();
    gateway.create_photo(&sample_photo("middle", 2_000)).await.unwrap();

    let photos = gateway.fetch_photos().await.unwrap();
    let names: Vec<&str> = photos.iter().map(|p| p.name_base.as_str()).collect();
    assert_eq!(names, ["recent", "middle", "imported"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_writers_do_not_lose_records() {
    let gateway = local_gateway();
    gateway.create_photo(&sample_photo("p", 1_000)).await.unwrap();

    let tasks: Vec<_> = (0..200)
        .map(|n| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let comment = sample_comment("👩‍💼 엄마", &format!("댓글 {}", n), n);
                gateway.add_comment("p_1000", &comment).await.unwrap();
                gateway
                    .save_activity_log(ActivityAction::Comment, "👩‍💼 엄마", json!({ "n": n }))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(gateway.fetch_comments("p_1000").await.unwrap().len(), 200);
    assert_eq!(gateway.load_activity_logs().await.unwrap().len(), 200);
    assert_eq!(gateway.fetch_photos().await.unwrap()[0].comment_count, Some(200));
}

#[tokio::test]
async fn deleting_photo_removes_all_its_comments() {
    let gateway = local_gateway();
    let photo = sample_photo("party", 1_000);
    gateway.create_photo(&photo).await.unwrap();

    for (i, text) in ["귀여워", "최고", "사랑해"].iter().enumerate() {
        gateway
            .add_comment(&photo.id, &sample_comment("👵 할머니", text, i as i64))
            .await
            .unwrap();
    }
    assert_eq!(gateway.fetch_comments(&photo.id).await.unwrap().len(), 3);
    assert_eq!(gateway.fetch_photos().await.unwrap()[0].comment_count, Some(3));

    gateway.delete_photo(&photo.id).await.unwrap();

    assert!(gateway.fetch_comments(&photo.id).await.unwrap().is_empty());
    assert!(gateway.fetch_photos().await.unwrap().is_empty());
}

#[tokio::test]
async fn comments_are_oldest_first_and_editable() {
    let gateway = local_gateway();
    let photo = sample_photo("park", 1_000);
    gateway.create_photo(&photo).await.unwrap();

    let late = gateway.add_comment(&photo.id, &sample_comment("👨‍💼 아빠", "second", 20)).await.unwrap();
    gateway.add_comment(&photo.id, &sample_comment("👩‍💼 엄마", "first", 10)).await.unwrap();

    let patch = CommentPatch { text: Some("edited".to_string()) };
    gateway.update_comment(&photo.id, &late, &patch).await.unwrap();

    let comments = gateway.fetch_comments(&photo.id).await.unwrap();
    let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["first", "edited"]);

    gateway.delete_comment(&photo.id, &late).await.unwrap();
    assert_eq!(gateway.fetch_comments(&photo.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn photo_patch_keeps_group_key() {
    let gateway = local_gateway();
    let photo = sample_photo("swing", 1_000);
    gateway.create_photo(&photo).await.unwrap();

    let albums = ["100일".to_string()].into_iter().collect();
    gateway.update_photo(&photo.id, &PhotoPatch::albums(albums)).await.unwrap();

    let stored = &gateway.fetch_photos().await.unwrap()[0];
    assert!(stored.albums.contains("100일"));
    assert_eq!(stored.date_group, photo.date_group);
}

#[tokio::test]
async fn updating_missing_photo_is_not_found() {
    let gateway = local_gateway();
    let err = gateway
        .update_photo("nope", &PhotoPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
    assert_eq!(gateway.state(), GatewayState::LocalOnly);
}

#[tokio::test]
async fn local_subscription_delivers_one_snapshot() {
    let gateway = local_gateway();
    gateway.create_photo(&sample_photo("snap", 1_000)).await.unwrap();

    let (on_update, mut rx) = collector();
    let subscription = gateway.subscribe_photos(on_update, |_| {}).await.unwrap();

    assert_eq!(next_update(&mut rx).await.len(), 1);
    assert!(gateway.is_subscribed(&SubscriptionKey::Photos));
    assert!(gateway.unsubscribe(&SubscriptionKey::Photos));
    assert!(!gateway.is_subscribed(&SubscriptionKey::Photos));
    assert!(!gateway.unsubscribe(&SubscriptionKey::Photos));

    subscription.cancel();
    subscription.cancel();
    assert!(!subscription.is_active());
}

#[tokio::test]
async fn albums_fall_back_to_defaults_and_rename() {
    let gateway = local_gateway();
    assert_eq!(gateway.fetch_albums().await.unwrap(), ["100일", "돌잔치"]);

    assert_eq!(gateway.add_album("  첫걸음마 ").await.unwrap().as_deref(), Some("첫걸음마"));
    assert_eq!(gateway.add_album("   ").await.unwrap(), None);
    gateway.rename_album("돌잔치", "첫돌").await.unwrap();
    gateway.remove_album("100일").await.unwrap();

    assert_eq!(gateway.fetch_albums().await.unwrap(), ["첫돌", "첫걸음마"]);
}

#[tokio::test]
async fn activity_logs_are_capped_to_most_recent() {
    let gateway = local_gateway();

    for i in 0..1005 {
        gateway
            .save_activity_log(ActivityAction::Comment, "🌟 아기", json!({ "n": i }))
            .await
            .unwrap();
    }

    let logs = gateway.load_activity_logs().await.unwrap();
    assert_eq!(logs.len(), 1000);
    assert_eq!(logs.first().unwrap().details["n"], 5);
    assert_eq!(logs.last().unwrap().details["n"], 1004);
}

#[tokio::test(start_paused = true)]
async fn upload_logs_are_throttled_per_window() {
    let gateway = local_gateway();

    let first = gateway
        .save_activity_log(ActivityAction::Upload, "👩‍💼 엄마", json!({ "photoId": "a" }))
        .await
        .unwrap();
    let second = gateway
        .save_activity_log(ActivityAction::Upload, "👩‍💼 엄마", json!({ "photoId": "b" }))
        .await
        .unwrap();
    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(gateway.load_activity_logs().await.unwrap().len(), 1);

    tokio::time::advance(Duration::from_secs(301)).await;

    let third = gateway
        .save_activity_log(ActivityAction::Upload, "👩‍💼 엄마", json!({ "photoId": "c" }))
        .await
        .unwrap();
    assert!(third.is_some());
    assert_eq!(gateway.load_activity_logs().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn other_actions_are_never_throttled() {
    let gateway = local_gateway();
    gateway.save_activity_log(ActivityAction::Upload, "a", json!({})).await.unwrap();
    for _ in 0..3 {
        let id = gateway.save_activity_log(ActivityAction::Login, "a", json!({})).await.unwrap();
        assert!(id.is_some());
    }
    assert_eq!(gateway.load_activity_logs().await.unwrap().len(), 4);
}

/// Store whose writes fail, counting attempts.
struct FailingWrites {
    inner: MemoryKeyValueStore,
    writes: AtomicUsize,
}

impl KeyValueStore for FailingWrites {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }
    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable("disk full".into()))
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys()
    }
}

#[tokio::test(start_paused = true)]
async fn failed_upload_log_does_not_start_the_window() {
    let store = Arc::new(FailingWrites { inner: MemoryKeyValueStore::new(), writes: AtomicUsize::new(0) });
    let gateway = PersistenceGateway::new(store.clone(), test_options());
    gateway.use_local_only();

    for _ in 0..2 {
        let result = gateway.save_activity_log(ActivityAction::Upload, "a", json!({})).await;
        assert!(result.is_err());
    }
    // Both attempts reached the store: the first failure released the window.
    assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    assert_eq!(gateway.state(), GatewayState::LocalOnly);
}

#[tokio::test]
async fn current_user_and_family_config_persist_locally() {
    let gateway = local_gateway();
    assert_eq!(gateway.current_user().unwrap(), None);
    assert!(!gateway.is_configured().unwrap());

    gateway.set_current_user("👨‍💼 아빠").unwrap();
    assert_eq!(gateway.current_user().unwrap().as_deref(), Some("👨‍💼 아빠"));
    gateway.clear_current_user().unwrap();
    assert_eq!(gateway.current_user().unwrap(), None);

    let defaults = FamilyConfig::defaults(&AppConfig::default());
    let mut config = gateway.load_family_config(defaults.clone()).unwrap();
    assert_eq!(config, defaults);

    config.theme = "pastel".to_string();
    config.members = vec!["아빠".to_string(), "엄마".to_string()];
    gateway.save_family_config(&config).unwrap();

    assert!(gateway.is_configured().unwrap());
    assert_eq!(gateway.load_family_config(defaults).unwrap(), config);
}

#[tokio::test]
async fn malformed_local_data_reads_as_empty() {
    let store = Arc::new(MemoryKeyValueStore::new());
    store.set("familyPhotos", "{not json").unwrap();
    store.set("familySchedules", r#"[{"bogus": true}]"#).unwrap();

    let gateway = PersistenceGateway::new(store, test_options());
    gateway.use_local_only();

    assert!(gateway.fetch_photos().await.unwrap().is_empty());
    assert!(gateway.fetch_schedules().await.unwrap().is_empty());
}

#[tokio::test]
async fn cleanup_resets_the_gateway() {
    let gateway = local_gateway();
    gateway.subscribe_albums(|_| {}, |_| {}).await.unwrap();
    assert_eq!(gateway.subscription_count(), 1);

    gateway.cleanup();

    assert_eq!(gateway.subscription_count(), 0);
    assert_eq!(gateway.state(), GatewayState::Uninitialized);
}
