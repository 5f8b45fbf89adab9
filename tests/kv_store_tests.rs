
use std::sync::Arc;

use family_album::{
    kv::{read_json, read_list, write_json, FileKeyValueStore, KeyValueStore},
    repositories::PersistenceGateway,
};
use tempfile::tempdir;
use test_utils::*;

#[test]
fn file_store_round_trips_values() {
    let dir = tempdir().unwrap();
    let store = FileKeyValueStore::open(dir.path()).unwrap();

    assert_eq!(store.get("currentUser").unwrap(), None);
    store.set("currentUser", "\"엄마\"").unwrap();
    assert_eq!(store.get("currentUser").unwrap().as_deref(), Some("\"엄마\""));

    store.remove("currentUser").unwrap();
    store.remove("currentUser").unwrap();
    assert_eq!(store.get("currentUser").unwrap(), None);
}

#[test]
fn file_store_keys_survive_encoding() {
    let dir = tempdir().unwrap();
    let store = FileKeyValueStore::open(dir.path().join("profile")).unwrap();

    store.set("comments_photo/1", "[]").unwrap();
    store.set("familyPhotos", "[]").unwrap();

    assert_eq!(store.keys().unwrap(), ["comments_photo/1", "familyPhotos"]);
}

#[test]
fn file_store_is_durable_across_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = FileKeyValueStore::open(dir.path()).unwrap();
        write_json(&store, "growthRecords", &vec![1, 2, 3]).unwrap();
    }

    let reopened = FileKeyValueStore::open(dir.path()).unwrap();
    let values: Option<Vec<i32>> = read_json(&reopened, "growthRecords").unwrap();
    assert_eq!(values, Some(vec![1, 2, 3]));
}

#[test]
fn malformed_values_read_as_absent_and_bad_entries_are_skipped() {
    let dir = tempdir().unwrap();
    let store = FileKeyValueStore::open(dir.path()).unwrap();

    store.set("broken", "{oops").unwrap();
    let broken: Option<Vec<i32>> = read_json(&store, "broken").unwrap();
    assert_eq!(broken, None);

    store.set("mixed", r#"[1, "two", 3]"#).unwrap();
    let mixed: Vec<i32> = read_list(&store, "mixed").unwrap();
    assert_eq!(mixed, [1, 3]);
}

#[tokio::test]
async fn local_gateway_data_survives_restart() {
    let dir = tempdir().unwrap();
    let photo = sample_photo("first-steps", 1_000);

    {
        let store = Arc::new(FileKeyValueStore::open(dir.path()).unwrap());
        let gateway = PersistenceGateway::new(store, test_options());
        gateway.use_local_only();
        gateway.create_photo(&photo).await.unwrap();
        gateway.set_current_user("👨‍💼 아빠").unwrap();
    }

    let store = Arc::new(FileKeyValueStore::open(dir.path()).unwrap());
    let gateway = PersistenceGateway::new(store, test_options());
    gateway.use_local_only();

    let photos = gateway.fetch_photos().await.unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].date_group, photo.date_group);
    assert_eq!(gateway.current_user().unwrap().as_deref(), Some("👨‍💼 아빠"));
}
