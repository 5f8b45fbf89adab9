//! Remote realtime document store seam.
//!
//! Documents are JSON objects grouped in collections addressed by slash
//! separated paths (`family-photos/{id}/comments`). Stores push change
//! notifications per collection so listeners can re-read the full result set.

use std::{cmp::Ordering, fmt};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::{
    constants::{
        ACTIVITY_LOGS_COLLECTION, ALBUMS_COLLECTION, COMMENTS_SUBCOLLECTION, PHOTOS_COLLECTION,
        SCHEDULES_COLLECTION,
    },
    errors::StorageError,
};

pub mod memory;
pub mod redis;

pub use memory::MemoryDocumentStore;
pub use self::redis::RedisDocumentStore;

pub type Document = serde_json::Map<String, Value>;

/// Yields once per change to the watched collection.
pub type ChangeStream = BoxStream<'static, ()>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn photos() -> Self {
        CollectionPath(PHOTOS_COLLECTION.to_string())
    }

    pub fn comments(photo_id: &str) -> Self {
        CollectionPath(format!("{}/{}/{}", PHOTOS_COLLECTION, photo_id, COMMENTS_SUBCOLLECTION))
    }

    pub fn albums() -> Self {
        CollectionPath(ALBUMS_COLLECTION.to_string())
    }

    pub fn schedules() -> Self {
        CollectionPath(SCHEDULES_COLLECTION.to_string())
    }

    pub fn activity_logs() -> Self {
        CollectionPath(ACTIVITY_LOGS_COLLECTION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: &'static str) -> Self {
        OrderBy { field, direction: Direction::Ascending }
    }

    pub fn desc(field: &'static str) -> Self {
        OrderBy { field, direction: Direction::Descending }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Establishes (or verifies) the session with the store.
    async fn connect(&self) -> Result<(), StorageError>;

    /// Inserts under a store-generated id and returns it.
    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<String, StorageError>;

    async fn set(&self, collection: &CollectionPath, id: &str, data: Document) -> Result<(), StorageError>;

    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<StoredDocument>, StorageError>;

    /// Shallow field merge into an existing document.
    async fn merge(&self, collection: &CollectionPath, id: &str, fields: Document) -> Result<(), StorageError>;

    /// Atomically adds `delta` to a numeric field, treating a missing field as 0.
    async fn increment(
        &self,
        collection: &CollectionPath,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StorageError>;

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StorageError>;

    /// All documents, ordered when `order` is given. Ordered queries skip
    /// documents lacking the order field.
    async fn query(
        &self,
        collection: &CollectionPath,
        order: Option<OrderBy>,
    ) -> Result<Vec<StoredDocument>, StorageError>;

    async fn count(&self, collection: &CollectionPath) -> Result<usize, StorageError> {
        Ok(self.query(collection, None).await?.len())
    }

    async fn watch(&self, collection: &CollectionPath) -> Result<ChangeStream, StorageError>;
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Applies `order` the way the store's query engine does: drop documents
/// without the field, then a stable sort on it with id as tie-breaker.
pub fn apply_order(documents: Vec<StoredDocument>, order: Option<OrderBy>) -> Vec<StoredDocument> {
    let Some(order) = order else {
        return documents;
    };

    let mut documents: Vec<StoredDocument> = documents
        .into_iter()
        .filter(|doc| doc.data.get(order.field).is_some_and(|v| !v.is_null()))
        .collect();

    documents.sort_by(|a, b| {
        let ordering = compare_values(&a.data[order.field], &b.data[order.field])
            .then_with(|| a.id.cmp(&b.id));
        match order.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });

    documents
}

/// Store-generated document id, 20 lowercase hex characters.
pub fn generate_document_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(20);
    id
}
