use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{
    apply_order, generate_document_id, ChangeStream, CollectionPath, Document, DocumentStore,
    OrderBy, StoredDocument,
};
use crate::errors::StorageError;

const CHANGE_BUFFER: usize = 256;

/// In-process document store with a broadcast change feed.
///
/// Stands in for the hosted store in tests and single-node setups. The
/// `set_reachable` / `set_fail_increments` switches simulate outages.
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    changes: broadcast::Sender<String>,
    reachable: AtomicBool,
    fail_increments: AtomicBool,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        MemoryDocumentStore {
            collections: RwLock::new(HashMap::new()),
            changes,
            reachable: AtomicBool::new(true),
            fail_increments: AtomicBool::new(false),
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }

    /// Raw document access for assertions, bypassing reachability.
    pub fn document(&self, collection: &CollectionPath, id: &str) -> Option<Document> {
        self.collections
            .read()
            .get(collection.as_str())
            .and_then(|docs| docs.get(id).cloned())
    }

    pub fn collection_len(&self, collection: &CollectionPath) -> usize {
        self.collections
            .read()
            .get(collection.as_str())
            .map_or(0, |docs| docs.len())
    }

    fn ensure_reachable(&self) -> Result<(), StorageError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("document store unreachable".into()))
        }
    }

    fn notify(&self, collection: &CollectionPath) {
        // No receivers is fine: nobody is watching.
        let _ = self.changes.send(collection.as_str().to_string());
    }

    fn not_found(collection: &CollectionPath, id: &str) -> StorageError {
        StorageError::NotFound(format!("{}/{}", collection, id))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn connect(&self) -> Result<(), StorageError> {
        self.ensure_reachable()
    }

    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<String, StorageError> {
        self.ensure_reachable()?;
        let id = generate_document_id();
        self.collections
            .write()
            .entry(collection.as_str().to_string())
            .or_default()
            .insert(id.clone(), data);
        self.notify(collection);
        Ok(id)
    }

    async fn set(&self, collection: &CollectionPath, id: &str, data: Document) -> Result<(), StorageError> {
        self.ensure_reachable()?;
        self.collections
            .write()
            .entry(collection.as_str().to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.notify(collection);
        Ok(())
    }

    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<StoredDocument>, StorageError> {
        self.ensure_reachable()?;
        Ok(self.document(collection, id).map(|data| StoredDocument { id: id.to_string(), data }))
    }

    async fn merge(&self, collection: &CollectionPath, id: &str, fields: Document) -> Result<(), StorageError> {
        self.ensure_reachable()?;
        {
            let mut collections = self.collections.write();
            let doc = collections
                .get_mut(collection.as_str())
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| Self::not_found(collection, id))?;
            doc.extend(fields);
        }
        self.notify(collection);
        Ok(())
    }

    async fn increment(
        &self,
        collection: &CollectionPath,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StorageError> {
        self.ensure_reachable()?;
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(StorageError::Remote("increment rejected".into()));
        }
        {
            let mut collections = self.collections.write();
            let doc = collections
                .get_mut(collection.as_str())
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| Self::not_found(collection, id))?;
            let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
            doc.insert(field.to_string(), Value::from(current + delta));
        }
        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StorageError> {
        self.ensure_reachable()?;
        let removed = self
            .collections
            .write()
            .get_mut(collection.as_str())
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.notify(collection);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        order: Option<OrderBy>,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        self.ensure_reachable()?;
        let documents = self
            .collections
            .read()
            .get(collection.as_str())
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| StoredDocument { id: id.clone(), data: data.clone() })
                    .collect()
            })
            .unwrap_or_default();
        Ok(apply_order(documents, order))
    }

    async fn watch(&self, collection: &CollectionPath) -> Result<ChangeStream, StorageError> {
        self.ensure_reachable()?;
        let target = collection.as_str().to_string();
        let receiver = self.changes.subscribe();

        let stream = futures::stream::unfold((receiver, target), |(mut receiver, target)| async move {
            loop {
                match receiver.recv().await {
                    Ok(path) if path == target => return Some(((), (receiver, target))),
                    Ok(_) => continue,
                    // Missed notifications still mean "something changed"
                    Err(RecvError::Lagged(_)) => return Some(((), (receiver, target))),
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}
