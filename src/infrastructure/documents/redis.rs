use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use futures::StreamExt;
use redis::{AsyncCommands, Client};
use serde_json::Value;

use super::{
    apply_order, generate_document_id, ChangeStream, CollectionPath, Document, DocumentStore,
    OrderBy, StoredDocument,
};
use crate::{errors::StorageError, settings::RemoteCredentials};

const MERGE_ATTEMPTS: usize = 8;

/// Document store on Redis.
///
/// Layout per collection path `p` under namespace `ns`:
/// - `ns:docs:p` hash of id -> document JSON
/// - `ns:counters:p:field` hash of id -> integer, overlaid on reads
/// - `ns:counter-fields:p` set of counter field names
/// - `ns:changes:p` pub/sub channel, one message per write
pub struct RedisDocumentStore {
    pool: Pool,
    client: Client,
    namespace: String,
}

impl RedisDocumentStore {
    pub fn new(credentials: &RemoteCredentials) -> Result<Self, StorageError> {
        if !credentials.is_complete() {
            return Err(StorageError::Configuration("remote url and namespace are required".into()));
        }
        let client = Client::open(credentials.url.as_str())?;
        let pool = PoolConfig::from_url(credentials.url.clone()).create_pool(Some(Runtime::Tokio1))?;

        Ok(RedisDocumentStore {
            pool,
            client,
            namespace: credentials.namespace.clone(),
        })
    }

    fn docs_key(&self, collection: &CollectionPath) -> String {
        format!("{}:docs:{}", self.namespace, collection)
    }

    fn counter_key(&self, collection: &CollectionPath, field: &str) -> String {
        format!("{}:counters:{}:{}", self.namespace, collection, field)
    }

    fn counter_fields_key(&self, collection: &CollectionPath) -> String {
        format!("{}:counter-fields:{}", self.namespace, collection)
    }

    fn channel(&self, collection: &CollectionPath) -> String {
        format!("{}:changes:{}", self.namespace, collection)
    }

    async fn connection(&self) -> Result<Connection, StorageError> {
        Ok(self.pool.get().await?)
    }

    async fn publish(&self, conn: &mut Connection, collection: &CollectionPath) -> Result<(), StorageError> {
        let _: i64 = conn.publish(self.channel(collection), "changed").await?;
        Ok(())
    }

    fn decode(id: &str, raw: &str) -> Result<Document, StorageError> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Serialization(format!("document {} is not an object", id))),
        }
    }

    /// Counter values per field for the collection.
    async fn counters(
        &self,
        conn: &mut Connection,
        collection: &CollectionPath,
    ) -> Result<Vec<(String, HashMap<String, i64>)>, StorageError> {
        let fields: Vec<String> = conn.smembers(self.counter_fields_key(collection)).await?;
        let mut counters = Vec::with_capacity(fields.len());
        for field in fields {
            let values: HashMap<String, i64> = conn.hgetall(self.counter_key(collection, &field)).await?;
            counters.push((field, values));
        }
        Ok(counters)
    }

    fn overlay(id: &str, doc: &mut Document, counters: &[(String, HashMap<String, i64>)]) {
        for (field, values) in counters {
            if let Some(value) = values.get(id) {
                doc.insert(field.clone(), Value::from(*value));
            }
        }
    }

    async fn write_document(
        &self,
        conn: &mut Connection,
        collection: &CollectionPath,
        id: &str,
        data: &Document,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(data)?;
        let _: () = conn.hset(self.docs_key(collection), id, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn connect(&self) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StorageError::Unavailable(format!("unexpected PING reply: {}", pong)));
        }
        tracing::info!("Connected to remote document store (namespace '{}')", self.namespace);
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<String, StorageError> {
        let id = generate_document_id();
        self.set(collection, &id, data).await?;
        Ok(id)
    }

    async fn set(&self, collection: &CollectionPath, id: &str, data: Document) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        self.write_document(&mut conn, collection, id, &data).await?;
        self.publish(&mut conn, collection).await
    }

    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<StoredDocument>, StorageError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.hget(self.docs_key(collection), id).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let mut data = Self::decode(id, &raw)?;
        let counters = self.counters(&mut conn, collection).await?;
        Self::overlay(id, &mut data, &counters);
        Ok(Some(StoredDocument { id: id.to_string(), data }))
    }

    /// Optimistic field merge: `WATCH` the collection hash, rewrite the
    /// document in `MULTI`/`EXEC`, retry when another client got there first.
    async fn merge(&self, collection: &CollectionPath, id: &str, fields: Document) -> Result<(), StorageError> {
        let key = self.docs_key(collection);
        let mut conn = self.connection().await?;

        for attempt in 1..=MERGE_ATTEMPTS {
            let _: () = redis::cmd("WATCH").arg(&key).query_async(&mut conn).await?;
            let raw: Option<String> = conn.hget(&key, id).await?;
            let Some(raw) = raw else {
                let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await?;
                return Err(StorageError::NotFound(format!("{}/{}", collection, id)));
            };

            let mut data = Self::decode(id, &raw)?;
            data.extend(fields.clone());
            let merged = serde_json::to_string(&data)?;

            let committed: Option<(i64,)> = redis::pipe()
                .atomic()
                .hset(&key, id, merged)
                .query_async(&mut conn)
                .await?;
            if committed.is_some() {
                return self.publish(&mut conn, collection).await;
            }
            tracing::debug!("Merge of {}/{} raced another writer (attempt {})", collection, id, attempt);
        }

        Err(StorageError::Conflict(format!("{}/{}", collection, id)))
    }

    async fn increment(
        &self,
        collection: &CollectionPath,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.hexists(self.docs_key(collection), id).await?;
        if !exists {
            return Err(StorageError::NotFound(format!("{}/{}", collection, id)));
        }

        // Seed the counter from the stored field so legacy values carry over.
        let counter_key = self.counter_key(collection, field);
        let seeded: bool = conn.hexists(&counter_key, id).await?;
        if !seeded {
            let raw: Option<String> = conn.hget(self.docs_key(collection), id).await?;
            let base = raw
                .and_then(|raw| Self::decode(id, &raw).ok())
                .and_then(|doc| doc.get(field).and_then(Value::as_i64))
                .unwrap_or(0);
            let _: bool = conn.hset_nx(&counter_key, id, base).await?;
        }

        let _: i64 = conn.sadd(self.counter_fields_key(collection), field).await?;
        let _: i64 = conn.hincr(&counter_key, id, delta).await?;
        self.publish(&mut conn, collection).await
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.hdel(self.docs_key(collection), id).await?;

        let fields: Vec<String> = conn.smembers(self.counter_fields_key(collection)).await?;
        for field in fields {
            let _: i64 = conn.hdel(self.counter_key(collection, &field), id).await?;
        }

        if removed > 0 {
            self.publish(&mut conn, collection).await?;
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        order: Option<OrderBy>,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        let mut conn = self.connection().await?;
        let entries: HashMap<String, String> = conn.hgetall(self.docs_key(collection)).await?;
        let counters = self.counters(&mut conn, collection).await?;

        let mut documents = Vec::with_capacity(entries.len());
        for (id, raw) in entries {
            match Self::decode(&id, &raw) {
                Ok(mut data) => {
                    Self::overlay(&id, &mut data, &counters);
                    documents.push(StoredDocument { id, data });
                }
                Err(e) => tracing::warn!("Skipping unreadable document {}/{}: {}", collection, id, e),
            }
        }
        documents.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(apply_order(documents, order))
    }

    async fn count(&self, collection: &CollectionPath) -> Result<usize, StorageError> {
        let mut conn = self.connection().await?;
        let len: usize = conn.hlen(self.docs_key(collection)).await?;
        Ok(len)
    }

    async fn watch(&self, collection: &CollectionPath) -> Result<ChangeStream, StorageError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(self.channel(collection)).await?;
        Ok(pubsub.into_on_message().map(|_| ()).boxed())
    }
}
