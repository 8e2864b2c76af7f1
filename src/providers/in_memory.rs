use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use super::{
    BlobStore, MAX_PEEK_MESSAGES, ProviderError, QueueMessage, QueueStore, Record, RecordSegment, RecordStore,
    ScanQuery,
};

/// Largest segment a single scan call returns.
const DEFAULT_SEGMENT_SIZE: usize = 1000;

type RowKey = (String, String);

/// In-memory implementation of all three storage contracts.
///
/// Tables are ordered by `(partition_key, row_key)` like a real key-ordered
/// store, scans are segmented with continuation tokens, and missing
/// resources are reported as `NotFound`. Loading helpers are synchronous so
/// fixtures can be built outside an async context.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<BTreeMap<String, BTreeMap<RowKey, Record>>>,
    queues: RwLock<BTreeMap<String, Vec<QueueMessage>>>,
    containers: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
    segment_size: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            tables: RwLock::default(),
            queues: RwLock::default(),
            containers: RwLock::default(),
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of records returned per scan segment.
    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size.max(1);
        self
    }

    pub fn create_table(&self, table: &str) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_default();
    }

    /// Inserts or replaces a record, creating the table if needed.
    pub fn insert_record(&self, table: &str, record: Record) {
        let key = (record.partition_key.clone(), record.row_key.clone());
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_default()
            .insert(key, record);
    }

    pub fn drop_table(&self, table: &str) {
        self.tables.write().unwrap_or_else(PoisonError::into_inner).remove(table);
    }

    pub fn create_queue(&self, queue: &str) {
        self.queues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(queue.to_string())
            .or_default();
    }

    /// Appends a message, creating the queue if needed. Returns the message id.
    pub fn push_message(&self, queue: &str, content: impl Into<String>, inserted_at: Option<DateTime<Utc>>) -> String {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        let messages = queues.entry(queue.to_string()).or_default();
        let message_id = format!("{queue}:{}", messages.len());
        messages.push(QueueMessage {
            message_id: message_id.clone(),
            inserted_at,
            dequeue_count: 0,
            content: content.into(),
        });
        message_id
    }

    pub fn create_container(&self, container: &str) {
        self.containers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(container.to_string())
            .or_default();
    }

    /// Stores a blob, creating the container if needed.
    pub fn put_blob(&self, container: &str, blob: &str, content: impl Into<String>) {
        self.containers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(container.to_string())
            .or_default()
            .insert(blob.to_string(), content.into());
    }

    fn table_missing(operation: &str, table: &str) -> ProviderError {
        ProviderError::not_found(operation, format!("table {table} does not exist"))
    }
}

fn encode_continuation(key: &RowKey) -> Result<String, ProviderError> {
    serde_json::to_string(key).map_err(|e| ProviderError::permanent("query_segment", format!("encode token: {e}")))
}

fn decode_continuation(token: &str) -> Result<RowKey, ProviderError> {
    serde_json::from_str(token)
        .map_err(|e| ProviderError::permanent("query_segment", format!("invalid continuation token: {e}")))
}

#[async_trait::async_trait]
impl RecordStore for InMemoryStore {
    async fn list_tables(&self) -> Result<Vec<String>, ProviderError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.keys().cloned().collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, ProviderError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.contains_key(table))
    }

    async fn query_segment(
        &self,
        table: &str,
        query: &ScanQuery,
        continuation: Option<&str>,
    ) -> Result<RecordSegment, ProviderError> {
        let start = continuation.map(decode_continuation).transpose()?;
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let rows = tables
            .get(table)
            .ok_or_else(|| Self::table_missing("query_segment", table))?;

        let page = query.page_size.unwrap_or(self.segment_size).clamp(1, self.segment_size);
        let lower = match &start {
            Some(key) => Bound::Included(key.clone()),
            None => Bound::Unbounded,
        };

        let mut segment = RecordSegment::default();
        for (key, record) in rows.range::<RowKey, _>((lower, Bound::Unbounded)) {
            if !query.matches(record) {
                continue;
            }
            if segment.records.len() == page {
                segment.continuation = Some(encode_continuation(key)?);
                break;
            }
            segment.records.push(query.shape(record));
        }
        Ok(segment)
    }

    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Record>, ProviderError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let rows = tables.get(table).ok_or_else(|| Self::table_missing("get_record", table))?;
        Ok(rows.get(&(partition_key.to_string(), row_key.to_string())).cloned())
    }
}

#[async_trait::async_trait]
impl QueueStore for InMemoryStore {
    async fn list_queues(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        Ok(queues.keys().filter(|q| q.starts_with(prefix)).cloned().collect())
    }

    async fn peek_messages(&self, queue: &str, max_count: usize) -> Result<Vec<QueueMessage>, ProviderError> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        let messages = queues
            .get(queue)
            .ok_or_else(|| ProviderError::not_found("peek_messages", format!("queue {queue} does not exist")))?;
        Ok(messages.iter().take(max_count.min(MAX_PEEK_MESSAGES)).cloned().collect())
    }

    async fn approximate_depth(&self, queue: &str) -> Result<u64, ProviderError> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        Ok(queues.get(queue).map_or(0, |m| m.len() as u64))
    }
}

#[async_trait::async_trait]
impl BlobStore for InMemoryStore {
    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        let containers = self.containers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(containers.keys().filter(|c| c.starts_with(prefix)).cloned().collect())
    }

    async fn list_blobs(&self, container: &str, limit: Option<usize>) -> Result<Vec<String>, ProviderError> {
        let containers = self.containers.read().unwrap_or_else(PoisonError::into_inner);
        let blobs = containers
            .get(container)
            .ok_or_else(|| ProviderError::not_found("list_blobs", format!("container {container} does not exist")))?;
        Ok(blobs.keys().take(limit.unwrap_or(usize::MAX)).cloned().collect())
    }

    async fn download_text(&self, container: &str, blob: &str) -> Result<Option<String>, ProviderError> {
        let containers = self.containers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(containers.get(container).and_then(|blobs| blobs.get(blob)).cloned())
    }
}
