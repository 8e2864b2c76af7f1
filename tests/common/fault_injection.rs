//! Fault injection store for testing error propagation and cancellation.
//!
//! Wraps an [`InMemoryStore`] and lets a test fail chosen operations or
//! slow every call down.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use taskhub_inspect::providers::in_memory::InMemoryStore;
use taskhub_inspect::providers::{
    BlobStore, ProviderError, QueueMessage, QueueStore, Record, RecordSegment, RecordStore, ScanQuery,
};

pub struct FaultInjectingStore {
    inner: Arc<InMemoryStore>,
    /// Operation name -> error returned instead of calling the inner store
    failures: Mutex<HashMap<&'static str, ProviderError>>,
    /// Applied before every call
    delay: Mutex<Option<Duration>>,
    calls: AtomicU32,
}

impl FaultInjectingStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    /// Every later call of `operation` fails with `error`.
    pub fn fail(&self, operation: &'static str, error: ProviderError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn before(&self, operation: &'static str) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().unwrap().get(operation).cloned();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for FaultInjectingStore {
    async fn list_tables(&self) -> Result<Vec<String>, ProviderError> {
        self.before("list_tables").await?;
        self.inner.list_tables().await
    }

    async fn table_exists(&self, table: &str) -> Result<bool, ProviderError> {
        self.before("table_exists").await?;
        self.inner.table_exists(table).await
    }

    async fn query_segment(
        &self,
        table: &str,
        query: &ScanQuery,
        continuation: Option<&str>,
    ) -> Result<RecordSegment, ProviderError> {
        self.before("query_segment").await?;
        self.inner.query_segment(table, query, continuation).await
    }

    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Record>, ProviderError> {
        self.before("get_record").await?;
        self.inner.get_record(table, partition_key, row_key).await
    }
}

#[async_trait]
impl QueueStore for FaultInjectingStore {
    async fn list_queues(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        self.before("list_queues").await?;
        self.inner.list_queues(prefix).await
    }

    async fn peek_messages(&self, queue: &str, max_count: usize) -> Result<Vec<QueueMessage>, ProviderError> {
        self.before("peek_messages").await?;
        self.inner.peek_messages(queue, max_count).await
    }

    async fn approximate_depth(&self, queue: &str) -> Result<u64, ProviderError> {
        self.before("approximate_depth").await?;
        self.inner.approximate_depth(queue).await
    }
}

#[async_trait]
impl BlobStore for FaultInjectingStore {
    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        self.before("list_containers").await?;
        self.inner.list_containers(prefix).await
    }

    async fn list_blobs(&self, container: &str, limit: Option<usize>) -> Result<Vec<String>, ProviderError> {
        self.before("list_blobs").await?;
        self.inner.list_blobs(container, limit).await
    }

    async fn download_text(&self, container: &str, blob: &str) -> Result<Option<String>, ProviderError> {
        self.before("download_text").await?;
        self.inner.download_text(container, blob).await
    }
}
