//! Instrumented wrapper that adds timing and error accounting to any adapter.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::{BlobStore, ProviderError, QueueMessage, QueueStore, Record, RecordSegment, RecordStore, ScanQuery};
use crate::observability::OperationMetrics;

/// Wrapper that records every call made through a storage adapter.
///
/// This follows the decorator pattern to automatically record:
/// - Operation duration for all adapter methods
/// - Resource-absent and error counts
/// - A `debug` event per call with the operation, target, and outcome
///
/// The wrapper implements each storage trait its inner adapter implements.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use taskhub_inspect::observability::OperationMetrics;
/// use taskhub_inspect::providers::in_memory::InMemoryStore;
/// use taskhub_inspect::providers::instrumented::InstrumentedStore;
/// use taskhub_inspect::Inspector;
///
/// let metrics = Arc::new(OperationMetrics::new());
/// let store = Arc::new(InstrumentedStore::new(Arc::new(InMemoryStore::new()), metrics.clone()));
/// let inspector = Inspector::from_store(store);
/// // Every store call made by `inspector` now shows up in `metrics.snapshot()`.
/// ```
pub struct InstrumentedStore<S: ?Sized> {
    inner: Arc<S>,
    metrics: Arc<OperationMetrics>,
}

impl<S: ?Sized> InstrumentedStore<S> {
    pub fn new(inner: Arc<S>, metrics: Arc<OperationMetrics>) -> Self {
        Self { inner, metrics }
    }

    pub fn metrics(&self) -> &Arc<OperationMetrics> {
        &self.metrics
    }

    async fn observe<T, F>(&self, operation: &'static str, resource: &str, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let start = Instant::now();
        let result = call.await;
        let elapsed = start.elapsed();

        self.metrics.record_operation(operation, elapsed);
        match &result {
            Ok(_) => {
                tracing::debug!(operation, resource, elapsed_us = elapsed.as_micros() as u64, "store call");
            }
            Err(e) => {
                self.metrics.record_error(e.is_not_found());
                tracing::debug!(
                    operation,
                    resource,
                    elapsed_us = elapsed.as_micros() as u64,
                    error = %e,
                    not_found = e.is_not_found(),
                    "store call failed"
                );
            }
        }
        result
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for InstrumentedStore<S> {
    async fn list_tables(&self) -> Result<Vec<String>, ProviderError> {
        self.observe("list_tables", "", self.inner.list_tables()).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool, ProviderError> {
        self.observe("table_exists", table, self.inner.table_exists(table)).await
    }

    async fn query_segment(
        &self,
        table: &str,
        query: &ScanQuery,
        continuation: Option<&str>,
    ) -> Result<RecordSegment, ProviderError> {
        self.observe("query_segment", table, self.inner.query_segment(table, query, continuation))
            .await
    }

    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Record>, ProviderError> {
        self.observe("get_record", table, self.inner.get_record(table, partition_key, row_key))
            .await
    }

    fn key_sentinel(&self) -> char {
        self.inner.key_sentinel()
    }
}

#[async_trait]
impl<S: QueueStore + ?Sized> QueueStore for InstrumentedStore<S> {
    async fn list_queues(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        self.observe("list_queues", prefix, self.inner.list_queues(prefix)).await
    }

    async fn peek_messages(&self, queue: &str, max_count: usize) -> Result<Vec<QueueMessage>, ProviderError> {
        self.observe("peek_messages", queue, self.inner.peek_messages(queue, max_count))
            .await
    }

    async fn approximate_depth(&self, queue: &str) -> Result<u64, ProviderError> {
        self.observe("approximate_depth", queue, self.inner.approximate_depth(queue))
            .await
    }
}

#[async_trait]
impl<S: BlobStore + ?Sized> BlobStore for InstrumentedStore<S> {
    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        self.observe("list_containers", prefix, self.inner.list_containers(prefix))
            .await
    }

    async fn list_blobs(&self, container: &str, limit: Option<usize>) -> Result<Vec<String>, ProviderError> {
        self.observe("list_blobs", container, self.inner.list_blobs(container, limit))
            .await
    }

    async fn download_text(&self, container: &str, blob: &str) -> Result<Option<String>, ProviderError> {
        self.observe("download_text", container, self.inner.download_text(container, blob))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::in_memory::InMemoryStore;

    #[tokio::test]
    async fn records_calls_and_soft_failures() {
        let inner = Arc::new(InMemoryStore::new());
        inner.create_table("HubInstances");
        let metrics = Arc::new(OperationMetrics::new());
        let store = InstrumentedStore::new(inner, metrics.clone());

        assert!(store.table_exists("HubInstances").await.unwrap());
        assert!(store.get_record("Missing", "a", "").await.is_err());
        assert_eq!(store.approximate_depth("hub-workitems").await.unwrap(), 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.calls, 3);
        assert_eq!(snapshot.not_found, 1);
        assert_eq!(snapshot.errors, 0);
        assert_eq!(snapshot.calls_by_operation["get_record"], 1);
    }
}
