//! Storage adapter contracts consumed by the inspector.
//!
//! A task hub spreads its durable state over three independent services: a
//! key-ordered table store, a queue service, and a blob service. Each is
//! modelled as its own trait so adapters can be mixed, e.g. a SQLite snapshot
//! for tables next to a live queue service. Adapters are datastores only;
//! all correlation happens above this layer.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::InspectError;

pub mod error;
mod filter;
/// In-memory adapter for tests and fixtures.
pub mod in_memory;
/// Timing and error accounting decorator.
pub mod instrumented;
/// SQLite snapshot adapter.
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::{NotFoundExt, ProviderError, ProviderErrorKind};
pub use filter::{CompareOp, Field, Predicate};

/// Largest key character under code-point (UTF-8 byte) ordering.
pub const MAX_KEY_SENTINEL: char = char::MAX;

/// Upper bound of messages a single peek may return.
pub const MAX_PEEK_MESSAGES: usize = 32;

/// Typed property value of a table record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Orders two values of compatible types; `None` when incomparable.
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        use PropertyValue::*;
        match (self, other) {
            (String(a), String(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (Int(a), Double(b)) => (*a as f64).partial_cmp(b),
            (Double(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            (String(a), DateTime(b)) => parse_datetime(a).map(|a| a.cmp(b)),
            (DateTime(a), String(b)) => parse_datetime(b).map(|b| a.cmp(&b)),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(value)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// One row of a table: partition key, row key, and typed properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub partition_key: String,
    pub row_key: String,
    /// Store-maintained modification time.
    pub timestamp: Option<DateTime<Utc>>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Record {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropertyValue::as_str)
    }

    /// Integer property; numeric strings are accepted.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Timestamp property; RFC 3339 strings are accepted.
    pub fn get_datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name)? {
            PropertyValue::DateTime(t) => Some(*t),
            PropertyValue::String(s) => parse_datetime(s),
            _ => None,
        }
    }

    /// Copy of the record holding only the keys, timestamp, and `select`ed properties.
    pub fn project(&self, select: &[String]) -> Record {
        Record {
            partition_key: self.partition_key.clone(),
            row_key: self.row_key.clone(),
            timestamp: self.timestamp,
            properties: self
                .properties
                .iter()
                .filter(|(name, _)| select.iter().any(|s| s == *name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Parameters of a segmented table scan.
#[derive(Debug, Clone, Default)]
pub struct ScanQuery {
    pub filter: Option<Predicate>,
    /// Projection; `None` reads every property.
    pub select: Option<Vec<String>>,
    /// Requested segment size; adapters may return fewer records.
    pub page_size: Option<usize>,
}

impl ScanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Option<Predicate>) -> Self {
        self.filter = filter;
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(record))
    }

    /// Applies the projection, if any.
    pub fn shape(&self, record: &Record) -> Record {
        match &self.select {
            Some(select) => record.project(select),
            None => record.clone(),
        }
    }
}

/// One page of a scan.
#[derive(Debug, Clone, Default)]
pub struct RecordSegment {
    pub records: Vec<Record>,
    /// Opaque token for the next page; `None` when the scan is complete.
    pub continuation: Option<String>,
}

/// Key-ordered, partitioned table store.
///
/// Missing tables are reported as [`ProviderErrorKind::NotFound`]; a missing
/// record inside an existing table is `Ok(None)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Enumerate every table name.
    async fn list_tables(&self) -> Result<Vec<String>, ProviderError>;

    /// Existence probe; does not read table contents.
    async fn table_exists(&self, table: &str) -> Result<bool, ProviderError>;

    /// Read one segment of a filtered, projected scan.
    async fn query_segment(
        &self,
        table: &str,
        query: &ScanQuery,
        continuation: Option<&str>,
    ) -> Result<RecordSegment, ProviderError>;

    /// Exact-match lookup by partition and row key.
    async fn get_record(&self, table: &str, partition_key: &str, row_key: &str)
    -> Result<Option<Record>, ProviderError>;

    /// A character that sorts after every valid key character.
    ///
    /// Stores that collate keys as UTF-16 code units should return `'\u{FFFF}'`.
    fn key_sentinel(&self) -> char {
        MAX_KEY_SENTINEL
    }
}

/// A message observed without dequeuing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub inserted_at: Option<DateTime<Utc>>,
    pub dequeue_count: u32,
    pub content: String,
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Queue names starting with `prefix`.
    async fn list_queues(&self, prefix: &str) -> Result<Vec<String>, ProviderError>;

    /// Up to `max_count` (at most [`MAX_PEEK_MESSAGES`]) messages from the front of the queue.
    async fn peek_messages(&self, queue: &str, max_count: usize) -> Result<Vec<QueueMessage>, ProviderError>;

    /// Approximate number of messages; 0 when the queue does not exist.
    async fn approximate_depth(&self, queue: &str) -> Result<u64, ProviderError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Container names starting with `prefix`.
    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>, ProviderError>;

    /// Blob names in a container, up to `limit` when given.
    async fn list_blobs(&self, container: &str, limit: Option<usize>) -> Result<Vec<String>, ProviderError>;

    /// Blob content as text; `None` when the blob does not exist.
    async fn download_text(&self, container: &str, blob: &str) -> Result<Option<String>, ProviderError>;
}

/// Runs one store call, racing it against `cancel`.
///
/// A token cancelled before the call starts short-circuits without touching
/// the store.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, InspectError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    if cancel.is_cancelled() {
        return Err(InspectError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(InspectError::Cancelled),
        result = call => result.map_err(InspectError::from),
    }
}

/// Pull-based cursor over a segmented scan.
///
/// The next segment is requested only once the buffered one is drained, so a
/// caller that stops early never pays for the rest of the table. Every
/// segment fetch races the cancellation token.
pub struct RecordCursor<'a> {
    store: &'a dyn RecordStore,
    table: String,
    query: ScanQuery,
    cancel: CancellationToken,
    buffer: VecDeque<Record>,
    continuation: Option<String>,
    exhausted: bool,
    segments_fetched: usize,
}

impl<'a> RecordCursor<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        table: impl Into<String>,
        query: ScanQuery,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            query,
            cancel,
            buffer: VecDeque::new(),
            continuation: None,
            exhausted: false,
            segments_fetched: 0,
        }
    }

    pub fn segments_fetched(&self) -> usize {
        self.segments_fetched
    }

    pub async fn next(&mut self) -> Result<Option<Record>, InspectError> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_segment().await?;
        }
    }

    async fn fetch_segment(&mut self) -> Result<(), InspectError> {
        let segment = run_cancellable(
            &self.cancel,
            self.store
                .query_segment(&self.table, &self.query, self.continuation.as_deref()),
        )
        .await?;
        self.segments_fetched += 1;
        self.exhausted = segment.continuation.is_none();
        self.continuation = segment.continuation;
        self.buffer.extend(segment.records);
        Ok(())
    }

    /// Drains the cursor, stopping as soon as `limit` records were produced.
    pub async fn collect_limited(mut self, limit: Option<usize>) -> Result<Vec<Record>, InspectError> {
        let mut records = Vec::new();
        if limit == Some(0) {
            return Ok(records);
        }
        while let Some(record) = self.next().await? {
            records.push(record);
            if limit.is_some_and(|limit| records.len() >= limit) {
                break;
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::in_memory::InMemoryStore;
    use super::*;

    fn store_with_rows(n: usize) -> InMemoryStore {
        let store = InMemoryStore::new().with_segment_size(2);
        store.create_table("T");
        for i in 0..n {
            store.insert_record("T", Record::new(format!("pk-{i:02}"), "").with("N", i as i64));
        }
        store
    }

    #[test]
    fn record_accessors_coerce_strings() {
        let record = Record::new("a", "")
            .with("Count", "42")
            .with("Flag", "true")
            .with("At", "2024-01-02T03:04:05Z");
        assert_eq!(record.get_i64("Count"), Some(42));
        assert_eq!(record.get_bool("Flag"), Some(true));
        assert!(record.get_datetime("At").is_some());
        assert_eq!(record.get_str("Missing"), None);
    }

    #[test]
    fn projection_keeps_keys() {
        let record = Record::new("a", "r").with("Keep", "x").with("Drop", "y");
        let projected = record.project(&["Keep".to_string()]);
        assert_eq!(projected.partition_key, "a");
        assert_eq!(projected.row_key, "r");
        assert_eq!(projected.properties.len(), 1);
        assert_eq!(projected.get_str("Keep"), Some("x"));
    }

    #[tokio::test]
    async fn cursor_walks_all_segments() {
        let store = store_with_rows(5);
        let cursor = RecordCursor::new(&store, "T", ScanQuery::new(), CancellationToken::new());
        let records = cursor.collect_limited(None).await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].partition_key, "pk-00");
        assert_eq!(records[4].partition_key, "pk-04");
    }

    #[tokio::test]
    async fn cursor_stops_at_limit_without_draining() {
        let store = store_with_rows(10);
        let mut cursor = RecordCursor::new(&store, "T", ScanQuery::new(), CancellationToken::new());
        let mut taken = 0;
        while taken < 3 {
            assert!(cursor.next().await.unwrap().is_some());
            taken += 1;
        }
        assert_eq!(cursor.segments_fetched(), 2);

        let cursor = RecordCursor::new(&store, "T", ScanQuery::new(), CancellationToken::new());
        assert_eq!(cursor.collect_limited(Some(3)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_cursor_reports_cancellation() {
        let store = store_with_rows(3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cursor = RecordCursor::new(&store, "T", ScanQuery::new(), cancel);
        let err = cursor.collect_limited(None).await.unwrap_err();
        assert!(matches!(err, InspectError::Cancelled));
    }
}
