use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use super::{
    BlobStore, CompareOp, Field, Predicate, PropertyValue, ProviderError, QueueMessage, QueueStore, Record,
    RecordSegment, RecordStore, ScanQuery, MAX_PEEK_MESSAGES,
};

type RowKey = (String, String);

/// Adapter over an offline SQLite snapshot of a task hub's storage account.
///
/// Tables, queues, and containers are stored generically: a record keeps its
/// keys in indexed columns and its typed properties as a JSON document. The
/// snapshot is loaded with the `create_*`/`insert_*`/`push_*`/`put_*`
/// helpers; the inspector itself only reads.
///
/// Partition key comparisons are pushed down to SQL; the remaining
/// predicate is evaluated per row.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Convert sqlx error to ProviderError with appropriate retry classification
    fn sqlx_to_provider_error(operation: &str, e: sqlx::Error) -> ProviderError {
        let error_msg = e.to_string();

        // SQLITE_BUSY (database locked)
        if error_msg.contains("database is locked") || error_msg.contains("SQLITE_BUSY") {
            return ProviderError::retryable(operation, format!("Database locked: {error_msg}"));
        }

        if error_msg.contains("UNIQUE constraint") || error_msg.contains("PRIMARY KEY") {
            return ProviderError::permanent(operation, format!("Constraint violation: {error_msg}"));
        }

        if error_msg.contains("connection") || error_msg.contains("timeout") {
            return ProviderError::retryable(operation, format!("Connection error: {error_msg}"));
        }

        if matches!(e, sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) {
            return ProviderError::permanent(operation, format!("Undecodable row: {error_msg}"));
        }

        ProviderError::retryable(operation, error_msg)
    }

    /// Open (or create) a snapshot database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema initialization fails.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    // Snapshot readers may overlap with a loader
                    sqlx::query("PRAGMA busy_timeout = 60000").execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        Self::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Convenience: a private in-memory snapshot for tests.
    ///
    /// A single long-lived connection holds the database; it is gone once
    /// the store is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema initialization fails.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS store_tables (name TEXT PRIMARY KEY)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                table_name TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                row_key TEXT NOT NULL,
                timestamp TEXT,
                properties TEXT NOT NULL,
                PRIMARY KEY (table_name, partition_key, row_key)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS queues (name TEXT PRIMARY KEY)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                queue_name TEXT NOT NULL,
                seq INTEGER NOT NULL,
                message_id TEXT NOT NULL,
                inserted_at TEXT,
                dequeue_count INTEGER NOT NULL DEFAULT 0,
                content TEXT NOT NULL,
                PRIMARY KEY (queue_name, seq)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS containers (name TEXT PRIMARY KEY)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                container TEXT NOT NULL,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                PRIMARY KEY (container, name)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // ----- snapshot loading -----

    pub async fn create_table(&self, table: &str) -> Result<(), ProviderError> {
        sqlx::query("INSERT OR IGNORE INTO store_tables (name) VALUES (?)")
            .bind(table)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("create_table", e))?;
        Ok(())
    }

    /// Insert or replace one record, creating its table if needed.
    pub async fn insert_record(&self, table: &str, record: &Record) -> Result<(), ProviderError> {
        let properties = serde_json::to_string(&record.properties)
            .map_err(|e| ProviderError::permanent("insert_record", format!("encode properties: {e}")))?;
        let timestamp = record.timestamp.map(|t| t.to_rfc3339());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::sqlx_to_provider_error("insert_record", e))?;
        sqlx::query("INSERT OR IGNORE INTO store_tables (name) VALUES (?)")
            .bind(table)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("insert_record", e))?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO records (table_name, partition_key, row_key, timestamp, properties)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(table)
        .bind(&record.partition_key)
        .bind(&record.row_key)
        .bind(timestamp)
        .bind(properties)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::sqlx_to_provider_error("insert_record", e))?;
        tx.commit()
            .await
            .map_err(|e| Self::sqlx_to_provider_error("insert_record", e))?;
        Ok(())
    }

    pub async fn create_queue(&self, queue: &str) -> Result<(), ProviderError> {
        sqlx::query("INSERT OR IGNORE INTO queues (name) VALUES (?)")
            .bind(queue)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("create_queue", e))?;
        Ok(())
    }

    /// Append a message to the back of a queue, creating the queue if needed.
    pub async fn push_message(&self, queue: &str, message: &QueueMessage) -> Result<(), ProviderError> {
        self.create_queue(queue).await?;
        sqlx::query(
            r#"
            INSERT INTO queue_messages (queue_name, seq, message_id, inserted_at, dequeue_count, content)
            SELECT ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?, ?
            FROM queue_messages WHERE queue_name = ?
            "#,
        )
        .bind(queue)
        .bind(&message.message_id)
        .bind(message.inserted_at.map(|t| t.to_rfc3339()))
        .bind(i64::from(message.dequeue_count))
        .bind(&message.content)
        .bind(queue)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::sqlx_to_provider_error("push_message", e))?;
        Ok(())
    }

    pub async fn create_container(&self, container: &str) -> Result<(), ProviderError> {
        sqlx::query("INSERT OR IGNORE INTO containers (name) VALUES (?)")
            .bind(container)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("create_container", e))?;
        Ok(())
    }

    /// Store a blob, creating the container if needed.
    pub async fn put_blob(&self, container: &str, blob: &str, content: &str) -> Result<(), ProviderError> {
        self.create_container(container).await?;
        sqlx::query("INSERT OR REPLACE INTO blobs (container, name, content) VALUES (?, ?, ?)")
            .bind(container)
            .bind(blob)
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("put_blob", e))?;
        Ok(())
    }

    // ----- reads -----

    async fn exists_in(&self, operation: &str, sql: &str, name: &str) -> Result<bool, ProviderError> {
        let count: i64 = sqlx::query_scalar(sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error(operation, e))?;
        Ok(count > 0)
    }

    async fn require_table(&self, operation: &str, table: &str) -> Result<(), ProviderError> {
        if self
            .exists_in(operation, "SELECT COUNT(*) FROM store_tables WHERE name = ?", table)
            .await?
        {
            Ok(())
        } else {
            Err(ProviderError::not_found(operation, format!("table {table} does not exist")))
        }
    }

    /// Raw rows in key order, starting at (or after) `start`, narrowed by the
    /// partition key clauses of `filter`.
    async fn fetch_rows(
        &self,
        table: &str,
        filter: Option<&Predicate>,
        start: Option<(&RowKey, bool)>,
        limit: usize,
    ) -> Result<Vec<Record>, ProviderError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT partition_key, row_key, timestamp, properties FROM records WHERE table_name = ",
        );
        builder.push_bind(table);

        for (op, key) in filter.map(partition_key_bounds).unwrap_or_default() {
            builder.push(format!(" AND partition_key {op} ")).push_bind(key);
        }
        if let Some(((pk, rk), inclusive)) = start {
            let op = if inclusive { ">=" } else { ">" };
            builder
                .push(format!(" AND (partition_key, row_key) {op} ("))
                .push_bind(pk.clone())
                .push(", ")
                .push_bind(rk.clone())
                .push(")");
        }
        builder
            .push(" ORDER BY partition_key, row_key LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("query_segment", e))?;
        rows.iter().map(record_from_row).collect()
    }
}

/// Partition key clauses of `filter` as SQL operators.
fn partition_key_bounds(filter: &Predicate) -> Vec<(&'static str, String)> {
    filter
        .clauses()
        .into_iter()
        .filter_map(|clause| match clause {
            Predicate::Compare {
                field: Field::PartitionKey,
                op,
                value: PropertyValue::String(key),
            } => {
                let sql = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Gt => ">",
                    CompareOp::Ge => ">=",
                    CompareOp::Lt => "<",
                    CompareOp::Le => "<=",
                    CompareOp::Ne => return None,
                };
                Some((sql, key.clone()))
            }
            _ => None,
        })
        .collect()
}

fn record_from_row(row: &SqliteRow) -> Result<Record, ProviderError> {
    let decode = |e: sqlx::Error| SqliteStore::sqlx_to_provider_error("query_segment", e);
    let partition_key: String = row.try_get("partition_key").map_err(decode)?;
    let row_key: String = row.try_get("row_key").map_err(decode)?;
    let timestamp: Option<String> = row.try_get("timestamp").map_err(decode)?;
    let properties: String = row.try_get("properties").map_err(decode)?;

    let properties = serde_json::from_str(&properties).map_err(|e| {
        ProviderError::permanent(
            "query_segment",
            format!("undecodable properties of ({partition_key}, {row_key}): {e}"),
        )
    })?;
    let timestamp = timestamp.and_then(|t| parse_time(&t));
    Ok(Record {
        partition_key,
        row_key,
        timestamp,
        properties,
    })
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text).ok().map(|t| t.with_timezone(&Utc))
}

fn encode_continuation(key: &RowKey) -> Result<String, ProviderError> {
    serde_json::to_string(key).map_err(|e| ProviderError::permanent("query_segment", format!("encode token: {e}")))
}

fn decode_continuation(token: &str) -> Result<RowKey, ProviderError> {
    serde_json::from_str(token)
        .map_err(|e| ProviderError::permanent("query_segment", format!("invalid continuation token: {e}")))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_tables(&self) -> Result<Vec<String>, ProviderError> {
        sqlx::query_scalar("SELECT name FROM store_tables ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("list_tables", e))
    }

    async fn table_exists(&self, table: &str) -> Result<bool, ProviderError> {
        self.exists_in("table_exists", "SELECT COUNT(*) FROM store_tables WHERE name = ?", table)
            .await
    }

    async fn query_segment(
        &self,
        table: &str,
        query: &ScanQuery,
        continuation: Option<&str>,
    ) -> Result<RecordSegment, ProviderError> {
        self.require_table("query_segment", table).await?;

        let page = query.page_size.unwrap_or(1000).max(1);
        let batch = page + 1;
        let mut cursor = continuation.map(decode_continuation).transpose()?;
        let mut inclusive = true;
        let mut segment = RecordSegment::default();

        loop {
            let start = cursor.as_ref().map(|key| (key, inclusive));
            let rows = self.fetch_rows(table, query.filter.as_ref(), start, batch).await?;
            let exhausted = rows.len() < batch;

            for record in &rows {
                if !query.matches(record) {
                    continue;
                }
                if segment.records.len() == page {
                    segment.continuation = Some(encode_continuation(&(
                        record.partition_key.clone(),
                        record.row_key.clone(),
                    ))?);
                    return Ok(segment);
                }
                segment.records.push(query.shape(record));
            }

            match rows.last() {
                Some(last) if !exhausted => {
                    cursor = Some((last.partition_key.clone(), last.row_key.clone()));
                    inclusive = false;
                }
                _ => break,
            }
        }

        debug!(table, records = segment.records.len(), "snapshot scan complete");
        Ok(segment)
    }

    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Record>, ProviderError> {
        self.require_table("get_record", table).await?;
        let row = sqlx::query(
            r#"
            SELECT partition_key, row_key, timestamp, properties
            FROM records
            WHERE table_name = ? AND partition_key = ? AND row_key = ?
            "#,
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::sqlx_to_provider_error("get_record", e))?;
        row.as_ref().map(record_from_row).transpose()
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn list_queues(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM queues ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("list_queues", e))?;
        Ok(names.into_iter().filter(|name| name.starts_with(prefix)).collect())
    }

    async fn peek_messages(&self, queue: &str, max_count: usize) -> Result<Vec<QueueMessage>, ProviderError> {
        if !self
            .exists_in("peek_messages", "SELECT COUNT(*) FROM queues WHERE name = ?", queue)
            .await?
        {
            return Err(ProviderError::not_found("peek_messages", format!("queue {queue} does not exist")));
        }

        let limit = i64::try_from(max_count.min(MAX_PEEK_MESSAGES)).unwrap_or(0);
        let rows = sqlx::query(
            r#"
            SELECT message_id, inserted_at, dequeue_count, content
            FROM queue_messages
            WHERE queue_name = ?
            ORDER BY seq
            LIMIT ?
            "#,
        )
        .bind(queue)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::sqlx_to_provider_error("peek_messages", e))?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| Self::sqlx_to_provider_error("peek_messages", e);
                let inserted_at: Option<String> = row.try_get("inserted_at").map_err(decode)?;
                let dequeue_count: i64 = row.try_get("dequeue_count").map_err(decode)?;
                Ok(QueueMessage {
                    message_id: row.try_get("message_id").map_err(decode)?,
                    inserted_at: inserted_at.and_then(|t| parse_time(&t)),
                    dequeue_count: u32::try_from(dequeue_count).unwrap_or(0),
                    content: row.try_get("content").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn approximate_depth(&self, queue: &str) -> Result<u64, ProviderError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE queue_name = ?")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("approximate_depth", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM containers ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("list_containers", e))?;
        Ok(names.into_iter().filter(|name| name.starts_with(prefix)).collect())
    }

    async fn list_blobs(&self, container: &str, limit: Option<usize>) -> Result<Vec<String>, ProviderError> {
        if !self
            .exists_in("list_blobs", "SELECT COUNT(*) FROM containers WHERE name = ?", container)
            .await?
        {
            return Err(ProviderError::not_found(
                "list_blobs",
                format!("container {container} does not exist"),
            ));
        }

        // LIMIT -1 is unbounded in SQLite
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        sqlx::query_scalar("SELECT name FROM blobs WHERE container = ? ORDER BY name LIMIT ?")
            .bind(container)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("list_blobs", e))
    }

    async fn download_text(&self, container: &str, blob: &str) -> Result<Option<String>, ProviderError> {
        sqlx::query_scalar("SELECT content FROM blobs WHERE container = ? AND name = ?")
            .bind(container)
            .bind(blob)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::sqlx_to_provider_error("download_text", e))
    }
}
