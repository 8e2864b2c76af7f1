// Not every test binary uses every fixture.
#![allow(dead_code)]

pub mod fault_injection;
pub mod tracing_capture;

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use taskhub_inspect::providers::in_memory::InMemoryStore;
use taskhub_inspect::providers::sqlite::SqliteStore;
use taskhub_inspect::providers::{QueueMessage, Record};
use taskhub_inspect::schema::{history as hcol, instance as icol};
use tempfile::TempDir;

/// Hub used by most fixtures.
pub const SHOP: &str = "Shop";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(secs)
}

pub fn instance_row(id: &str, status: &str, name: &str, created: DateTime<Utc>) -> Record {
    Record::new(id, "")
        .with(icol::RUNTIME_STATUS, status)
        .with(icol::NAME, name)
        .with(icol::VERSION, "1.0")
        .with(icol::CREATED_TIME, created)
        .with(icol::LAST_UPDATED_TIME, created + Duration::minutes(5))
        .with(icol::INPUT, "{\"orderId\":1}")
        .with(icol::EXECUTION_ID, format!("{id}-exec"))
}

pub fn history_row(id: &str, seq: u32, event_type: &str, secs: i64) -> Record {
    Record::new(id, seq.to_string())
        .with(hcol::EVENT_TYPE, event_type)
        .with(hcol::EVENT_TIMESTAMP, at(secs))
        .with(hcol::EXECUTION_ID, format!("{id}-exec"))
}

/// A queue message as the engine would enqueue it.
pub fn message(id: &str, content: &str) -> QueueMessage {
    QueueMessage {
        message_id: id.to_string(),
        inserted_at: Some(base_time()),
        dequeue_count: 1,
        content: content.to_string(),
    }
}

/// Started, `Ship` scheduled as #1, #1 failed with a timeout, completed Failed.
pub fn failed_shipment(id: &str) -> Vec<Record> {
    vec![
        history_row(id, 0, "ExecutionStarted", 0).with(hcol::NAME, "ProcessOrder"),
        history_row(id, 1, "TaskScheduled", 1)
            .with(hcol::NAME, "Ship")
            .with(hcol::EVENT_ID, 1i64),
        history_row(id, 2, "TaskFailed", 31)
            .with(hcol::TASK_SCHEDULED_ID, 1i64)
            .with(hcol::REASON, "timeout")
            .with(hcol::DETAILS, "carrier did not answer"),
        history_row(id, 3, "ExecutionCompleted", 32).with(hcol::ORCHESTRATION_STATUS, "Failed"),
        Record::new(id, "sentinel").with(hcol::EXECUTION_ID, format!("{id}-exec")),
    ]
}

/// Every table row of the shop fixture.
///
/// - `Shop`: five instances (two failed, one with an unknown status) and
///   their histories.
/// - `Billing`: a history table only.
/// - `Audit`: an unrelated table.
pub fn shop_records() -> Vec<(&'static str, Record)> {
    let mut rows = vec![
        ("ShopInstances", instance_row("order-001", "Failed", "ProcessOrder", at(0))),
        ("ShopInstances", instance_row("order-002", "Completed", "ProcessOrder", at(86_400))),
        ("ShopInstances", instance_row("order-003", "Running", "ProcessOrder", at(2 * 86_400))),
        ("ShopInstances", instance_row("invoice-1", "Failed", "SendInvoice", at(3 * 86_400))),
        ("ShopInstances", instance_row("legacy-1", "Canceled", "ProcessOrder", at(-30 * 86_400))),
        ("BillingHistory", history_row("bill-1", 0, "ExecutionStarted", 0)),
        ("Audit", Record::new("a", "b")),
    ];

    rows.extend(failed_shipment("order-001").into_iter().map(|r| ("ShopHistory", r)));

    let invoice = [
        history_row("invoice-1", 0, "ExecutionStarted", 0),
        history_row("invoice-1", 1, "TaskScheduled", 1)
            .with(hcol::NAME, "Render")
            .with(hcol::EVENT_ID, 1i64),
        history_row("invoice-1", 2, "TaskScheduled", 1)
            .with(hcol::NAME, "Email")
            .with(hcol::EVENT_ID, 2i64),
        history_row("invoice-1", 3, "TaskCompleted", 4)
            .with(hcol::TASK_SCHEDULED_ID, 1i64)
            .with(hcol::RESULT, "rendered"),
        history_row("invoice-1", 4, "TaskFailed", 9)
            .with(hcol::TASK_SCHEDULED_ID, 2i64)
            .with(hcol::RESULT, "smtp down"),
        history_row("invoice-1", 5, "TimerCreated", 10).with(hcol::FIRE_AT, at(70)),
        history_row("invoice-1", 6, "TimerFired", 70),
        history_row("invoice-1", 7, "EventRaised", 71).with(hcol::NAME, "Approval"),
        history_row("invoice-1", 8, "TaskFailed", 72)
            .with(hcol::TASK_SCHEDULED_ID, 99i64)
            .with(hcol::REASON, "orphan"),
        history_row("invoice-1", 9, "SubOrchestrationInstanceCreated", 73).with(hcol::NAME, "Archive"),
        history_row("invoice-1", 10, "ExecutionCompleted", 80).with(hcol::ORCHESTRATION_STATUS, "Failed"),
    ];
    rows.extend(invoice.into_iter().map(|r| ("ShopHistory", r)));

    let completed = [
        history_row("order-002", 0, "ExecutionStarted", 0),
        history_row("order-002", 1, "TaskScheduled", 1)
            .with(hcol::NAME, "Ship")
            .with(hcol::EVENT_ID, 1i64),
        history_row("order-002", 2, "TaskCompleted", 5)
            .with(hcol::TASK_SCHEDULED_ID, 1i64)
            .with(hcol::RESULT, "shipped"),
        history_row("order-002", 3, "ExecutionCompleted", 6).with(hcol::ORCHESTRATION_STATUS, "Completed"),
    ];
    rows.extend(completed.into_iter().map(|r| ("ShopHistory", r)));
    rows
}

pub fn shop_messages() -> Vec<(&'static str, QueueMessage)> {
    vec![
        ("shop-control-00", message("m-1", r#"{"kind":"ExecutionStarted","instance":"order-003"}"#)),
        ("shop-control-00", message("m-2", "raw text payload")),
        ("shop-workitems", message("m-3", r#"{"activity":"Ship"}"#)),
    ]
}

pub const SHOP_EMPTY_QUEUES: [&str; 2] = ["shop-control-01", "shopify-control-00"];
pub const SHOP_CONTAINERS: [&str; 1] = ["shop-leases"];
pub const SHOP_BLOBS: [(&str, &str, &str); 2] = [
    ("shop-largemessages", "order-001/input", r#"{"items":[1,2,3]}"#),
    ("shop-largemessages", "order-001/output", "too large to inline"),
];

/// The shop fixture loaded into an in-memory store.
pub fn shop_store() -> Arc<InMemoryStore> {
    shop_store_with_segment_size(1000)
}

pub fn shop_store_with_segment_size(segment_size: usize) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new().with_segment_size(segment_size);
    for (table, record) in shop_records() {
        store.insert_record(table, record);
    }
    for queue in SHOP_EMPTY_QUEUES {
        store.create_queue(queue);
    }
    for (queue, message) in shop_messages() {
        store.push_message(queue, message.content, message.inserted_at);
    }
    for container in SHOP_CONTAINERS {
        store.create_container(container);
    }
    for (container, blob, content) in SHOP_BLOBS {
        store.put_blob(container, blob, content);
    }
    Arc::new(store)
}

/// The shop fixture loaded into an on-disk SQLite snapshot.
pub async fn shop_sqlite_disk() -> (Arc<SqliteStore>, TempDir) {
    let td = tempfile::tempdir().unwrap();
    let db_path = td.path().join("snapshot.db");
    let url = format!("sqlite:{}", db_path.display());
    let store = SqliteStore::new(&url).await.unwrap();

    for (table, record) in shop_records() {
        store.insert_record(table, &record).await.unwrap();
    }
    for queue in SHOP_EMPTY_QUEUES {
        store.create_queue(queue).await.unwrap();
    }
    for (queue, message) in shop_messages() {
        store.push_message(queue, &message).await.unwrap();
    }
    for container in SHOP_CONTAINERS {
        store.create_container(container).await.unwrap();
    }
    for (container, blob, content) in SHOP_BLOBS {
        store.put_blob(container, blob, content).await.unwrap();
    }
    (Arc::new(store), td)
}
