//! Naming conventions of the persisted task hub layout.
//!
//! Every resource name the inspector derives or reads lives here so that
//! discovery, queries, and correlation agree on one vocabulary.

/// Suffix of the table holding the current state of every instance.
pub const INSTANCES_TABLE_SUFFIX: &str = "Instances";
/// Suffix of the table holding the append-only event log.
pub const HISTORY_TABLE_SUFFIX: &str = "History";

/// Infix of control queues: `<hub>-control-<n>`.
pub const CONTROL_QUEUE_INFIX: &str = "-control-";
/// Suffix of the activity work-item queue: `<hub>-workitems`.
pub const WORK_ITEM_QUEUE_SUFFIX: &str = "-workitems";
/// Suffix of the blob container for oversized payloads.
pub const LARGE_MESSAGE_CONTAINER_SUFFIX: &str = "-largemessages";
/// Suffix of the blob container for partition leases.
pub const LEASE_CONTAINER_SUFFIX: &str = "-leases";

/// Row key of the single current-state record of an instance.
pub const INSTANCE_ROW_KEY: &str = "";
/// Row key of the per-instance bookkeeping row in the history table.
pub const HISTORY_SENTINEL_ROW_KEY: &str = "sentinel";

/// Instance table columns.
pub mod instance {
    pub const NAME: &str = "Name";
    pub const VERSION: &str = "Version";
    pub const RUNTIME_STATUS: &str = "RuntimeStatus";
    pub const INPUT: &str = "Input";
    pub const OUTPUT: &str = "Output";
    pub const CUSTOM_STATUS: &str = "CustomStatus";
    pub const CREATED_TIME: &str = "CreatedTime";
    pub const LAST_UPDATED_TIME: &str = "LastUpdatedTime";
    pub const COMPLETED_TIME: &str = "CompletedTime";
    pub const EXECUTION_ID: &str = "ExecutionId";
}

/// History table columns.
pub mod history {
    pub const EVENT_TYPE: &str = "EventType";
    /// Event time written by the engine; preferred over the store timestamp.
    pub const EVENT_TIMESTAMP: &str = "_Timestamp";
    pub const NAME: &str = "Name";
    pub const INPUT: &str = "Input";
    pub const RESULT: &str = "Result";
    pub const EVENT_ID: &str = "EventId";
    pub const TASK_SCHEDULED_ID: &str = "TaskScheduledId";
    pub const SCHEDULED_START_TIME: &str = "ScheduledStartTime";
    pub const FIRE_AT: &str = "FireAt";
    pub const ORCHESTRATION_STATUS: &str = "OrchestrationStatus";
    pub const EXECUTION_ID: &str = "ExecutionId";
    pub const REASON: &str = "Reason";
    pub const DETAILS: &str = "Details";
    pub const IS_PLAYED: &str = "IsPlayed";
}

pub fn instances_table(hub: &str) -> String {
    format!("{hub}{INSTANCES_TABLE_SUFFIX}")
}

pub fn history_table(hub: &str) -> String {
    format!("{hub}{HISTORY_TABLE_SUFFIX}")
}

pub fn work_item_queue(hub: &str) -> String {
    format!("{}{WORK_ITEM_QUEUE_SUFFIX}", hub.to_lowercase())
}

pub fn large_message_container(hub: &str) -> String {
    format!("{}{LARGE_MESSAGE_CONTAINER_SUFFIX}", hub.to_lowercase())
}

pub fn lease_container(hub: &str) -> String {
    format!("{}{LEASE_CONTAINER_SUFFIX}", hub.to_lowercase())
}

/// Strips a table suffix case-insensitively, returning the candidate hub name.
///
/// Returns `None` when the name does not end with the suffix or nothing is
/// left after stripping it.
pub fn strip_table_suffix<'a>(table: &'a str, suffix: &str) -> Option<&'a str> {
    let split = table.len().checked_sub(suffix.len())?;
    if !table.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = table.split_at(split);
    (!head.is_empty() && tail.eq_ignore_ascii_case(suffix)).then_some(head)
}

/// True when `queue` is `<hub>-control-<digits>` (case-insensitive).
pub fn is_control_queue(hub: &str, queue: &str) -> bool {
    let prefix = format!("{}{CONTROL_QUEUE_INFIX}", hub.to_lowercase());
    let queue = queue.to_lowercase();
    match queue.strip_prefix(&prefix) {
        Some(index) => !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
