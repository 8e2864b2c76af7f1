//! History reads and event correlation.
//!
//! Reading is the only part that touches a store. Everything else is a pure
//! function over an already sorted `&[HistoryEvent]`, so callers can fetch a
//! history once and derive failures, activity timelines, and summaries from
//! the same slice.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::providers::{Field, Predicate, Record, RecordCursor, RecordStore, ScanQuery};
use crate::schema::{self, history as col};
use crate::{EventCategory, EventType, HistoryEvent, InspectError};

/// Name reported for a failure whose scheduling event is not in the log.
pub const UNKNOWN_ACTIVITY: &str = "Unknown";

/// A failed activity resolved against the event that scheduled it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityFailure {
    pub sequence_number: String,
    pub timestamp: Option<DateTime<Utc>>,
    /// Name of the scheduled activity, or [`UNKNOWN_ACTIVITY`].
    pub activity_name: String,
    pub task_scheduled_id: Option<i64>,
    pub failure_reason: Option<String>,
    pub details: Option<String>,
}

/// Event counts and lifetime of one instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistorySummary {
    pub instance_id: String,
    pub total_events: usize,
    /// Histogram keyed by event type tag.
    pub event_type_counts: BTreeMap<String, usize>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub final_status: Option<String>,
    pub activities_scheduled: usize,
    pub activities_completed: usize,
    pub activities_failed: usize,
    pub timers_created: usize,
    pub external_events_raised: usize,
    pub sub_orchestrations_created: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ActivityOutcome {
    Pending,
    Completed { result: Option<String> },
    Failed { reason: Option<String> },
}

/// A scheduled activity paired with its terminal event, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityInvocation {
    pub task_scheduled_id: Option<i64>,
    pub activity_name: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub outcome: ActivityOutcome,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Reads the full history of one instance in sequence order.
///
/// Every row of the partition is fetched before sorting; `limit` only
/// truncates the sorted result. The per-instance bookkeeping row is
/// skipped. A missing history table yields an empty log.
pub async fn get_history(
    store: &dyn RecordStore,
    hub: &str,
    instance_id: &str,
    limit: Option<usize>,
    page_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<HistoryEvent>, InspectError> {
    let table = schema::history_table(hub);
    let query = ScanQuery::new()
        .filter(Some(Predicate::eq(Field::PartitionKey, instance_id)))
        .page_size(page_size);

    let cursor = RecordCursor::new(store, table.as_str(), query, cancel.clone());
    let records = match cursor.collect_limited(None).await {
        Ok(records) => records,
        Err(e) if e.is_not_found() => {
            debug!(task_hub = hub, instance_id, table = %table, "history table absent");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut events: Vec<HistoryEvent> = records
        .iter()
        .filter(|record| record.row_key != schema::HISTORY_SENTINEL_ROW_KEY)
        .map(event_from_record)
        .collect();
    sort_history(&mut events);
    if let Some(limit) = limit {
        events.truncate(limit);
    }

    debug!(task_hub = hub, instance_id, events = events.len(), "history loaded");
    Ok(events)
}

/// Decodes one history row; undecodable columns are treated as absent.
pub fn event_from_record(record: &Record) -> HistoryEvent {
    let text = |column: &str| text_column(record, column);
    let time = |column: &str| time_column(record, column);

    let event_type = EventType::parse(record.get_str(col::EVENT_TYPE).unwrap_or_default());
    HistoryEvent {
        instance_id: record.partition_key.clone(),
        sequence_number: record.row_key.clone(),
        event_type,
        timestamp: time(col::EVENT_TIMESTAMP).or(record.timestamp),
        name: text(col::NAME),
        input: text(col::INPUT),
        result: text(col::RESULT),
        event_id: record.get_i64(col::EVENT_ID),
        task_scheduled_id: record.get_i64(col::TASK_SCHEDULED_ID),
        scheduled_time: time(col::SCHEDULED_START_TIME),
        fire_at: time(col::FIRE_AT),
        orchestration_status: text(col::ORCHESTRATION_STATUS),
        execution_id: text(col::EXECUTION_ID),
        reason: text(col::REASON),
        details: text(col::DETAILS),
        is_played: record.get_bool(col::IS_PLAYED),
    }
}

pub(crate) fn text_column(record: &Record, column: &str) -> Option<String> {
    let value = record.get(column)?;
    match value.as_str() {
        Some(text) => Some(text.to_string()),
        None => {
            debug!(
                partition_key = %record.partition_key,
                row_key = %record.row_key,
                column,
                "non-text column ignored"
            );
            None
        }
    }
}

pub(crate) fn time_column(record: &Record, column: &str) -> Option<DateTime<Utc>> {
    record.get(column)?;
    let parsed = record.get_datetime(column);
    if parsed.is_none() {
        debug!(
            partition_key = %record.partition_key,
            row_key = %record.row_key,
            column,
            "unparsable timestamp column ignored"
        );
    }
    parsed
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SequenceKey<'a> {
    /// Digits with leading zeros stripped; ordered by length, then digits.
    Numeric(usize, &'a str),
    Text(&'a str),
}

fn sequence_key(token: &str) -> SequenceKey<'_> {
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        let digits = token.trim_start_matches('0');
        SequenceKey::Numeric(digits.len(), digits)
    } else {
        SequenceKey::Text(token)
    }
}

/// Orders two sequence tokens.
///
/// Two all-digit tokens compare by numeric value of any width (`"9" <
/// "10"`, `"007" == "7"`); two other tokens compare lexicographically.
/// All-digit tokens sort before every other token so the order stays total.
pub fn compare_sequence(a: &str, b: &str) -> Ordering {
    sequence_key(a).cmp(&sequence_key(b))
}

/// Stable sort by sequence token.
pub fn sort_history(events: &mut [HistoryEvent]) {
    events.sort_by(|a, b| compare_sequence(&a.sequence_number, &b.sequence_number));
}

/// Events whose type belongs to `category`, in log order.
pub fn events_of_kind(history: &[HistoryEvent], category: EventCategory) -> Vec<&HistoryEvent> {
    history
        .iter()
        .filter(|event| event.event_type.category() == Some(category))
        .collect()
}

/// Index of scheduling events by correlation key; the first event wins.
fn scheduled_index(history: &[HistoryEvent]) -> HashMap<i64, &HistoryEvent> {
    let mut index = HashMap::new();
    for event in history.iter().filter(|e| e.event_type == EventType::TaskScheduled) {
        if let Some(key) = event.correlation_key() {
            index.entry(key).or_insert(event);
        }
    }
    index
}

/// Resolves every `TaskFailed` event to the activity it belongs to.
pub fn correlate_failures(history: &[HistoryEvent]) -> Vec<ActivityFailure> {
    let scheduled = scheduled_index(history);

    history
        .iter()
        .filter(|event| event.event_type == EventType::TaskFailed)
        .map(|failed| {
            let activity_name = failed
                .task_scheduled_id
                .and_then(|id| scheduled.get(&id))
                .and_then(|s| s.name.clone())
                .unwrap_or_else(|| UNKNOWN_ACTIVITY.to_string());
            ActivityFailure {
                sequence_number: failed.sequence_number.clone(),
                timestamp: failed.timestamp,
                activity_name,
                task_scheduled_id: failed.task_scheduled_id,
                failure_reason: failed.reason.clone().or_else(|| failed.result.clone()),
                details: failed.details.clone(),
            }
        })
        .collect()
}

/// Pairs each scheduled activity with its first terminal event.
pub fn correlate_activities(history: &[HistoryEvent]) -> Vec<ActivityInvocation> {
    let mut terminal: HashMap<i64, &HistoryEvent> = HashMap::new();
    for event in history
        .iter()
        .filter(|e| matches!(e.event_type, EventType::TaskCompleted | EventType::TaskFailed))
    {
        if let Some(id) = event.task_scheduled_id {
            terminal.entry(id).or_insert(event);
        }
    }

    history
        .iter()
        .filter(|e| e.event_type == EventType::TaskScheduled)
        .map(|scheduled| {
            let key = scheduled.correlation_key();
            let finished = key.and_then(|k| terminal.get(&k)).copied();
            let outcome = match finished {
                None => ActivityOutcome::Pending,
                Some(e) if e.event_type == EventType::TaskCompleted => ActivityOutcome::Completed {
                    result: e.result.clone(),
                },
                Some(e) => ActivityOutcome::Failed {
                    reason: e.reason.clone().or_else(|| e.result.clone()),
                },
            };
            let finished_at = finished.and_then(|e| e.timestamp);
            ActivityInvocation {
                task_scheduled_id: key,
                activity_name: scheduled.name.clone(),
                scheduled_at: scheduled.timestamp,
                outcome,
                finished_at,
                duration_ms: elapsed_ms(scheduled.timestamp, finished_at),
            }
        })
        .collect()
}

fn elapsed_ms(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<i64> {
    Some((end? - start?).num_milliseconds())
}

/// Histogram and lifetime of one instance's log.
pub fn summarize(instance_id: &str, history: &[HistoryEvent]) -> HistorySummary {
    let mut summary = HistorySummary {
        instance_id: instance_id.to_string(),
        total_events: history.len(),
        ..Default::default()
    };

    for event in history {
        *summary
            .event_type_counts
            .entry(event.event_type.as_str().to_string())
            .or_default() += 1;
        match event.event_type {
            EventType::TaskScheduled => summary.activities_scheduled += 1,
            EventType::TaskCompleted => summary.activities_completed += 1,
            EventType::TaskFailed => summary.activities_failed += 1,
            EventType::TimerCreated => summary.timers_created += 1,
            EventType::EventRaised => summary.external_events_raised += 1,
            EventType::SubOrchestrationInstanceCreated => summary.sub_orchestrations_created += 1,
            _ => {}
        }
    }

    let started = history.iter().find(|e| e.event_type == EventType::ExecutionStarted);
    let completed = history.iter().find(|e| e.event_type == EventType::ExecutionCompleted);
    summary.start_time = started.and_then(|e| e.timestamp);
    summary.end_time = completed.and_then(|e| e.timestamp);
    summary.duration_ms = elapsed_ms(summary.start_time, summary.end_time);
    summary.final_status = completed.and_then(|e| e.orchestration_status.clone());
    summary
}
