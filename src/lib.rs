//! # taskhub-inspect
//!
//! Read-only discovery, querying, and diagnosis of durable task hubs.
//!
//! A durable task engine persists everything it knows about its workflows in
//! three places: a key-ordered table store (one `<hub>Instances` table with
//! the current state of every instance and one `<hub>History` table with the
//! append-only event log), a set of queues (`<hub>-control-NN`,
//! `<hub>-workitems`), and blob containers (`<hub>-largemessages`,
//! `<hub>-leases`). This crate reads those resources directly, without the
//! engine's runtime, and answers operator questions:
//!
//! - Which task hubs exist, and which of their resources are present?
//! - Which instances are failed, running, or named `X`, created in a window?
//! - What happened inside one instance, and why did its activities fail?
//! - How many instances sit in each status?
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskhub_inspect::providers::in_memory::InMemoryStore;
//! use taskhub_inspect::query::InstanceFilter;
//! use taskhub_inspect::Inspector;
//!
//! # async fn example() -> Result<(), taskhub_inspect::InspectError> {
//! let store = Arc::new(InMemoryStore::new());
//! let inspector = Inspector::from_store(store);
//!
//! for hub in inspector.discover_namespaces().await? {
//!     let summary = inspector.summarize_namespace(&hub.name).await?;
//!     println!("{}: {} instances, {} failed", hub.name, summary.total_count, summary.failed);
//!
//!     let failed = inspector
//!         .list_instances(&hub.name, InstanceFilter::status("Failed"), Some(10))
//!         .await?;
//!     for instance in failed {
//!         let history = inspector.get_history(&hub.name, &instance.instance_id, None).await?;
//!         for failure in taskhub_inspect::history::correlate_failures(&history) {
//!             println!("  {} failed: {:?}", failure.activity_name, failure.failure_reason);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency
//!
//! The substrates offer eventually consistent reads. Counts and queue depths
//! are approximate snapshots; nothing here is transactional.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod aggregation;
pub mod client;
pub mod diagnostics;
pub mod discovery;
mod error;
pub mod history;
pub mod observability;
mod options;
pub mod payload;
pub mod providers;
pub mod query;
pub mod schema;

pub use aggregation::OrchestrationSummary;
pub use client::{FailedOrchestration, Inspector};
pub use error::InspectError;
pub use history::{ActivityFailure, ActivityInvocation, ActivityOutcome, HistorySummary};
pub use options::InspectorOptions;

/// Logical group of storage resources sharing a name prefix.
///
/// Identity is the case-insensitive `name`. Discovery only reports a
/// namespace that owns at least one of its two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHubNamespace {
    pub name: String,
    pub has_instance_table: bool,
    pub has_history_table: bool,
    pub control_queue_count: u32,
    /// Matched control queues, sorted.
    pub control_queues: Vec<String>,
    pub has_work_item_queue: bool,
    pub has_large_message_container: bool,
    pub has_lease_container: bool,
}

impl TaskHubNamespace {
    /// True when at least one resource of the namespace was found.
    pub fn exists(&self) -> bool {
        self.has_instance_table
            || self.has_history_table
            || self.control_queue_count > 0
            || self.has_work_item_queue
            || self.has_large_message_container
            || self.has_lease_container
    }
}

/// Runtime status of an orchestration instance.
///
/// Open set: values outside the seven known statuses pass through verbatim
/// as [`RuntimeStatus::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeStatus {
    Running,
    Completed,
    Failed,
    Pending,
    Terminated,
    Suspended,
    ContinuedAsNew,
    Unknown(String),
}

impl RuntimeStatus {
    pub const KNOWN: [RuntimeStatus; 7] = [
        RuntimeStatus::Running,
        RuntimeStatus::Completed,
        RuntimeStatus::Failed,
        RuntimeStatus::Pending,
        RuntimeStatus::Terminated,
        RuntimeStatus::Suspended,
        RuntimeStatus::ContinuedAsNew,
    ];

    /// Case-insensitive parse; never fails.
    pub fn parse(value: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(value.trim()))
            .cloned()
            .unwrap_or_else(|| RuntimeStatus::Unknown(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            RuntimeStatus::Running => "Running",
            RuntimeStatus::Completed => "Completed",
            RuntimeStatus::Failed => "Failed",
            RuntimeStatus::Pending => "Pending",
            RuntimeStatus::Terminated => "Terminated",
            RuntimeStatus::Suspended => "Suspended",
            RuntimeStatus::ContinuedAsNew => "ContinuedAsNew",
            RuntimeStatus::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RuntimeStatus::Unknown(_))
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RuntimeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RuntimeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RuntimeStatus::parse(&raw))
    }
}

/// Current projected state of one orchestration instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationInstance {
    pub instance_id: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub runtime_status: RuntimeStatus,
    pub input: Option<String>,
    pub output: Option<String>,
    pub custom_status: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub last_updated_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    /// Changes with every continue-as-new generation.
    pub execution_id: Option<String>,
    pub task_hub_name: String,
}

/// Semantic bucket of related event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Activity,
    SubOrchestration,
    Timer,
    External,
}

/// Event type tag of a history row.
///
/// Open set: tags introduced by newer engines are kept as
/// [`EventType::Unknown`] and fall outside every [`EventCategory`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionTerminated,
    ExecutionSuspended,
    ExecutionResumed,
    ContinueAsNew,
    OrchestratorStarted,
    OrchestratorCompleted,
    TaskScheduled,
    TaskCompleted,
    TaskFailed,
    SubOrchestrationInstanceCreated,
    SubOrchestrationInstanceCompleted,
    SubOrchestrationInstanceFailed,
    TimerCreated,
    TimerFired,
    EventRaised,
    EventSent,
    GenericEvent,
    HistoryState,
    Unknown(String),
}

impl EventType {
    const KNOWN: [EventType; 20] = [
        EventType::ExecutionStarted,
        EventType::ExecutionCompleted,
        EventType::ExecutionTerminated,
        EventType::ExecutionSuspended,
        EventType::ExecutionResumed,
        EventType::ContinueAsNew,
        EventType::OrchestratorStarted,
        EventType::OrchestratorCompleted,
        EventType::TaskScheduled,
        EventType::TaskCompleted,
        EventType::TaskFailed,
        EventType::SubOrchestrationInstanceCreated,
        EventType::SubOrchestrationInstanceCompleted,
        EventType::SubOrchestrationInstanceFailed,
        EventType::TimerCreated,
        EventType::TimerFired,
        EventType::EventRaised,
        EventType::EventSent,
        EventType::GenericEvent,
        EventType::HistoryState,
    ];

    pub fn parse(value: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(value))
            .cloned()
            .unwrap_or_else(|| EventType::Unknown(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::ExecutionStarted => "ExecutionStarted",
            EventType::ExecutionCompleted => "ExecutionCompleted",
            EventType::ExecutionTerminated => "ExecutionTerminated",
            EventType::ExecutionSuspended => "ExecutionSuspended",
            EventType::ExecutionResumed => "ExecutionResumed",
            EventType::ContinueAsNew => "ContinueAsNew",
            EventType::OrchestratorStarted => "OrchestratorStarted",
            EventType::OrchestratorCompleted => "OrchestratorCompleted",
            EventType::TaskScheduled => "TaskScheduled",
            EventType::TaskCompleted => "TaskCompleted",
            EventType::TaskFailed => "TaskFailed",
            EventType::SubOrchestrationInstanceCreated => "SubOrchestrationInstanceCreated",
            EventType::SubOrchestrationInstanceCompleted => "SubOrchestrationInstanceCompleted",
            EventType::SubOrchestrationInstanceFailed => "SubOrchestrationInstanceFailed",
            EventType::TimerCreated => "TimerCreated",
            EventType::TimerFired => "TimerFired",
            EventType::EventRaised => "EventRaised",
            EventType::EventSent => "EventSent",
            EventType::GenericEvent => "GenericEvent",
            EventType::HistoryState => "HistoryState",
            EventType::Unknown(raw) => raw,
        }
    }

    /// The bucket this type belongs to; each type belongs to at most one.
    pub fn category(&self) -> Option<EventCategory> {
        match self {
            EventType::TaskScheduled | EventType::TaskCompleted | EventType::TaskFailed => {
                Some(EventCategory::Activity)
            }
            EventType::SubOrchestrationInstanceCreated
            | EventType::SubOrchestrationInstanceCompleted
            | EventType::SubOrchestrationInstanceFailed => Some(EventCategory::SubOrchestration),
            EventType::TimerCreated | EventType::TimerFired => Some(EventCategory::Timer),
            EventType::EventRaised | EventType::EventSent => Some(EventCategory::External),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventType::parse(&raw))
    }
}

/// One append-only history entry of an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub instance_id: String,
    /// Sort token within the instance; not necessarily numeric.
    pub sequence_number: String,
    pub event_type: EventType,
    pub timestamp: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub input: Option<String>,
    pub result: Option<String>,
    /// Engine-assigned id of the event within its execution.
    pub event_id: Option<i64>,
    /// Links a terminal event to the event that scheduled the work.
    pub task_scheduled_id: Option<i64>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub fire_at: Option<DateTime<Utc>>,
    pub orchestration_status: Option<String>,
    pub execution_id: Option<String>,
    pub reason: Option<String>,
    pub details: Option<String>,
    pub is_played: Option<bool>,
}

impl HistoryEvent {
    /// Bare event with only identity and type set.
    pub fn new(instance_id: impl Into<String>, sequence_number: impl Into<String>, event_type: EventType) -> Self {
        Self {
            instance_id: instance_id.into(),
            sequence_number: sequence_number.into(),
            event_type,
            timestamp: None,
            name: None,
            input: None,
            result: None,
            event_id: None,
            task_scheduled_id: None,
            scheduled_time: None,
            fire_at: None,
            orchestration_status: None,
            execution_id: None,
            reason: None,
            details: None,
            is_played: None,
        }
    }

    /// Key under which a scheduling event is found by its terminal counterpart.
    pub fn correlation_key(&self) -> Option<i64> {
        self.task_scheduled_id.or(self.event_id)
    }
}
