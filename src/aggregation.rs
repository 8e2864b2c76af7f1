//! Per-status instance counts of a task hub.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::providers::{RecordCursor, RecordStore, ScanQuery};
use crate::schema::{self, instance as col};
use crate::{InspectError, RuntimeStatus};

/// Instance counts of one task hub.
///
/// `total_count` counts every instance row; instances whose status is not
/// one of the seven known values are included there and in no bucket, so
/// the buckets may sum to less than the total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationSummary {
    pub task_hub_name: String,
    pub total_count: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
    pub terminated: u64,
    pub suspended: u64,
    pub continued_as_new: u64,
}

impl OrchestrationSummary {
    pub fn new(task_hub_name: impl Into<String>) -> Self {
        Self {
            task_hub_name: task_hub_name.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, status: &RuntimeStatus) {
        self.total_count += 1;
        let bucket = match status {
            RuntimeStatus::Running => &mut self.running,
            RuntimeStatus::Completed => &mut self.completed,
            RuntimeStatus::Failed => &mut self.failed,
            RuntimeStatus::Pending => &mut self.pending,
            RuntimeStatus::Terminated => &mut self.terminated,
            RuntimeStatus::Suspended => &mut self.suspended,
            RuntimeStatus::ContinuedAsNew => &mut self.continued_as_new,
            RuntimeStatus::Unknown(_) => return,
        };
        *bucket += 1;
    }

    /// Sum of the seven status buckets.
    pub fn bucketed_count(&self) -> u64 {
        self.running
            + self.completed
            + self.failed
            + self.pending
            + self.terminated
            + self.suspended
            + self.continued_as_new
    }
}

/// Counts every instance of `hub` by runtime status.
///
/// This is a full scan of the instance table projected to the status
/// column; cost grows linearly with the number of instances.
pub async fn summarize_namespace(
    store: &dyn RecordStore,
    hub: &str,
    page_size: usize,
    cancel: &CancellationToken,
) -> Result<OrchestrationSummary, InspectError> {
    let table = schema::instances_table(hub);
    let query = ScanQuery::new().select([col::RUNTIME_STATUS]).page_size(page_size);
    let mut cursor = RecordCursor::new(store, table.as_str(), query, cancel.clone());
    let mut summary = OrchestrationSummary::new(hub);

    loop {
        let record = match cursor.next().await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) if e.is_not_found() => {
                debug!(task_hub = hub, table = %table, "instance table absent");
                return Ok(OrchestrationSummary::new(hub));
            }
            Err(e) => return Err(e),
        };
        if record.row_key != schema::INSTANCE_ROW_KEY {
            continue;
        }
        summary.record(&RuntimeStatus::parse(record.get_str(col::RUNTIME_STATUS).unwrap_or_default()));
    }

    debug!(
        task_hub = hub,
        total = summary.total_count,
        segments = cursor.segments_fetched(),
        "namespace summarized"
    );
    Ok(summary)
}
