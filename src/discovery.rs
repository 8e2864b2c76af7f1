//! Task hub discovery from resource naming conventions.
//!
//! Candidates come from table names only: a hub is anything owning a
//! `<hub>Instances` or `<hub>History` table. Queues and containers are then
//! probed per candidate to fill in the rest of the picture.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::providers::{BlobStore, NotFoundExt, ProviderError, QueueStore, RecordStore};
use crate::schema::{self, HISTORY_TABLE_SUFFIX, INSTANCES_TABLE_SUFFIX};
use crate::{InspectError, TaskHubNamespace};

/// Candidate hub names keyed by their lower-cased form.
///
/// The first casing seen for a name is kept as its display name.
pub fn candidate_names<S: AsRef<str>>(tables: &[S]) -> BTreeMap<String, String> {
    let mut candidates = BTreeMap::new();
    for table in tables {
        let table = table.as_ref();
        let candidate = schema::strip_table_suffix(table, INSTANCES_TABLE_SUFFIX)
            .or_else(|| schema::strip_table_suffix(table, HISTORY_TABLE_SUFFIX));
        if let Some(name) = candidate {
            candidates
                .entry(name.to_lowercase())
                .or_insert_with(|| name.to_string());
        }
    }
    candidates
}

#[derive(Debug, Default)]
struct QueueProbe {
    control_queues: Vec<String>,
    has_work_item_queue: bool,
}

#[derive(Debug, Default)]
struct BlobProbe {
    has_large_message_container: bool,
    has_lease_container: bool,
}

/// Which of the hub's two tables appear in `tables`, ignoring case.
fn table_presence<S: AsRef<str>>(tables: &[S], name: &str) -> (bool, bool) {
    let lower = name.to_lowercase();
    let owned_by = |table: &str, suffix: &str| {
        schema::strip_table_suffix(table, suffix).is_some_and(|hub| hub.to_lowercase() == lower)
    };
    tables.iter().fold((false, false), |(instances, history), table| {
        let table = table.as_ref();
        (
            instances || owned_by(table, INSTANCES_TABLE_SUFFIX),
            history || owned_by(table, HISTORY_TABLE_SUFFIX),
        )
    })
}

async fn probe_tables(records: &dyn RecordStore, name: &str) -> Result<(bool, bool), ProviderError> {
    let instances = records
        .table_exists(&schema::instances_table(name))
        .await
        .default_if_not_found()?;
    let history = records
        .table_exists(&schema::history_table(name))
        .await
        .default_if_not_found()?;
    if instances && history {
        return Ok((true, true));
    }

    // Exact names missed; the store may hold them in another casing.
    let listed = records.list_tables().await.default_if_not_found()?;
    let (any_instances, any_history) = table_presence(listed.as_slice(), name);
    Ok((instances || any_instances, history || any_history))
}

async fn probe_queues(queues: &dyn QueueStore, name: &str) -> Result<QueueProbe, ProviderError> {
    let lower = name.to_lowercase();
    let listed = queues.list_queues(&lower).await.default_if_not_found()?;
    let work_items = schema::work_item_queue(name);

    let mut probe = QueueProbe::default();
    for queue in listed.iter().filter(|q| q.to_lowercase().starts_with(&lower)) {
        if schema::is_control_queue(name, queue) {
            probe.control_queues.push(queue.clone());
        } else if queue.eq_ignore_ascii_case(&work_items) {
            probe.has_work_item_queue = true;
        }
    }
    probe.control_queues.sort();
    Ok(probe)
}

async fn probe_blobs(blobs: &dyn BlobStore, name: &str) -> Result<BlobProbe, ProviderError> {
    let listed = blobs
        .list_containers(&name.to_lowercase())
        .await
        .default_if_not_found()?;
    let large_messages = schema::large_message_container(name);
    let leases = schema::lease_container(name);
    Ok(BlobProbe {
        has_large_message_container: listed.iter().any(|c| c.eq_ignore_ascii_case(&large_messages)),
        has_lease_container: listed.iter().any(|c| c.eq_ignore_ascii_case(&leases)),
    })
}

async fn probe_companions(
    queues: &dyn QueueStore,
    blobs: &dyn BlobStore,
    name: &str,
    (has_instance_table, has_history_table): (bool, bool),
) -> Result<TaskHubNamespace, InspectError> {
    let (queue_probe, blob_probe) = tokio::join!(probe_queues(queues, name), probe_blobs(blobs, name));
    let queue_probe = queue_probe?;
    let blob_probe = blob_probe?;

    let namespace = TaskHubNamespace {
        name: name.to_string(),
        has_instance_table,
        has_history_table,
        control_queue_count: u32::try_from(queue_probe.control_queues.len()).unwrap_or(u32::MAX),
        control_queues: queue_probe.control_queues,
        has_work_item_queue: queue_probe.has_work_item_queue,
        has_large_message_container: blob_probe.has_large_message_container,
        has_lease_container: blob_probe.has_lease_container,
    };
    debug!(task_hub = name, exists = namespace.exists(), "namespace probed");
    Ok(namespace)
}

/// Probes every resource of one hub name, whether or not it exists.
///
/// Table names match the hub case-insensitively.
pub async fn describe_namespace(
    records: &dyn RecordStore,
    queues: &dyn QueueStore,
    blobs: &dyn BlobStore,
    name: &str,
) -> Result<TaskHubNamespace, InspectError> {
    let tables = probe_tables(records, name).await?;
    probe_companions(queues, blobs, name, tables).await
}

/// Every task hub that owns an instance or history table.
///
/// Candidates are described concurrently; the result follows the
/// lower-cased name order.
pub async fn discover_namespaces(
    records: &dyn RecordStore,
    queues: &dyn QueueStore,
    blobs: &dyn BlobStore,
) -> Result<Vec<TaskHubNamespace>, InspectError> {
    let tables = records.list_tables().await?;
    let candidates = candidate_names(tables.as_slice());
    debug!(tables = tables.len(), candidates = candidates.len(), "discovery candidates");

    // Every candidate came from a listed table, so each one is a hub.
    let namespaces = try_join_all(candidates.values().map(|name| {
        let presence = table_presence(tables.as_slice(), name);
        probe_companions(queues, blobs, name, presence)
    }))
    .await?;
    info!(count = namespaces.len(), "task hubs discovered");
    Ok(namespaces)
}
