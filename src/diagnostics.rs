//! Queue and large-message diagnostics.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;

use crate::payload::Payload;
use crate::providers::{BlobStore, MAX_PEEK_MESSAGES, NotFoundExt, QueueStore};
use crate::schema;
use crate::InspectError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub name: String,
    pub approximate_count: u64,
}

/// A queue message observed without dequeuing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeekedMessage {
    pub message_id: String,
    pub inserted_at: Option<DateTime<Utc>>,
    pub dequeue_count: u32,
    pub payload: Payload,
}

/// Approximate depth of every queue of `hub`: control queues in name order,
/// then the work-item queue.
pub async fn queue_depths(queues: &dyn QueueStore, hub: &str) -> Result<Vec<QueueDepth>, InspectError> {
    let lower = hub.to_lowercase();
    let listed = queues.list_queues(&lower).await.default_if_not_found()?;

    let mut names: Vec<String> = listed
        .iter()
        .filter(|q| schema::is_control_queue(hub, q))
        .cloned()
        .collect();
    names.sort();
    let work_items = schema::work_item_queue(hub);
    if let Some(queue) = listed.iter().find(|q| q.eq_ignore_ascii_case(&work_items)) {
        names.push(queue.clone());
    }

    let counts = try_join_all(names.iter().map(|name| queues.approximate_depth(name))).await?;
    Ok(names
        .into_iter()
        .zip(counts)
        .map(|(name, approximate_count)| QueueDepth { name, approximate_count })
        .collect())
}

/// Peeks up to `max` messages (clamped to `1..=32`) from a queue of `hub`.
///
/// The queue must carry the hub's name prefix. A missing queue has no
/// messages.
pub async fn peek_queue(
    queues: &dyn QueueStore,
    hub: &str,
    queue: &str,
    max: usize,
) -> Result<Vec<PeekedMessage>, InspectError> {
    let prefix = format!("{}-", hub.to_lowercase());
    if !queue.to_lowercase().starts_with(&prefix) {
        return Err(InspectError::InvalidArgument(format!(
            "queue '{queue}' does not belong to task hub '{hub}'"
        )));
    }

    let max = max.clamp(1, MAX_PEEK_MESSAGES);
    let messages = queues.peek_messages(queue, max).await.default_if_not_found()?;
    debug!(task_hub = hub, queue, peeked = messages.len(), "queue peeked");

    Ok(messages
        .into_iter()
        .map(|m| PeekedMessage {
            payload: Payload::detect(&m.content),
            message_id: m.message_id,
            inserted_at: m.inserted_at,
            dequeue_count: m.dequeue_count,
        })
        .collect())
}

/// Blob names in the hub's large-message container.
pub async fn list_large_messages(
    blobs: &dyn BlobStore,
    hub: &str,
    limit: Option<usize>,
) -> Result<Vec<String>, InspectError> {
    let container = schema::large_message_container(hub);
    Ok(blobs.list_blobs(&container, limit).await.default_if_not_found()?)
}

/// Content of one large message; `None` when the blob or container is absent.
pub async fn get_large_message(blobs: &dyn BlobStore, hub: &str, blob: &str) -> Result<Option<Payload>, InspectError> {
    let container = schema::large_message_container(hub);
    let text = blobs.download_text(&container, blob).await.default_if_not_found()?;
    Ok(text.as_deref().map(Payload::detect))
}
