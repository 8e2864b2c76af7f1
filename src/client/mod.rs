use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregation::{self, OrchestrationSummary};
use crate::diagnostics::{self, PeekedMessage, QueueDepth};
use crate::discovery;
use crate::history::{self, ActivityFailure, ActivityInvocation, HistorySummary};
use crate::payload::Payload;
use crate::providers::{BlobStore, QueueStore, RecordStore};
use crate::query::{self, InstanceFilter};
use crate::{EventCategory, HistoryEvent, InspectError, InspectorOptions, OrchestrationInstance, TaskHubNamespace};

/// A failed instance together with the activity failures found in its history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedOrchestration {
    pub instance: OrchestrationInstance,
    pub failures: Vec<ActivityFailure>,
}

/// Read-only entry point over the three storage substrates of a task hub.
///
/// Every method is an independent call: nothing is cached between calls and
/// no method mutates storage. Resource-absent conditions come back as empty
/// results (`None`, an empty `Vec`, or a zero summary), never as errors.
///
/// All store traffic races the inspector's cancellation token; once it is
/// cancelled, in-flight and later calls fail with [`InspectError::Cancelled`].
#[derive(Clone)]
pub struct Inspector {
    records: Arc<dyn RecordStore>,
    queues: Arc<dyn QueueStore>,
    blobs: Arc<dyn BlobStore>,
    options: InspectorOptions,
    cancel: CancellationToken,
}

impl Inspector {
    /// Create an inspector over independent adapters for each substrate.
    pub fn new(records: Arc<dyn RecordStore>, queues: Arc<dyn QueueStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            records,
            queues,
            blobs,
            options: InspectorOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Create an inspector over one adapter that serves all three substrates.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: RecordStore + QueueStore + BlobStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    pub fn with_options(mut self, options: InspectorOptions) -> Self {
        self.options = options;
        self
    }

    /// Bind a caller-owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &InspectorOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn cancellable<T, F>(&self, call: F) -> Result<T, InspectError>
    where
        F: Future<Output = Result<T, InspectError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(InspectError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(InspectError::Cancelled),
            result = call => result,
        }
    }

    // ----- discovery -----

    /// Every task hub owning an instance or history table.
    pub async fn discover_namespaces(&self) -> Result<Vec<TaskHubNamespace>, InspectError> {
        self.cancellable(discovery::discover_namespaces(
            self.records.as_ref(),
            self.queues.as_ref(),
            self.blobs.as_ref(),
        ))
        .await
    }

    /// Resource flags of one hub name; check [`TaskHubNamespace::exists`].
    pub async fn describe_namespace(&self, name: &str) -> Result<TaskHubNamespace, InspectError> {
        self.cancellable(discovery::describe_namespace(
            self.records.as_ref(),
            self.queues.as_ref(),
            self.blobs.as_ref(),
            name,
        ))
        .await
    }

    // ----- instances -----

    /// Instances matching `filter`; `limit` defaults to
    /// [`InspectorOptions::default_list_limit`].
    pub async fn list_instances(
        &self,
        hub: &str,
        filter: InstanceFilter,
        limit: Option<usize>,
    ) -> Result<Vec<OrchestrationInstance>, InspectError> {
        query::list_instances(
            self.records.as_ref(),
            hub,
            &filter,
            limit.unwrap_or(self.options.default_list_limit),
            self.options.page_size,
            self.options.strict_time_filters,
            &self.cancel,
        )
        .await
    }

    pub async fn get_instance(
        &self,
        hub: &str,
        instance_id: &str,
    ) -> Result<Option<OrchestrationInstance>, InspectError> {
        query::get_instance(self.records.as_ref(), hub, instance_id, &self.cancel).await
    }

    /// Instances whose id starts with `prefix`; an empty prefix lists all.
    pub async fn search_by_id_prefix(
        &self,
        hub: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<OrchestrationInstance>, InspectError> {
        query::search_by_id_prefix(
            self.records.as_ref(),
            hub,
            prefix,
            limit.unwrap_or(self.options.default_list_limit),
            self.options.page_size,
            &self.cancel,
        )
        .await
    }

    /// Per-status counts. Scans the whole instance table.
    pub async fn summarize_namespace(&self, hub: &str) -> Result<OrchestrationSummary, InspectError> {
        aggregation::summarize_namespace(self.records.as_ref(), hub, self.options.page_size, &self.cancel).await
    }

    // ----- history -----

    /// History of one instance in sequence order.
    pub async fn get_history(
        &self,
        hub: &str,
        instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEvent>, InspectError> {
        history::get_history(
            self.records.as_ref(),
            hub,
            instance_id,
            limit.or(self.options.default_history_limit),
            self.options.page_size,
            &self.cancel,
        )
        .await
    }

    async fn full_history(&self, hub: &str, instance_id: &str) -> Result<Vec<HistoryEvent>, InspectError> {
        history::get_history(
            self.records.as_ref(),
            hub,
            instance_id,
            None,
            self.options.page_size,
            &self.cancel,
        )
        .await
    }

    /// History events of one category, in sequence order.
    pub async fn get_events_of_kind(
        &self,
        hub: &str,
        instance_id: &str,
        category: EventCategory,
    ) -> Result<Vec<HistoryEvent>, InspectError> {
        let events = self.full_history(hub, instance_id).await?;
        Ok(history::events_of_kind(&events, category).into_iter().cloned().collect())
    }

    pub async fn get_failed_activities(
        &self,
        hub: &str,
        instance_id: &str,
    ) -> Result<Vec<ActivityFailure>, InspectError> {
        let events = self.full_history(hub, instance_id).await?;
        Ok(history::correlate_failures(&events))
    }

    pub async fn get_activity_invocations(
        &self,
        hub: &str,
        instance_id: &str,
    ) -> Result<Vec<ActivityInvocation>, InspectError> {
        let events = self.full_history(hub, instance_id).await?;
        Ok(history::correlate_activities(&events))
    }

    pub async fn summarize_history(&self, hub: &str, instance_id: &str) -> Result<HistorySummary, InspectError> {
        let events = self.full_history(hub, instance_id).await?;
        Ok(history::summarize(instance_id, &events))
    }

    /// Failed instances with their correlated activity failures.
    ///
    /// Histories are fetched with at most
    /// [`InspectorOptions::max_concurrent_history_fetches`] in flight; the
    /// output keeps the listing order.
    pub async fn failed_orchestrations_with_reasons(
        &self,
        hub: &str,
        limit: Option<usize>,
    ) -> Result<Vec<FailedOrchestration>, InspectError> {
        let failed = self.list_instances(hub, InstanceFilter::status("Failed"), limit).await?;
        debug!(task_hub = hub, instances = failed.len(), "correlating failed instances");

        stream::iter(failed)
            .map(|instance| async move {
                let events = self.full_history(hub, &instance.instance_id).await?;
                let failures = history::correlate_failures(&events);
                Ok::<_, InspectError>(FailedOrchestration { instance, failures })
            })
            .buffered(self.options.max_concurrent_history_fetches.max(1))
            .try_collect()
            .await
    }

    // ----- queues and blobs -----

    pub async fn queue_depths(&self, hub: &str) -> Result<Vec<QueueDepth>, InspectError> {
        self.cancellable(diagnostics::queue_depths(self.queues.as_ref(), hub)).await
    }

    pub async fn peek_queue(&self, hub: &str, queue: &str, max: usize) -> Result<Vec<PeekedMessage>, InspectError> {
        self.cancellable(diagnostics::peek_queue(self.queues.as_ref(), hub, queue, max))
            .await
    }

    pub async fn list_large_messages(&self, hub: &str, limit: Option<usize>) -> Result<Vec<String>, InspectError> {
        self.cancellable(diagnostics::list_large_messages(self.blobs.as_ref(), hub, limit))
            .await
    }

    pub async fn get_large_message(&self, hub: &str, blob: &str) -> Result<Option<Payload>, InspectError> {
        self.cancellable(diagnostics::get_large_message(self.blobs.as_ref(), hub, blob))
            .await
    }
}
