//! Instance queries: filter composition, point lookups, and prefix search.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::history::{text_column, time_column};
use crate::providers::{
    CompareOp, Field, NotFoundExt, Predicate, Record, RecordCursor, RecordStore, ScanQuery, run_cancellable,
};
use crate::schema::{self, instance as col};
use crate::{InspectError, OrchestrationInstance, RuntimeStatus};

/// Optional criteria for listing instances; every present field adds one
/// AND-ed clause.
///
/// Timestamps are strings so callers can pass user input through
/// unchanged. Accepted forms are RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC),
/// and `YYYY-MM-DD` (midnight UTC).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFilter {
    pub runtime_status: Option<String>,
    pub name: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
}

impl InstanceFilter {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            runtime_status: Some(status.into()),
            ..Default::default()
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.runtime_status = Some(status.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn created_after(mut self, time: impl Into<String>) -> Self {
        self.created_after = Some(time.into());
        self
    }

    pub fn created_before(mut self, time: impl Into<String>) -> Self {
        self.created_before = Some(time.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.runtime_status.is_none()
            && self.name.is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
    }
}

/// Parses a filter timestamp in any of the accepted forms.
pub fn parse_filter_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Builds the predicate for `filter`.
///
/// With `strict` unset an unparsable timestamp drops its clause with a
/// warning, widening the result; with `strict` set it is rejected.
pub fn compose_filter(filter: &InstanceFilter, strict: bool) -> Result<Option<Predicate>, InspectError> {
    let mut clauses = Vec::new();

    if let Some(status) = &filter.runtime_status {
        let status = RuntimeStatus::parse(status);
        clauses.push(Predicate::eq(Field::property(col::RUNTIME_STATUS), status.as_str()));
    }
    if let Some(name) = &filter.name {
        clauses.push(Predicate::eq(Field::property(col::NAME), name.as_str()));
    }

    let bounds = [
        ("created_after", filter.created_after.as_deref(), CompareOp::Ge),
        ("created_before", filter.created_before.as_deref(), CompareOp::Le),
    ];
    for (criterion, raw, op) in bounds {
        let Some(raw) = raw else { continue };
        match parse_filter_time(raw) {
            Some(time) => clauses.push(Predicate::compare(Field::property(col::CREATED_TIME), op, time)),
            None if strict => {
                return Err(InspectError::InvalidArgument(format!("{criterion}: unparsable timestamp '{raw}'")));
            }
            None => warn!(criterion, value = raw, "dropping unparsable timestamp filter"),
        }
    }

    Ok(Predicate::all(clauses))
}

/// Half-open partition key range covering every key that starts with `prefix`.
///
/// `None` for an empty prefix, which matches every key.
pub fn prefix_predicate(prefix: &str, sentinel: char) -> Option<Predicate> {
    if prefix.is_empty() {
        return None;
    }
    Some(Predicate::partition_key_range(prefix, format!("{prefix}{sentinel}")))
}

/// Decodes one instance row; undecodable columns are treated as absent.
pub fn instance_from_record(hub: &str, record: &Record) -> OrchestrationInstance {
    let text = |column: &str| text_column(record, column);
    let time = |column: &str| time_column(record, column);

    OrchestrationInstance {
        instance_id: record.partition_key.clone(),
        name: text(col::NAME),
        version: text(col::VERSION),
        runtime_status: RuntimeStatus::parse(record.get_str(col::RUNTIME_STATUS).unwrap_or_default()),
        input: text(col::INPUT),
        output: text(col::OUTPUT),
        custom_status: text(col::CUSTOM_STATUS),
        created_time: time(col::CREATED_TIME),
        last_updated_time: time(col::LAST_UPDATED_TIME),
        completed_time: time(col::COMPLETED_TIME),
        execution_id: text(col::EXECUTION_ID),
        task_hub_name: hub.to_string(),
    }
}

async fn scan_instances(
    store: &dyn RecordStore,
    hub: &str,
    filter: Option<Predicate>,
    limit: usize,
    page_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<OrchestrationInstance>, InspectError> {
    let table = schema::instances_table(hub);
    let current_state_rows = Predicate::eq(Field::RowKey, schema::INSTANCE_ROW_KEY);
    let filter = Predicate::all(filter.into_iter().chain([current_state_rows]).collect());
    if let Some(filter) = &filter {
        debug!(task_hub = hub, table = %table, filter = %filter, limit, "scanning instances");
    }

    let query = ScanQuery::new()
        .filter(filter)
        .page_size(limit.min(page_size));
    let cursor = RecordCursor::new(store, table.as_str(), query, cancel.clone());
    let records = match cursor.collect_limited(Some(limit)).await {
        Ok(records) => records,
        Err(e) if e.is_not_found() => {
            debug!(task_hub = hub, table = %table, "instance table absent");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    Ok(records.iter().map(|record| instance_from_record(hub, record)).collect())
}

/// Lists instances matching `filter`, stopping after `limit` rows.
pub async fn list_instances(
    store: &dyn RecordStore,
    hub: &str,
    filter: &InstanceFilter,
    limit: usize,
    page_size: usize,
    strict_time_filters: bool,
    cancel: &CancellationToken,
) -> Result<Vec<OrchestrationInstance>, InspectError> {
    let predicate = compose_filter(filter, strict_time_filters)?;
    scan_instances(store, hub, predicate, limit, page_size, cancel).await
}

/// Point lookup of one instance; a missing row or table is `None`.
pub async fn get_instance(
    store: &dyn RecordStore,
    hub: &str,
    instance_id: &str,
    cancel: &CancellationToken,
) -> Result<Option<OrchestrationInstance>, InspectError> {
    let table = schema::instances_table(hub);
    let record = run_cancellable(cancel, async {
        store
            .get_record(&table, instance_id, schema::INSTANCE_ROW_KEY)
            .await
            .default_if_not_found()
    })
    .await?;
    Ok(record.map(|record| instance_from_record(hub, &record)))
}

/// Instances whose id starts with `prefix`, in key order.
pub async fn search_by_id_prefix(
    store: &dyn RecordStore,
    hub: &str,
    prefix: &str,
    limit: usize,
    page_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<OrchestrationInstance>, InspectError> {
    let predicate = prefix_predicate(prefix, store.key_sentinel());
    scan_instances(store, hub, predicate, limit, page_size, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MAX_KEY_SENTINEL;
    use crate::providers::in_memory::InMemoryStore;

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new().with_segment_size(2);
        store.create_table("ShopInstances");
        for (id, status, name) in [
            ("order-001", "Failed", "ProcessOrder"),
            ("order-002", "Completed", "ProcessOrder"),
            ("invoice-1", "Failed", "SendInvoice"),
            ("order-003", "Running", "ProcessOrder"),
        ] {
            store.insert_record(
                "ShopInstances",
                Record::new(id, "")
                    .with(col::RUNTIME_STATUS, status)
                    .with(col::NAME, name)
                    .with(col::CREATED_TIME, "2024-03-01T10:00:00Z"),
            );
        }
        store
    }

    #[test]
    fn composes_all_clauses_in_order() {
        let filter = InstanceFilter::status("failed")
            .with_name("O'Brien")
            .created_after("2024-01-01")
            .created_before("2024-02-01T00:00:00Z");
        let predicate = compose_filter(&filter, false).unwrap().unwrap();
        assert_eq!(
            predicate.to_string(),
            "RuntimeStatus eq 'Failed' and Name eq 'O''Brien' and \
             CreatedTime ge datetime'2024-01-01T00:00:00.000Z' and \
             CreatedTime le datetime'2024-02-01T00:00:00.000Z'"
        );
    }

    #[test]
    fn empty_filter_has_no_predicate() {
        assert!(InstanceFilter::default().is_empty());
        assert_eq!(compose_filter(&InstanceFilter::default(), true).unwrap(), None);
    }

    #[test]
    fn malformed_time_is_dropped_or_rejected() {
        let filter = InstanceFilter::status("Running").created_after("last tuesday");
        let lenient = compose_filter(&filter, false).unwrap().unwrap();
        assert_eq!(lenient.to_string(), "RuntimeStatus eq 'Running'");

        let strict = compose_filter(&filter, true).unwrap_err();
        assert!(matches!(strict, InspectError::InvalidArgument(_)));
    }

    #[test]
    fn accepted_time_forms() {
        let expected = parse_filter_time("2024-05-06T07:08:09Z").unwrap();
        assert_eq!(parse_filter_time("2024-05-06T07:08:09"), Some(expected));
        assert_eq!(parse_filter_time("2024-05-06T09:08:09+02:00"), Some(expected));
        assert!(parse_filter_time("2024-05-06").is_some());
        assert_eq!(parse_filter_time("06/05/2024"), None);
    }

    #[test]
    fn prefix_range_uses_sentinel() {
        assert_eq!(prefix_predicate("", MAX_KEY_SENTINEL), None);
        let range = prefix_predicate("order-", '\u{FFFF}').unwrap();
        assert_eq!(
            range.to_string(),
            "PartitionKey ge 'order-' and PartitionKey lt 'order-\u{FFFF}'"
        );
    }

    #[tokio::test]
    async fn prefix_search_returns_only_matching_ids() {
        let store = store();
        let found = search_by_id_prefix(&store, "Shop", "order-00", 10, 1000, &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, ["order-001", "order-002", "order-003"]);
        assert!(found.iter().all(|i| i.task_hub_name == "Shop"));
    }

    #[tokio::test]
    async fn list_respects_filter_and_limit() {
        let store = store();
        let cancel = CancellationToken::new();
        let failed = list_instances(&store, "Shop", &InstanceFilter::status("Failed"), 10, 1000, false, &cancel)
            .await
            .unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|i| i.runtime_status == RuntimeStatus::Failed));

        let one = list_instances(&store, "Shop", &InstanceFilter::default(), 1, 1000, false, &cancel)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn stray_rows_do_not_eat_the_limit() {
        let store = store();
        for key in ["a-1", "a-2", "a-3"] {
            store.insert_record("ShopInstances", Record::new(key, "checkpoint").with(col::RUNTIME_STATUS, "Failed"));
        }
        let cancel = CancellationToken::new();

        let listed = list_instances(&store, "Shop", &InstanceFilter::default(), 2, 1000, false, &cancel)
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, ["invoice-1", "order-001"]);

        let failed = list_instances(&store, "Shop", &InstanceFilter::status("Failed"), 2, 1000, false, &cancel)
            .await
            .unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|i| !i.instance_id.starts_with("a-")));
    }

    #[tokio::test]
    async fn point_lookup_maps_absence_to_none() {
        let store = store();
        let cancel = CancellationToken::new();
        let found = get_instance(&store, "Shop", "order-002", &cancel).await.unwrap().unwrap();
        assert_eq!(found.runtime_status, RuntimeStatus::Completed);
        assert_eq!(found.name.as_deref(), Some("ProcessOrder"));
        assert!(found.created_time.is_some());

        assert!(get_instance(&store, "Shop", "nope", &cancel).await.unwrap().is_none());
        assert!(get_instance(&store, "Other", "order-002", &cancel).await.unwrap().is_none());
    }
}
