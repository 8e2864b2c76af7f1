//! The inspector over an on-disk SQLite snapshot answers like the in-memory store.

use taskhub_inspect::query::InstanceFilter;
use taskhub_inspect::{Inspector, InspectorOptions};

mod common;
use common::SHOP;

async fn both() -> (Inspector, Inspector, tempfile::TempDir) {
    let (sqlite, td) = common::shop_sqlite_disk().await;
    let small_pages = InspectorOptions {
        page_size: 2,
        ..Default::default()
    };
    (
        Inspector::from_store(common::shop_store()),
        Inspector::from_store(sqlite).with_options(small_pages),
        td,
    )
}

#[tokio::test]
async fn discovery_matches() {
    let (memory, sqlite, _td) = both().await;
    assert_eq!(
        memory.discover_namespaces().await.unwrap(),
        sqlite.discover_namespaces().await.unwrap()
    );
}

#[tokio::test]
async fn summaries_match() {
    let (memory, sqlite, _td) = both().await;
    let summary = sqlite.summarize_namespace(SHOP).await.unwrap();
    assert_eq!(summary.total_count, 5);
    assert_eq!(memory.summarize_namespace(SHOP).await.unwrap(), summary);
}

#[tokio::test]
async fn instance_queries_match() {
    let (memory, sqlite, _td) = both().await;

    let filter = InstanceFilter::status("Failed").created_after("2024-03-01T00:00:00Z");
    assert_eq!(
        memory.list_instances(SHOP, filter.clone(), None).await.unwrap(),
        sqlite.list_instances(SHOP, filter, None).await.unwrap()
    );

    let orders = sqlite.search_by_id_prefix(SHOP, "order-", None).await.unwrap();
    assert_eq!(orders.len(), 3);
    assert_eq!(memory.search_by_id_prefix(SHOP, "order-", None).await.unwrap(), orders);

    assert_eq!(
        memory.get_instance(SHOP, "invoice-1").await.unwrap(),
        sqlite.get_instance(SHOP, "invoice-1").await.unwrap()
    );
    assert!(sqlite.get_instance("Nowhere", "invoice-1").await.unwrap().is_none());
}

#[tokio::test]
async fn histories_match() {
    let (memory, sqlite, _td) = both().await;
    for id in ["order-001", "invoice-1", "order-002"] {
        let expected = memory.get_history(SHOP, id, None).await.unwrap();
        let actual = sqlite.get_history(SHOP, id, None).await.unwrap();
        assert_eq!(expected, actual, "history of {id}");
    }

    let failed = sqlite.failed_orchestrations_with_reasons(SHOP, None).await.unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[1].failures[0].activity_name, "Ship");
}

#[tokio::test]
async fn queues_and_blobs_match() {
    let (memory, sqlite, _td) = both().await;
    assert_eq!(
        memory.queue_depths(SHOP).await.unwrap(),
        sqlite.queue_depths(SHOP).await.unwrap()
    );

    let peeked = sqlite.peek_queue(SHOP, "shop-control-00", 32).await.unwrap();
    assert_eq!(peeked.len(), 2);
    assert_eq!(peeked[0].message_id, "m-1");
    assert!(peeked[0].payload.is_json());

    assert_eq!(
        memory.list_large_messages(SHOP, None).await.unwrap(),
        sqlite.list_large_messages(SHOP, None).await.unwrap()
    );
}
