//! Refetch and optimistic consistency as seen by bus subscribers.

mod common;

use common::mock_backend::{MockBackend, MockResponse};
use common::{http_store, mount_service, names, seeded_database, start_store};
use mfe_container::service::{ConsistencyMode, Entity, Record, RecordId};
use parking_lot::Mutex;
use std::sync::Arc;

type Broadcasts = Arc<Mutex<Vec<Vec<Record>>>>;

fn record_items(api: &mfe_container::service::ServiceApi) -> (Broadcasts, mfe_container::bus::Subscription) {
    let broadcasts: Broadcasts = Arc::new(Mutex::new(Vec::new()));
    let b = broadcasts.clone();
    let sub = api.on_records(Entity::Items, move |records| b.lock().push(records.to_vec()));
    (broadcasts, sub)
}

fn is_pending(id: &RecordId) -> bool {
    matches!(id, RecordId::Text(text) if text.starts_with("pending-"))
}

/// Refetch mode broadcasts only the list the store returns.
#[tokio::test]
async fn test_refetch_mode_broadcasts_once() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;
    service.api.fetch_items().await.unwrap();
    let (broadcasts, _sub) = record_items(&service.api);

    service.api.add_item("Test").await.unwrap();

    let broadcasts = broadcasts.lock();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(names(&broadcasts[0]), vec!["Item1", "Test"]);
    assert!(broadcasts[0].iter().all(|r| !is_pending(&r.id)));
}

/// Optimistic mode shows a provisional record first, then the store's list.
#[tokio::test]
async fn test_optimistic_add() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Optimistic).await;
    service.api.fetch_items().await.unwrap();
    let (broadcasts, _sub) = record_items(&service.api);

    let created = service.api.add_item("Test").await.unwrap();

    let broadcasts = broadcasts.lock();
    assert_eq!(broadcasts.len(), 2);
    assert_eq!(names(&broadcasts[0]), vec!["Item1", "Test"]);
    assert!(is_pending(&broadcasts[0][1].id));
    assert_eq!(names(&broadcasts[1]), vec!["Item1", "Test"]);
    assert_eq!(broadcasts[1][1].id, created.id);
    assert_eq!(service.api.snapshot(Entity::Items), broadcasts[1]);
}

/// Optimistic remove drops the record at once; the refetch confirms it.
#[tokio::test]
async fn test_optimistic_remove() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Optimistic).await;
    service.api.add_item("Second").await.unwrap();
    let (broadcasts, _sub) = record_items(&service.api);

    service.api.remove_item(1u64).await.unwrap();

    let broadcasts = broadcasts.lock();
    assert_eq!(broadcasts.len(), 2);
    assert_eq!(names(&broadcasts[0]), vec!["Second"]);
    assert_eq!(names(&broadcasts[1]), vec!["Second"]);
}

/// A rejected optimistic remove puts the record back where it was.
#[tokio::test]
async fn test_optimistic_remove_rolls_back() {
    let mock = MockBackend::start().await;
    mock.set_fallback(MockResponse::records(&[(1, "Item1"), (2, "Item2"), (3, "Item3")]))
        .await;
    let service = mount_service(http_store(&mock.base_url()), ConsistencyMode::Optimistic).await;
    service.api.fetch_items().await.unwrap();
    let (broadcasts, _sub) = record_items(&service.api);

    mock.enqueue_response(MockResponse::error(500, "locked")).await;
    assert!(service.api.remove_item(2u64).await.is_err());

    let broadcasts = broadcasts.lock();
    let seen: Vec<Vec<String>> = broadcasts.iter().map(|b| names(b)).collect();
    assert_eq!(
        seen,
        vec![
            vec!["Item1", "Item3"],
            vec!["Item1", "Item2", "Item3"],
            vec!["Item1", "Item2", "Item3"],
        ]
    );
    let requests = mock.captured_requests().await;
    assert!(requests.iter().any(|r| r.method == "DELETE" && r.path == "/items/2"));
}

/// In either mode a failed refetch after a mutation publishes nothing more.
#[tokio::test]
async fn test_failed_refetch_publishes_nothing() {
    for mode in [ConsistencyMode::Refetch, ConsistencyMode::Optimistic] {
        let mock = MockBackend::start().await;
        let service = mount_service(http_store(&mock.base_url()), mode).await;
        let (broadcasts, _sub) = record_items(&service.api);

        mock.enqueue_response(MockResponse::json(r#"{"id": 7, "name": "Test"}"#))
            .await;
        mock.enqueue_response(MockResponse::error(500, "refetch failed")).await;
        service.api.add_item("Test").await.unwrap();

        let expected = match mode {
            ConsistencyMode::Refetch => 0,
            ConsistencyMode::Optimistic => 1,
        };
        assert_eq!(broadcasts.lock().len(), expected, "mode {}", mode);
        if mode == ConsistencyMode::Optimistic {
            let ids: Vec<RecordId> = service
                .api
                .snapshot(Entity::Items)
                .into_iter()
                .map(|r| r.id)
                .collect();
            assert_eq!(ids, vec![RecordId::Number(7)]);
        }
        assert!(service
            .api
            .errors()
            .contains_key(&mfe_container::service::Operation::FetchItems));
    }
}
