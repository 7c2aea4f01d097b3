//! Shared service facade over a real HTTP store.

mod common;

use common::mock_backend::{MockBackend, MockResponse};
use common::{http_store, mount_service, names, seeded_database, start_store};
use mfe_container::bus::{ActivityStats, DataChange, DataChangeBus, NotificationSummary};
use mfe_container::mount::{Anchor, MountArgs, MountError, MountedInstance, Mountable};
use mfe_container::service::{
    ConsistencyMode, Entity, Operation, Readiness, RecordId, ServiceError, ServiceMicrofrontend,
    ServiceSettings, StoreError,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Add then remove, observing every broadcast.
#[tokio::test]
async fn test_add_and_remove_broadcast_authoritative_lists() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;
    let api = &service.api;

    let broadcasts = Arc::new(Mutex::new(Vec::new()));
    let b = broadcasts.clone();
    let _sub = api.on_records(Entity::Items, move |records| b.lock().push(names(records)));

    assert_eq!(names(&api.fetch_items().await.unwrap()), vec!["Item1"]);

    let created = api.add_item("Test").await.unwrap();
    assert_eq!(created.name, "Test");
    assert_eq!(created.id, RecordId::Number(2));
    assert_eq!(*broadcasts.lock(), vec![vec!["Item1".to_string(), "Test".to_string()]]);

    api.remove_item(1u64).await.unwrap();
    assert_eq!(broadcasts.lock().last().unwrap(), &vec!["Test".to_string()]);
    assert_eq!(names(&store.records(Entity::Items)), vec!["Test"]);
}

/// The user endpoints mirror the item endpoints.
#[tokio::test]
async fn test_user_operations() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;
    let api = &service.api;

    let bob = api.add_user("Bob").await.unwrap();
    assert_eq!(names(&api.fetch_users().await.unwrap()), vec!["Alice", "Bob"]);

    api.remove_user(bob.id.clone()).await.unwrap();
    assert_eq!(names(&api.fetch_users().await.unwrap()), vec!["Alice"]);
    assert_eq!(names(&api.filter_users("ali").await.unwrap()), vec!["Alice"]);
}

/// Ids with path syntax stay inside their own collection.
#[tokio::test]
async fn test_remove_id_cannot_reach_other_entity() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;
    let api = &service.api;

    let result = api.remove_item("../users/1").await;
    assert!(matches!(
        result,
        Err(ServiceError::OperationFailure {
            source: StoreError::Status { status: 404, .. },
            ..
        })
    ));
    let result = api.remove_user("1/../../items/1").await;
    assert!(result.is_err());
    assert!(api.remove_item("..").await.is_err());

    assert_eq!(names(&store.records(Entity::Users)), vec!["Alice"]);
    assert_eq!(names(&store.records(Entity::Items)), vec!["Item1"]);
    let deletes: Vec<String> = store
        .requests()
        .into_iter()
        .filter(|r| r.method == "DELETE")
        .map(|r| r.path)
        .collect();
    assert_eq!(deletes, vec!["/items/..%2Fusers%2F1", "/users/1%2F..%2F..%2Fitems%2F1"]);
}

/// A blank filter answers from the snapshot without a request.
#[tokio::test]
async fn test_blank_filter_makes_no_request() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;

    service.api.fetch_items().await.unwrap();
    store.clear_requests();

    let all = service.api.filter_items("   ").await.unwrap();
    assert_eq!(names(&all), vec!["Item1"]);
    assert_eq!(store.request_count(), 0);

    let matched = service.api.filter_items("item").await.unwrap();
    assert_eq!(names(&matched), vec!["Item1"]);
    let requests = store.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/items");
    assert_eq!(requests[0].query.as_deref(), Some("q=item"));
}

/// Invalid arguments are rejected before any request.
#[tokio::test]
async fn test_invalid_arguments_rejected_locally() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;
    store.clear_requests();

    assert!(matches!(
        service.api.remove_item("").await,
        Err(ServiceError::InvalidArgument(_))
    ));
    assert!(matches!(
        service.api.add_user("  ").await,
        Err(ServiceError::InvalidArgument(_))
    ));
    assert_eq!(store.request_count(), 0);
}

/// Every operation brackets itself with loading on/off events.
#[tokio::test]
async fn test_loading_bracket() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;
    let api = &service.api;

    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    let _sub = api.on_loading_change(Entity::Items, move |loading, op| e.lock().push((loading, op)));

    api.fetch_items().await.unwrap();
    assert_eq!(
        *events.lock(),
        vec![(true, Operation::FetchItems), (false, Operation::FetchItems)]
    );

    events.lock().clear();
    api.add_item("Test").await.unwrap();
    assert_eq!(
        *events.lock(),
        vec![
            (true, Operation::AddItem),
            (false, Operation::AddItem),
            (true, Operation::FetchItems),
            (false, Operation::FetchItems),
        ]
    );
    assert!(api.loaders().values().all(|loading| !loading));
    assert!(api.errors().is_empty());
}

/// Store failures surface as operation failures and land in the error map,
/// and a later success clears them.
#[tokio::test]
async fn test_failures_are_aggregated() {
    let mock = MockBackend::start().await;
    let service = mount_service(http_store(&mock.base_url()), ConsistencyMode::Refetch).await;
    let api = &service.api;

    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    let _sub = api.on_loading_change(Entity::Items, move |loading, op| e.lock().push((loading, op)));

    mock.enqueue_response(MockResponse::error(500, "boom")).await;
    let err = api.fetch_items().await.unwrap_err();
    match &err {
        ServiceError::OperationFailure { operation, source } => {
            assert_eq!(*operation, Operation::FetchItems);
            assert_eq!(source.status(), Some(500));
        }
        other => panic!("Expected OperationFailure, got {:?}", other),
    }
    assert_eq!(
        *events.lock(),
        vec![(true, Operation::FetchItems), (false, Operation::FetchItems)]
    );
    assert!(api.errors()[&Operation::FetchItems].contains("500"));
    assert!(!api.operation_state(Operation::FetchItems).loading);

    mock.enqueue_response(MockResponse::records(&[(1, "Item1")])).await;
    api.fetch_items().await.unwrap();
    assert!(api.errors().get(&Operation::FetchItems).is_none());
}

/// A failed create still refetches, and nothing reports the phantom record.
#[tokio::test]
async fn test_failed_add_reports_error_and_refetches() {
    let mock = MockBackend::start().await;
    mock.set_fallback(MockResponse::records(&[(1, "Item1")])).await;
    let service = mount_service(http_store(&mock.base_url()), ConsistencyMode::Refetch).await;
    let api = &service.api;

    let broadcasts = Arc::new(Mutex::new(Vec::new()));
    let b = broadcasts.clone();
    let _sub = api.on_records(Entity::Items, move |records| b.lock().push(names(records)));

    mock.enqueue_response(MockResponse::error(503, "unavailable")).await;
    let err = api.add_item("Ghost").await.unwrap_err();
    assert_eq!(err.operation(), Some(Operation::AddItem));
    assert!(api.errors().contains_key(&Operation::AddItem));
    assert_eq!(*broadcasts.lock(), vec![vec!["Item1".to_string()]]);

    let requests = mock.captured_requests().await;
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].body_json()["name"], "Ghost");
    assert_eq!(requests[1].method, "GET");
}

/// Malformed store payloads are decode errors, not panics.
#[tokio::test]
async fn test_malformed_payload() {
    let mock = MockBackend::start().await;
    mock.set_fallback(MockResponse::json(r#"{"not":"a list"}"#)).await;
    let service = mount_service(http_store(&mock.base_url()), ConsistencyMode::Refetch).await;

    match service.api.fetch_items().await {
        Err(ServiceError::OperationFailure {
            source: StoreError::Decode { .. },
            ..
        }) => {}
        other => panic!("Expected decode failure, got {:?}", other),
    }
}

/// After unmount every operation fails and the facade can be mounted again.
#[tokio::test]
async fn test_unmount_ends_the_api() {
    let store = start_store(seeded_database()).await;
    let mut service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;
    let api = service.api.clone();

    service.instance.unmount();
    assert_eq!(api.readiness(), Readiness::Unmounted);
    assert!(matches!(api.fetch_items().await, Err(ServiceError::Unmounted)));
    assert!(matches!(api.ready().await, Err(ServiceError::Unmounted)));
    assert!(service.facade.current().is_none());
    assert!(service.anchor.content().is_empty());

    let again = service
        .facade
        .mount(MountArgs::new(Anchor::new("service_mfe_2")))
        .unwrap();
    let fresh = service.facade.current().unwrap();
    assert!(!fresh.ptr_eq(&api));
    fresh.ready().await.unwrap();
    assert_eq!(names(&fresh.fetch_items().await.unwrap()), vec!["Item1"]);
    drop(again);
}

/// Only one facade instance may be live at a time.
#[tokio::test]
async fn test_second_mount_rejected() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;

    let result = service.facade.mount(MountArgs::new(Anchor::new("elsewhere")));
    assert!(matches!(result, Err(MountError::AlreadyMounted { .. })));
    assert!(service.facade.current().unwrap().ptr_eq(&service.api));
}

/// The API is published before it is ready, and readiness is observable.
#[tokio::test]
async fn test_api_resolves_asynchronously() {
    let store = start_store(seeded_database()).await;
    let facade = ServiceMicrofrontend::new(
        http_store(&store.base_url()),
        DataChangeBus::new(),
        ServiceSettings::default(),
    );
    let mut api_rx = facade.subscribe_api();
    assert!(api_rx.borrow_and_update().is_none());

    let _instance = facade.mount(MountArgs::new(Anchor::new("service_mfe"))).unwrap();
    let api = facade.current().unwrap();
    assert_eq!(api.readiness(), Readiness::Pending);
    assert!(matches!(api.fetch_items().await, Err(ServiceError::NotReady)));

    api.ready().await.unwrap();
    assert!(api.is_ready());
    assert!(api_rx.has_changed().unwrap());
}

/// Aggregated statistics travel on the notifications category.
#[tokio::test]
async fn test_notify_data_change() {
    let store = start_store(seeded_database()).await;
    let service = mount_service(http_store(&store.base_url()), ConsistencyMode::Refetch).await;

    let received = Arc::new(Mutex::new(None));
    let r = received.clone();
    let _sub = service.api.on_notifications(move |summary| *r.lock() = Some(summary.clone()));

    let summary = NotificationSummary {
        stats: ActivityStats {
            total_users: 1,
            total_items: 1,
            recent_activity: 0,
        },
        last_activity: None,
        total_activity: 1,
    };
    let delivered = service
        .api
        .notify_data_change(DataChange::Notifications(summary.clone()))
        .unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(received.lock().clone(), Some(summary));
}
