//! End-to-end: the container mounts every fragment against a dev store and
//! keeps them in sync through the shared facade.

mod common;

use common::{seeded_database, start_store, start_store_with, wait_until};
use mfe_container::config::{Config, RemoteConfig};
use mfe_container::devstore::DevStoreOptions;
use mfe_container::fragments::{FILTER_MODULE, ITEMS_MODULE, NOTIFICATIONS_MODULE, USERS_MODULE};
use mfe_container::lifecycle::MfeStatus;
use mfe_container::repl::{self, ReplCommand};
use mfe_container::service::{Entity, SERVICE_MODULE};
use mfe_container::Container;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn config_for(base_url: String) -> Config {
    let mut config = Config::default();
    config.store.base_url = base_url;
    config.mount.retry_delay_ms = 20;
    config.mount.ready_timeout_seconds = 5;
    config
}

fn shows(container: &Container, module: &str, needle: &str) -> bool {
    container
        .anchor(module)
        .map(|a| a.content().iter().any(|line| line.contains(needle)))
        .unwrap_or(false)
}

/// Mount everything, add an item, filter, then shut down.
#[tokio::test]
async fn test_full_scenario() {
    let store = start_store(seeded_database()).await;
    let container = Container::connect(config_for(store.base_url())).await.unwrap();
    container.wait_mounted().await.unwrap();

    assert!(container.status().iter().all(|e| e.status == MfeStatus::Ready));
    assert!(wait_until(WAIT, || shows(&container, ITEMS_MODULE, "Item1")).await);
    assert!(wait_until(WAIT, || shows(&container, USERS_MODULE, "Alice")).await);
    assert!(wait_until(WAIT, || shows(&container, NOTIFICATIONS_MODULE, "initialized")).await);

    let api = container.service().await.unwrap();
    api.add_item("Test").await.unwrap();

    assert!(wait_until(WAIT, || shows(&container, ITEMS_MODULE, "Items (2)")).await);
    assert!(wait_until(WAIT, || shows(&container, FILTER_MODULE, "Filter: (none)  2 of 2")).await);
    assert!(wait_until(WAIT, || shows(&container, NOTIFICATIONS_MODULE, "Item added")).await);
    // The items panel also shows the broadcast summary
    assert!(wait_until(WAIT, || shows(&container, ITEMS_MODULE, "[activity: 2 items")).await);

    container.set_filter("test").await.unwrap();
    assert!(wait_until(WAIT, || shows(&container, FILTER_MODULE, "Filter: \"test\"  1 of 2")).await);
    assert_eq!(container.controller(FILTER_MODULE).unwrap().status().mounts, 1);
    assert!(store
        .requests()
        .iter()
        .any(|r| r.path == "/items" && r.query.as_deref() == Some("q=test")));

    let rendered = container.render().join("\n");
    assert!(rendered.contains("== Items =="));
    assert!(rendered.contains("Test"));

    container.shutdown().await;
    container.shutdown().await;
    assert!(container.bus().is_disposed());
    for module in [SERVICE_MODULE, ITEMS_MODULE, FILTER_MODULE, USERS_MODULE, NOTIFICATIONS_MODULE] {
        assert!(container.anchor(module).unwrap().content().is_empty(), "{} still rendered", module);
    }
}

/// REPL commands run against the live container.
#[tokio::test]
async fn test_repl_commands() {
    let store = start_store(seeded_database()).await;
    let container = Container::connect(config_for(store.base_url())).await.unwrap();
    container.wait_mounted().await.unwrap();

    let lines = repl::execute(&container, &ReplCommand::List(Entity::Users)).await.unwrap();
    assert!(lines.iter().any(|l| l.contains("Alice")));

    let lines = repl::execute(&container, &ReplCommand::Add(Entity::Users, "Bob".to_string()))
        .await
        .unwrap();
    assert!(lines[0].starts_with("added user"));
    assert!(wait_until(WAIT, || shows(&container, USERS_MODULE, "Bob")).await);

    let lines = repl::execute(&container, &ReplCommand::Remove(Entity::Items, "1".to_string()))
        .await
        .unwrap();
    assert_eq!(lines, vec!["removed item 1".to_string()]);
    assert!(store.records(Entity::Items).is_empty());

    let err = repl::execute(&container, &ReplCommand::Remove(Entity::Items, "1".to_string())).await;
    assert!(err.is_err());

    let status = repl::execute(&container, &ReplCommand::Status).await.unwrap();
    assert_eq!(status.len(), 5);
    assert!(status.iter().all(|l| l.contains("ready")));

    container.shutdown().await;
}

/// Modules configured with a remote entry resolve it before mounting.
#[tokio::test]
async fn test_remote_entry_modules() {
    let store = start_store_with(
        seeded_database(),
        DevStoreOptions {
            remotes: vec!["mfe_1".to_string()],
            ..DevStoreOptions::default()
        },
    )
    .await;
    let mut config = config_for(store.base_url());
    config.mount.ready_timeout_seconds = 1;
    config.remotes.push(RemoteConfig {
        name: ITEMS_MODULE.to_string(),
        entry_url: Some(format!("{}/remotes/mfe_1/remoteEntry.json", store.base_url())),
        max_retries: None,
        retry_delay_ms: None,
        update_props_on_change: None,
    });
    config.remotes.push(RemoteConfig {
        name: USERS_MODULE.to_string(),
        entry_url: Some(format!("{}/remotes/users_mfe/remoteEntry.json", store.base_url())),
        max_retries: Some(1),
        retry_delay_ms: Some(10),
        update_props_on_change: None,
    });

    let container = Container::connect(config).await.unwrap();

    let users = container.controller(USERS_MODULE).unwrap();
    let status = tokio::time::timeout(WAIT, users.wait_for(|s| s.failed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.total_attempts, 2);
    assert!(status.last_error.unwrap().contains("404"));

    let items = container.controller(ITEMS_MODULE).unwrap();
    tokio::time::timeout(WAIT, items.wait_for(|s| s.is_mounted()))
        .await
        .unwrap()
        .unwrap();
    assert!(store
        .requests()
        .iter()
        .any(|r| r.path == "/remotes/mfe_1/remoteEntry.json"));

    let entries = container.status();
    let users_entry = entries.iter().find(|e| e.module == USERS_MODULE).unwrap();
    assert_eq!(users_entry.status, MfeStatus::Error);
    assert!(container.wait_mounted().await.is_err());

    container.shutdown().await;
}

/// With the store down every fragment still mounts and shows the error.
#[tokio::test]
async fn test_store_unreachable() {
    let port = common::free_port();
    let container = Container::connect(config_for(format!("http://127.0.0.1:{}", port)))
        .await
        .unwrap();
    container.wait_mounted().await.unwrap();

    assert!(wait_until(WAIT, || shows(&container, ITEMS_MODULE, "error:")).await);
    let api = container.service().await.unwrap();
    assert!(wait_until(WAIT, || api.errors().contains_key(&mfe_container::service::Operation::FetchItems)).await);

    container.shutdown().await;
}

/// A fragment controller torn down early does not stop the others from
/// receiving the service.
#[tokio::test]
async fn test_torn_down_fragment_skipped() {
    let store = start_store(seeded_database()).await;
    let container = Container::connect(config_for(store.base_url())).await.unwrap();

    let items = container.controller(ITEMS_MODULE).unwrap();
    items.teardown().await;
    assert!(items.is_closed());

    for module in [FILTER_MODULE, USERS_MODULE, NOTIFICATIONS_MODULE] {
        let controller = container.controller(module).unwrap();
        tokio::time::timeout(WAIT, controller.wait_for(|s| s.is_mounted()))
            .await
            .unwrap()
            .unwrap();
    }
    assert!(wait_until(WAIT, || shows(&container, USERS_MODULE, "Alice")).await);

    container.shutdown().await;
}

/// Props for an unknown module are rejected.
#[tokio::test]
async fn test_set_props_unknown_module() {
    let store = start_store(seeded_database()).await;
    let container = Container::connect(config_for(store.base_url())).await.unwrap();

    let result = container
        .set_props("nope/mount", serde_json::json!({}))
        .await;
    assert!(matches!(
        result,
        Err(mfe_container::ContainerError::UnknownModule(_))
    ));

    container.shutdown().await;
}
