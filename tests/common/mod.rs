//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_backend;

use mfe_container::devstore::{Database, DevStore, DevStoreOptions};
use mfe_container::mount::{Anchor, MountArgs, MountedInstance, Mountable};
use mfe_container::service::{
    BackingStore, ConsistencyMode, HttpStore, Record, ServiceApi, ServiceMicrofrontend,
    ServiceSettings, StoreTimeouts,
};
use mfe_container::bus::DataChangeBus;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Find an available port for testing.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to free port");
    listener.local_addr().unwrap().port()
}

/// Write `content` to a `config.toml` inside a fresh temp dir.
pub fn temp_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    (temp_dir, config_path)
}

/// `{ items: [Item1], users: [Alice] }`
pub fn seeded_database() -> Database {
    Database::default()
        .with_items(vec![Record::new(1u64, "Item1")])
        .with_users(vec![Record::new(1u64, "Alice")])
}

/// Start a dev store on an ephemeral port.
pub async fn start_store(db: Database) -> DevStore {
    start_store_with(db, DevStoreOptions::default()).await
}

pub async fn start_store_with(db: Database, options: DevStoreOptions) -> DevStore {
    DevStore::start("127.0.0.1:0", db, options)
        .await
        .expect("Failed to start dev store")
}

pub fn http_store(base_url: &str) -> Arc<dyn BackingStore> {
    let timeouts = StoreTimeouts {
        request: Duration::from_secs(5),
        connect: Duration::from_secs(2),
    };
    Arc::new(HttpStore::new(base_url, timeouts).expect("Failed to build store client"))
}

/// A mounted service facade and its ready API.
pub struct MountedService {
    pub facade: ServiceMicrofrontend,
    pub instance: Box<dyn MountedInstance>,
    pub api: ServiceApi,
    pub anchor: Anchor,
}

/// Mount the facade over `store` and wait until its API is ready.
pub async fn mount_service(
    store: Arc<dyn BackingStore>,
    consistency: ConsistencyMode,
) -> MountedService {
    let facade = ServiceMicrofrontend::new(store, DataChangeBus::new(), ServiceSettings { consistency });
    let anchor = Anchor::new("service_mfe");
    let instance = facade
        .mount(MountArgs::new(anchor.clone()))
        .expect("Facade mount failed");
    let api = facade.current().expect("Facade published no API");
    api.ready().await.expect("Facade never became ready");
    MountedService {
        facade,
        instance,
        api,
        anchor,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Record names in order.
pub fn names(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.name.clone()).collect()
}
