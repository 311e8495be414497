//! Integration tests for language discovery, loading, sharing and saving.
//!
//! These tests drive the public API end to end: a `LanguageManager` scans a
//! root on disk or behind a mock HTTP server, bindings load stores, and
//! stores write edits back to disk.

use language_store::{
    Config, LanguageLoader, LanguageManager, LoadParams, LoadState, Location, RequestRegistry,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

// ==================== Test Helpers ====================

/// Write a language directory: header listing `data_files`, plus `files`.
fn write_language(root: &Path, id: &str, data_files: &[&str], files: &[(&str, &str)]) {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).expect("create language dir");

    let header = serde_json::json!({
        "name": id.to_uppercase(),
        "author": "integration",
        "dataFiles": data_files,
    });
    std::fs::write(dir.join("header.json"), header.to_string()).expect("write header");

    for (name, content) in files {
        std::fs::write(dir.join(name), content).expect("write data file");
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(path).expect("read file");
    serde_json::from_str(&content).expect("valid json")
}

async fn disk_manager(root: &Path) -> Arc<LanguageManager> {
    let config = Config::new(root.to_path_buf());
    let manager = Arc::new(LanguageManager::new(config).expect("manager"));
    manager.reload().await.expect("scan");
    manager
}

async fn mount_text(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// ==================== Edit and Save Workflow ====================

#[tokio::test]
async fn test_edit_and_save_round_trip_through_registry() {
    let root = TempDir::new().expect("temp dir");
    write_language(
        root.path(),
        "en",
        &["a.json", "b.json"],
        &[
            ("a.json", r#"{"text":{"greeting":"hi"}}"#),
            ("b.json", r#"{"text":{"greeting":"hello","farewell":"bye"}}"#),
        ],
    );

    let registry = RequestRegistry::new();
    registry.set_active_manager(Some(disk_manager(root.path()).await));

    let mut request = registry.create_request("en");
    let store = request.settled().await.store().cloned().expect("loaded");
    assert_eq!(store.text("greeting").as_deref(), Some("hello"));
    assert_eq!(store.text("farewell").as_deref(), Some("bye"));

    store.set_text("greeting", "hey");
    store.set_text("new.key", "fresh");
    store.save().await.expect("save");

    let dir = root.path().join("en");
    assert!(read_json(&dir.join("a.json")).pointer("/text/greeting").is_none());
    assert_eq!(read_json(&dir.join("b.json"))["text"]["greeting"], "hey");
    assert_eq!(read_json(&dir.join("b.json"))["text"]["farewell"], "bye");
    assert_eq!(read_json(&dir.join("default.json"))["text"]["new.key"], "fresh");

    request.dispose();

    // a fresh scan sees exactly what was saved
    let registry = RequestRegistry::new();
    registry.set_active_manager(Some(disk_manager(root.path()).await));
    let mut request = registry.create_request("en");
    let reloaded = request.settled().await.store().cloned().expect("reloaded");

    assert_eq!(reloaded.text("greeting").as_deref(), Some("hey"));
    assert_eq!(reloaded.text("new.key").as_deref(), Some("fresh"));
    assert_eq!(reloaded.texts().len(), 3);
    request.dispose();
}

#[tokio::test]
async fn test_one_broken_language_does_not_block_others() {
    let root = TempDir::new().expect("temp dir");
    write_language(
        root.path(),
        "en",
        &["ui.json"],
        &[("ui.json", r#"{"text":{"ok":"OK"}}"#)],
    );
    write_language(
        root.path(),
        "de",
        &["ui.json"],
        &[("ui.json", r#"{"text":{"ok":false}}"#)],
    );
    write_language(root.path(), "xx", &[], &[]);
    std::fs::write(root.path().join("xx/header.json"), "not json").expect("corrupt header");

    let manager = disk_manager(root.path()).await;
    let catalog = manager.headers().expect("catalog");
    assert!(catalog.contains("en"));
    assert!(catalog.contains("de"));
    assert!(!catalog.contains("xx"));

    let registry = RequestRegistry::new();
    registry.set_active_manager(Some(manager));
    let mut en = registry.create_request("en");
    let mut de = registry.create_request("de");
    let mut xx = registry.create_request("xx");

    assert!(en.settled().await.store().is_some());
    assert!(matches!(de.settled().await, LoadState::Failed(_)));
    assert!(matches!(xx.settled().await, LoadState::Idle));

    en.dispose();
    de.dispose();
    xx.dispose();
    assert_eq!(registry.leaked_requests(), 0);
}

// ==================== Remote Languages ====================

#[tokio::test]
async fn test_stale_load_never_overwrites_newer_request() {
    let server = MockServer::start().await;
    mount_text(&server, "/lang/languages.txt", "de\nfr\n").await;
    mount_text(&server, "/lang/de/header.json", r#"{"name":"Deutsch","dataFiles":["ui.json"]}"#).await;
    mount_text(&server, "/lang/fr/header.json", r#"{"name":"Français","dataFiles":["ui.json"]}"#).await;
    mount_text(&server, "/lang/fr/ui.json", r#"{"text":{"hello":"bonjour"}}"#).await;
    Mock::given(method("GET"))
        .and(path("/lang/de/ui.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"text":{"hello":"hallo"}}"#)
                .set_delay(Duration::from_millis(600)),
        )
        .mount(&server)
        .await;

    let config = Config::new(Location::parse(&format!("{}/lang", server.uri())));
    let manager = Arc::new(LanguageManager::new(config).expect("manager"));
    manager.reload().await.expect("scan");

    let loader = LanguageLoader::new();
    loader.set_params(LoadParams::new(manager.clone(), "de"));
    assert!(loader.state().is_loading());

    let mut changes = loader.subscribe();
    loader.set_params(LoadParams::new(manager, "fr"));

    let store = loader.settled().await.store().cloned().expect("fr loaded");
    assert_eq!(store.text("hello").as_deref(), Some("bonjour"));

    // give the slow German load time to finish and be discarded
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let current = loader.store().expect("still loaded");
    assert!(Arc::ptr_eq(&current, &store));
    while let Ok(change) = changes.try_recv() {
        if let LoadState::Loaded(store) = change.new {
            assert_eq!(store.text("hello").as_deref(), Some("bonjour"));
        }
    }
}

#[tokio::test]
async fn test_shared_request_loads_once() {
    let server = MockServer::start().await;
    mount_text(&server, "/lang/languages.txt", "en\n").await;
    mount_text(&server, "/lang/en/header.json", r#"{"name":"English","dataFiles":["ui.json"]}"#).await;
    Mock::given(method("GET"))
        .and(path("/lang/en/ui.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"text":{"play":"Play"}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = Config::new(Location::parse(&format!("{}/lang", server.uri())));
    let manager = Arc::new(LanguageManager::new(config).expect("manager"));
    manager.reload().await.expect("scan");

    let registry = RequestRegistry::new();
    registry.set_active_manager(Some(manager));

    let mut first = registry.create_request("en");
    let mut second = registry.create_request("en");

    let a = first.settled().await.store().cloned().expect("loaded");
    let b = second.settled().await.store().cloned().expect("loaded");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.localize("play"), "Play");

    first.dispose();
    assert_eq!(registry.active_requests("en"), 1);
    assert!(second.store().is_some());

    second.dispose();
    assert_eq!(registry.active_requests("en"), 0);
}

#[tokio::test]
async fn test_remote_store_cannot_be_saved() {
    let server = MockServer::start().await;
    mount_text(&server, "/lang/languages.txt", "en\n").await;
    mount_text(&server, "/lang/en/header.json", r#"{"name":"English","dataFiles":[]}"#).await;

    let config = Config::new(Location::parse(&format!("{}/lang", server.uri())));
    let manager = Arc::new(LanguageManager::new(config).expect("manager"));
    manager.reload().await.expect("scan");

    let loader = LanguageLoader::new();
    loader.set_params(LoadParams::new(manager, "en"));
    let store = loader.settled().await.store().cloned().expect("loaded");

    store.set_text("k", "v");
    assert!(store.save().await.is_err());
    assert!(store.is_dirty());
}
