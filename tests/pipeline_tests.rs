use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use scriptvault::auth::User;
use scriptvault::database::TreeStore;
use scriptvault::error::{Error, StoreError};
use scriptvault::memory::MemoryTree;
use scriptvault::scripts::{script_hash, RawAccessPolicy, ScriptDraft, ScriptManager, ScriptRecord};
use scriptvault::session::{ProfileDisplay, View};
use scriptvault::Backends;

/// Tree store that parks every append until released
#[derive(Default)]
struct GatedTree {
    inner: MemoryTree,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl TreeStore for GatedTree {
    async fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.inner.write(path, value).await
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.inner.read(path).await
    }

    async fn append(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.append(path, value).await
    }

    async fn query_eq(&self, path: &str, order_by: &str, value: &Value) -> Result<Vec<(String, Value)>, StoreError> {
        self.inner.query_eq(path, order_by, value).await
    }
}

#[tokio::test]
async fn test_second_submit_while_in_flight_is_busy() {
    let tree = Arc::new(GatedTree::default());
    let manager = Arc::new(ScriptManager::new(User::new("u1"), tree.clone(), RawAccessPolicy::default()));

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.submit(ScriptDraft::new("first", "echo 1", "bash")).await }
    });
    tree.entered.notified().await;
    assert!(manager.is_submitting());

    let err = manager
        .submit(ScriptDraft::new("second", "echo 2", "bash"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Busy));

    tree.release.notify_one();
    let first = pending.await.unwrap().unwrap();
    assert_eq!(first.name, "first");
    assert!(!manager.is_submitting());

    // the guard was released, so the next submission goes through
    tree.release.notify_one();
    let second = manager
        .submit(ScriptDraft::new("second", "echo 2", "bash"))
        .await
        .unwrap();
    assert_eq!(manager.scripts().await[0], second);
}

#[tokio::test]
async fn test_submit_hello_world_record() {
    let tree = Arc::new(MemoryTree::new());
    let manager = ScriptManager::new(User::new("u1"), tree.clone(), RawAccessPolicy::default());

    let record = manager
        .submit(ScriptDraft::new("test", "hello world", "python"))
        .await
        .unwrap();

    assert_eq!(record.size, 11);
    assert_eq!(record.metadata.content_words, 2);
    assert_eq!(record.metadata.content_lines, 1);
    assert_eq!(record.hash, script_hash("hello world"));
    assert!(!record.hash.is_empty());
    assert!(record.hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(record.username, "Unknown User");
    assert_eq!(manager.scripts().await.first(), Some(&record));

    let stored = tree
        .get(&format!("user_scripts/u1/{}", record.id.as_deref().unwrap()))
        .unwrap();
    let decoded: ScriptRecord = serde_json::from_value(stored).unwrap();
    assert_eq!(decoded.with_id(record.id.clone().unwrap()), record);
}

#[tokio::test]
async fn test_reload_returns_strictly_descending_timestamps() {
    let tree = Arc::new(MemoryTree::new());
    let manager = ScriptManager::new(User::new("u1"), tree.clone(), RawAccessPolicy::default());

    for name in ["one", "two", "three"] {
        manager
            .submit(ScriptDraft::new(name, "echo", "bash"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let fresh = ScriptManager::new(User::new("u1"), tree, RawAccessPolicy::default());
    let scripts = fresh.load_scripts().await.unwrap();
    let names: Vec<&str> = scripts.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["three", "two", "one"]);
    assert!(scripts.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
}

#[tokio::test]
async fn test_scripts_are_isolated_per_user() {
    let tree = Arc::new(MemoryTree::new());
    let alice = ScriptManager::new(User::new("u1"), tree.clone(), RawAccessPolicy::default());
    let bob = ScriptManager::new(User::new("u2"), tree, RawAccessPolicy::default());

    alice
        .submit(ScriptDraft::new("mine", "echo", "bash"))
        .await
        .unwrap();

    assert!(bob.load_scripts().await.unwrap().is_empty());
    assert_eq!(alice.load_scripts().await.unwrap().len(), 1);
}

#[derive(Default)]
struct SilentView;

impl View for SilentView {
    fn show_auth_forms(&self) {}
    fn show_main_app(&self, _profile: &ProfileDisplay) {}
    fn render_scripts(&self, _scripts: &[ScriptRecord]) {}
    fn clear_scripts(&self) {}
    fn show_error(&self, _message: &str) {}
    fn show_notice(&self, _message: &str) {}
}

#[tokio::test]
async fn test_registered_user_drives_controller() {
    let backends = Backends::in_memory();
    backends
        .accounts()
        .register("alice", "alice@example.com", "secret1")
        .await
        .unwrap();

    let controller = backends.session_controller(Arc::new(SilentView), RawAccessPolicy::default());
    let driven = tokio::time::timeout(Duration::from_millis(50), backends.drive(&controller)).await;
    assert!(driven.is_err());

    let user = controller.current_user().await.unwrap();
    assert_eq!(user.display_name.as_deref(), Some("alice"));

    let record = controller
        .submit_script(ScriptDraft::new("hello", "print('hi')", "python"))
        .await
        .unwrap();
    assert_eq!(record.username, "alice");
}
