//! In-memory backends
//!
//! Implementations of the collaborator traits that keep everything in
//! process memory, for tests and for embedding without a backend project.

use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::auth::{AuthErrorCode, IdentityService, ProfileUpdate, User};
use crate::database::TreeStore;
use crate::documents::{Document, DocumentStore};
use crate::error::{AuthError, StoreError};
use crate::storage::{BlobRef, BlobStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Account {
    password: String,
    user: User,
}

/// Identity service backed by a map of accounts
pub struct MemoryIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<User>>,
    changes: broadcast::Sender<Option<User>>,
    calls: AtomicUsize,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            changes,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of service calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Force the session to `user` and notify subscribers
    pub fn set_current(&self, user: Option<User>) {
        *lock(&self.current) = user.clone();
        if self.changes.send(user).is_err() {
            debug!("No session change subscribers");
        }
    }

    fn sign_in(&self, user: User) -> User {
        self.set_current(Some(user.clone()));
        user
    }
}

#[async_trait]
impl IdentityService for MemoryIdentity {
    async fn create_account(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !email.contains('@') {
            return Err(AuthError::api(AuthErrorCode::InvalidEmail, "INVALID_EMAIL"));
        }
        if password.chars().count() < 6 {
            return Err(AuthError::api(AuthErrorCode::WeakPassword, "WEAK_PASSWORD"));
        }

        let user = {
            let mut accounts = lock(&self.accounts);
            if accounts.contains_key(email) {
                return Err(AuthError::api(AuthErrorCode::EmailAlreadyInUse, "EMAIL_EXISTS"));
            }
            let user = User::new(uuid::Uuid::new_v4().simple().to_string()).with_email(email);
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            user
        };

        Ok(self.sign_in(user))
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = {
            let accounts = lock(&self.accounts);
            let account = accounts
                .get(email)
                .ok_or_else(|| AuthError::api(AuthErrorCode::UserNotFound, "EMAIL_NOT_FOUND"))?;
            if account.password != password {
                return Err(AuthError::api(AuthErrorCode::WrongPassword, "INVALID_PASSWORD"));
            }
            account.user.clone()
        };

        Ok(self.sign_in(user))
    }

    async fn update_profile(&self, user: &User, update: ProfileUpdate) -> Result<User, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let updated = {
            let mut accounts = lock(&self.accounts);
            let account = accounts
                .values_mut()
                .find(|account| account.user.uid == user.uid)
                .ok_or(AuthError::MissingSession)?;
            update.apply_to(&mut account.user);
            account.user.clone()
        };

        if lock(&self.current).as_ref().map(|u| u.uid.as_str()) == Some(updated.uid.as_str()) {
            self.set_current(Some(updated.clone()));
        }
        Ok(updated)
    }

    fn current_user(&self) -> Option<User> {
        lock(&self.current).clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<Option<User>> {
        self.changes.subscribe()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.current).is_none() {
            return Err(AuthError::MissingSession);
        }
        self.set_current(None);
        Ok(())
    }
}

/// Document store backed by per-collection vectors
#[derive(Default)]
pub struct MemoryDocuments {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// All documents of a collection, in insertion order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        lock(&self.collections)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn insert(&self, collection: &str, document: &Value) -> Result<String, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !document.is_object() {
            return Err(StoreError::new("document must be a JSON object"));
        }
        let id = format!("doc{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields: document.clone(),
            });
        Ok(id)
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .documents(collection)
            .into_iter()
            .filter(|doc| doc.fields.get(field) == Some(value))
            .collect())
    }
}

/// Tree store backed by a single JSON object
pub struct MemoryTree {
    root: Mutex<Value>,
    next_key: AtomicUsize,
    fail_writes: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
            next_key: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following write and append fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Synchronous read, for assertions
    pub fn get(&self, path: &str) -> Option<Value> {
        let root = lock(&self.root);
        let mut node = &*root;
        for segment in segments(path) {
            node = node.get(segment)?;
        }
        Some(node.clone())
    }

    fn set(&self, path: &str, value: Value) {
        let mut root = lock(&self.root);
        let mut node = &mut *root;
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            *node = value;
            return;
        };

        for segment in parents {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = match node {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                _ => return,
            };
        }
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            if value.is_null() {
                map.remove(*last);
            } else {
                map.insert(last.to_string(), value);
            }
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::ApiError {
                status: 503,
                message: "write rejected".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TreeStore for MemoryTree {
    async fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.set(path, value.clone());
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(path).filter(|value| !value.is_null()))
    }

    async fn append(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        let key = format!("-M{:018}", self.next_key.fetch_add(1, Ordering::SeqCst) + 1);
        self.set(&format!("{}/{}", path, key), value.clone());
        Ok(key)
    }

    async fn query_eq(
        &self,
        path: &str,
        order_by: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(crate::database::children(self.get(path))
            .into_iter()
            .filter(|(_, child)| child.get(order_by) == Some(value))
            .collect())
    }
}

/// Blob store backed by a map of paths
#[derive(Default)]
pub struct MemoryBlobs {
    blobs: Mutex<HashMap<String, (Vec<u8>, String)>>,
    calls: AtomicUsize,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Stored bytes and content type at `path`
    pub fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        lock(&self.blobs).get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<BlobRef, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.blobs).insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(BlobRef::new(path))
    }

    async fn download_url(&self, blob: &BlobRef) -> Result<String, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !lock(&self.blobs).contains_key(&blob.path) {
            return Err(StoreError::ApiError {
                status: 404,
                message: format!("{} not found", blob.path),
            });
        }
        Ok(format!("memory://{}", blob.path))
    }
}
