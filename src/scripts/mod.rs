//! Script upload pipeline and the visible script list

mod access;
mod hash;
mod key;
mod record;

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use crate::auth::User;
use crate::database::{children, TreeStore};
use crate::error::{Error, Result};

pub use access::*;
pub use hash::script_hash;
pub use key::generate_key;
pub use record::*;

/// Tree path holding the scripts of `uid`
pub fn scripts_path(uid: &str) -> String {
    format!("user_scripts/{}", uid)
}

/// The list shown to the user, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptList {
    records: Vec<ScriptRecord>,
}

impl ScriptList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a freshly uploaded record at the top
    pub fn prepend(&mut self, record: ScriptRecord) {
        self.records.insert(0, record);
    }

    /// Replace the contents, sorted by timestamp descending
    pub fn replace_sorted(&mut self, mut records: Vec<ScriptRecord>) {
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.records = records;
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn first(&self) -> Option<&ScriptRecord> {
        self.records.first()
    }

    pub fn find(&self, id: &str) -> Option<&ScriptRecord> {
        self.records.iter().find(|record| record.id.as_deref() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[ScriptRecord] {
        &self.records
    }
}

/// Holds the in-flight flag until dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlight(flag))
            .map_err(|_| Error::Busy)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Uploads and lists the scripts of one signed-in user
pub struct ScriptManager {
    user: RwLock<User>,
    tree: Arc<dyn TreeStore>,
    list: Mutex<ScriptList>,
    in_flight: AtomicBool,
    raw_access: RawAccessPolicy,
}

impl ScriptManager {
    pub fn new(user: User, tree: Arc<dyn TreeStore>, raw_access: RawAccessPolicy) -> Self {
        Self {
            user: RwLock::new(user),
            tree,
            list: Mutex::new(ScriptList::new()),
            in_flight: AtomicBool::new(false),
            raw_access,
        }
    }

    /// The user the manager acts for
    pub fn user(&self) -> User {
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Point the manager at an updated identity of the same user
    pub fn rebind(&self, user: User) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    /// Whether a submission is outstanding
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validate, derive and store a new script, then prepend it to the list
    pub async fn submit(&self, draft: ScriptDraft) -> Result<ScriptRecord> {
        let _guard = InFlight::acquire(&self.in_flight)?;

        let valid = draft.validate()?;
        let user = self.user();
        let record = ScriptRecord::derive(&valid, &user, chrono::Utc::now().timestamp_millis());
        let value = serde_json::to_value(&record)?;

        let key = self
            .tree
            .append(&scripts_path(&user.uid), &value)
            .await
            .map_err(|err| {
                error!("Failed to save script {}: {}", record.name, err);
                Error::from(err)
            })?;

        let record = record.with_id(key);
        self.list.lock().await.prepend(record.clone());
        info!("Script uploaded: {:?}", record.id);

        Ok(record)
    }

    /// Rebuild the list from the store
    pub async fn load_scripts(&self) -> Result<Vec<ScriptRecord>> {
        let uid = self.user().uid;
        let snapshot = self.tree.read(&scripts_path(&uid)).await?;

        let records = children(snapshot)
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<ScriptRecord>(value) {
                Ok(record) => Some(record.with_id(key)),
                Err(err) => {
                    warn!("Skipping malformed script {}: {}", key, err);
                    None
                }
            })
            .collect();

        let mut list = self.list.lock().await;
        list.replace_sorted(records);
        debug!("Loaded {} scripts for {}", list.len(), uid);
        Ok(list.as_slice().to_vec())
    }

    /// Snapshot of the visible list
    pub async fn scripts(&self) -> Vec<ScriptRecord> {
        self.list.lock().await.as_slice().to_vec()
    }

    /// Copy the content of script `id` to the clipboard if the policy allows
    pub async fn view_raw(&self, id: &str, secret: Option<&str>, clipboard: &dyn Clipboard) -> Result<RawView> {
        let record = self
            .list
            .lock()
            .await
            .find(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        self.raw_access.authorize(&self.user(), &record, secret)?;

        let copied = match clipboard.write_text(&record.content) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to copy script: {}", err);
                false
            }
        };

        Ok(RawView {
            content: record.content,
            copied,
        })
    }
}
