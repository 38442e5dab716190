//! Session-driven presentation
//!
//! [`SessionController`] follows the identity service's change stream. A
//! signed-in user gets a [`SessionContext`] owning the script pipeline; the
//! context is dropped again on sign-out.

use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;

use crate::auth::User;
use crate::database::TreeStore;
use crate::error::{Error, Result};
use crate::scripts::{generate_key, Clipboard, RawAccessPolicy, RawView, ScriptDraft, ScriptManager, ScriptRecord};

/// Shown when the list cannot be loaded
pub const LOAD_FAILED: &str = "Failed to load scripts. Please try again.";

/// Presentation surface implemented by the embedding application
pub trait View: Send + Sync {
    fn show_auth_forms(&self);
    fn show_main_app(&self, profile: &ProfileDisplay);
    fn render_scripts(&self, scripts: &[ScriptRecord]);
    fn clear_scripts(&self);
    fn show_error(&self, message: &str);
    fn show_notice(&self, message: &str);

    /// Success sound cue
    fn play_success(&self) {}
}

/// Avatar used when the identity has no photo
pub fn placeholder_avatar_url(display_name: Option<&str>) -> String {
    let name = display_name.filter(|name| !name.is_empty()).unwrap_or("User");
    format!(
        "https://ui-avatars.com/api/?name={}&background=6A11CB&color=fff",
        urlencoding::encode(name)
    )
}

/// Name and avatar shown in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDisplay {
    pub username: String,
    pub avatar_url: String,
}

impl ProfileDisplay {
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.display_name_or_empty().to_string(),
            avatar_url: user
                .photo_url
                .clone()
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| placeholder_avatar_url(user.display_name.as_deref())),
        }
    }
}

/// Resources that live exactly as long as a sign-in
pub struct SessionContext {
    user: User,
    scripts: Arc<ScriptManager>,
}

impl SessionContext {
    fn new(user: User, tree: Arc<dyn TreeStore>, raw_access: RawAccessPolicy) -> Self {
        Self {
            scripts: Arc::new(ScriptManager::new(user.clone(), tree, raw_access)),
            user,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn scripts(&self) -> &Arc<ScriptManager> {
        &self.scripts
    }
}

pub enum SessionState {
    SignedOut,
    SignedIn(SessionContext),
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::SignedOut => None,
            SessionState::SignedIn(context) => Some(context.user()),
        }
    }
}

/// Drives the view from session changes and forwards user actions
pub struct SessionController {
    view: Arc<dyn View>,
    tree: Arc<dyn TreeStore>,
    raw_access: RawAccessPolicy,
    state: Mutex<SessionState>,
}

impl SessionController {
    pub fn new(view: Arc<dyn View>, tree: Arc<dyn TreeStore>, raw_access: RawAccessPolicy) -> Self {
        Self {
            view,
            tree,
            raw_access,
            state: Mutex::new(SessionState::SignedOut),
        }
    }

    /// The user of the current context, if signed in
    pub async fn current_user(&self) -> Option<User> {
        self.state.lock().await.user().cloned()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.current_user().await.is_some()
    }

    /// Consume session changes until the sender side closes
    pub async fn run(&self, mut changes: broadcast::Receiver<Option<User>>) {
        loop {
            match changes.recv().await {
                Ok(change) => self.on_session_change(change).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} session changes", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Apply one session change
    pub async fn on_session_change(&self, change: Option<User>) {
        let mut state = self.state.lock().await;

        let Some(user) = change else {
            let was_signed_in = matches!(*state, SessionState::SignedIn(_));
            *state = SessionState::SignedOut;
            drop(state);

            if was_signed_in {
                info!("Session ended");
                self.view.clear_scripts();
            }
            self.view.show_auth_forms();
            return;
        };

        let reused = match &mut *state {
            SessionState::SignedIn(context) if context.user.uid == user.uid => {
                context.user = user.clone();
                context.scripts.rebind(user.clone());
                Some(context.scripts.clone())
            }
            _ => None,
        };

        let manager = match reused {
            Some(manager) => manager,
            None => {
                info!("Session started for {}", user.uid);
                let context = SessionContext::new(user.clone(), self.tree.clone(), self.raw_access.clone());
                let manager = context.scripts.clone();
                *state = SessionState::SignedIn(context);
                manager
            }
        };
        drop(state);

        self.view.show_main_app(&ProfileDisplay::from_user(&user));
        if let Err(err) = self.load_into_view(&manager).await {
            error!("Error loading scripts: {}", err);
        }
    }

    async fn manager(&self) -> Result<Arc<ScriptManager>> {
        match &*self.state.lock().await {
            SessionState::SignedIn(context) => Ok(context.scripts.clone()),
            SessionState::SignedOut => Err(Error::NotSignedIn),
        }
    }

    async fn load_into_view(&self, manager: &ScriptManager) -> Result<Vec<ScriptRecord>> {
        match manager.load_scripts().await {
            Ok(scripts) => {
                self.view.render_scripts(&scripts);
                Ok(scripts)
            }
            Err(err) => {
                self.view.show_error(LOAD_FAILED);
                Err(err)
            }
        }
    }

    /// Upload a script and re-render the list
    pub async fn submit_script(&self, draft: ScriptDraft) -> Result<ScriptRecord> {
        let manager = self.manager().await?;
        match manager.submit(draft).await {
            Ok(record) => {
                self.view.render_scripts(&manager.scripts().await);
                self.view.play_success();
                Ok(record)
            }
            Err(err) => {
                self.view.show_error(&err.user_message());
                Err(err)
            }
        }
    }

    /// Reload the list from the store
    pub async fn reload_scripts(&self) -> Result<Vec<ScriptRecord>> {
        let manager = self.manager().await?;
        self.load_into_view(&manager).await
    }

    /// Copy a script's raw content to the clipboard
    pub async fn view_raw_script(
        &self,
        id: &str,
        secret: Option<&str>,
        clipboard: &dyn Clipboard,
    ) -> Result<RawView> {
        let manager = self.manager().await?;
        match manager.view_raw(id, secret, clipboard).await {
            Ok(view) => {
                if view.copied {
                    self.view.show_notice("Script code copied to clipboard");
                } else {
                    self.view.show_notice("Failed to copy script code. Please copy manually.");
                }
                Ok(view)
            }
            Err(err) => {
                self.view.show_error(&err.user_message());
                Err(err)
            }
        }
    }

    /// Generate a share key and copy it to the clipboard
    pub async fn generate_key(&self, clipboard: &dyn Clipboard) -> Result<String> {
        self.manager().await?;
        let key = generate_key();
        match clipboard.write_text(&key) {
            Ok(()) => self
                .view
                .show_notice(&format!("Unique key generated and copied to clipboard: {}", key)),
            Err(err) => {
                warn!("Failed to copy key: {}", err);
                self.view
                    .show_error(&format!("Failed to copy key. Please copy manually: {}", key));
            }
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_avatar_encodes_name() {
        assert_eq!(
            placeholder_avatar_url(Some("Jane Doe")),
            "https://ui-avatars.com/api/?name=Jane%20Doe&background=6A11CB&color=fff"
        );
        assert_eq!(
            placeholder_avatar_url(None),
            "https://ui-avatars.com/api/?name=User&background=6A11CB&color=fff"
        );
    }

    #[test]
    fn test_profile_display_prefers_photo() {
        let user = User::new("u1").with_display_name("alice").with_photo_url("https://img/a.png");
        let display = ProfileDisplay::from_user(&user);
        assert_eq!(display.username, "alice");
        assert_eq!(display.avatar_url, "https://img/a.png");

        let display = ProfileDisplay::from_user(&User::new("u2"));
        assert_eq!(display.username, "");
        assert!(display.avatar_url.contains("name=User"));
    }
}
