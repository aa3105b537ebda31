//! Session wiring for one signed-in user.
//!
//! [`ChatSession`] composes the presence tracker and the roster manager
//! over a shared backend handle, and stands in for the auth collaborator's
//! session-changed notification with a `watch` channel. Everything here is
//! per-user; two sessions over the same backend model two browsers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use ranktrack_shared::time::Clock;
use ranktrack_shared::types::UserId;
use ranktrack_store::{Backend, User};

use crate::config::ChatConfig;
use crate::error::Result;
use crate::presence::PresenceTracker;
use crate::roster::ChatRosterManager;

/// What the auth collaborator exposes about the current session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for SessionInfo {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

pub struct ChatSession {
    user: User,
    pub presence: PresenceTracker,
    pub roster: ChatRosterManager,
    session_tx: watch::Sender<Option<SessionInfo>>,
}

impl ChatSession {
    /// Register the user, mark them online, and wire up the roster.
    pub async fn sign_in(
        backend: Backend,
        clock: Arc<dyn Clock>,
        config: &ChatConfig,
        user: User,
    ) -> Result<Self> {
        backend.upsert_user(user.clone()).await?;

        let mut presence =
            PresenceTracker::new(backend.clone(), Arc::clone(&clock), config, user.id);
        presence.start_session().await;

        let roster = ChatRosterManager::new(backend, clock, config, user.id);
        let (session_tx, _) = watch::channel(Some(SessionInfo::from(&user)));

        info!(user = %user.id.short(), name = %user.display_name, "session started");
        Ok(Self {
            user,
            presence,
            roster,
            session_tx,
        })
    }

    pub fn current_user(&self) -> &User {
        &self.user
    }

    /// Subscribe to session changes; `None` means signed out.
    pub fn session_changes(&self) -> watch::Receiver<Option<SessionInfo>> {
        self.session_tx.subscribe()
    }

    /// A local activity signal, forwarded to the presence tracker.
    pub async fn activity(&mut self) {
        self.presence.on_activity().await;
    }

    /// One cooperative tick: presence timers, then every head's timers
    /// and message window.
    pub async fn tick(&mut self) {
        self.presence.on_tick().await;
        self.roster.tick().await;
    }

    /// Tear the session down: best-effort typing clears, offline write,
    /// and the session-changed notification. Writes that race the
    /// sign-out are suppressed by the components themselves.
    pub async fn sign_out(mut self) {
        info!(user = %self.user.id.short(), "session ending");
        self.roster.shutdown().await;
        self.presence.end_session().await;
        let _ = self.session_tx.send(None);
    }
}
