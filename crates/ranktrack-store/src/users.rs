//! User records and presence writes.

use chrono::{DateTime, Utc};

use ranktrack_shared::types::{PresenceState, UserId};

use crate::backend::{touch, Backend, Snapshots};
use crate::error::{Result, StoreError};
use crate::models::User;

/// Field-level merge write for the presence portion of a user document.
///
/// Only fields set to `Some` are changed; concurrent merges to disjoint
/// fields do not clobber each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceUpdate {
    pub presence: Option<PresenceState>,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_online: Option<DateTime<Utc>>,
}

impl Backend {
    /// Insert or replace a user record.
    pub async fn upsert_user(&self, user: User) -> Result<()> {
        self.check_write()?;

        tracing::debug!(user = %user.id.short(), name = %user.display_name, "upserting user");
        self.inner.write_users().insert(user.id, user);
        touch(&self.inner.users_tx);
        Ok(())
    }

    /// Fetch a single user.
    pub async fn get_user(&self, id: UserId) -> Result<User> {
        self.inner
            .read_users()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// All known users.
    pub async fn users(&self) -> Vec<User> {
        self.inner.read_users().values().cloned().collect()
    }

    /// Merge presence fields into a user document.
    pub async fn set_presence(&self, id: UserId, update: PresenceUpdate) -> Result<()> {
        self.check_write()?;

        let mut users = self.inner.write_users();
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(state) = update.presence {
            user.presence = state;
        }
        if let Some(at) = update.last_activity {
            user.last_activity = at;
        }
        if let Some(at) = update.last_online {
            user.last_online = at;
        }
        drop(users);

        touch(&self.inner.users_tx);
        Ok(())
    }

    /// Subscribe to the full user collection.
    pub fn watch_users(&self) -> Snapshots<User> {
        let inner = self.inner.clone();
        Snapshots::new(self.inner.users_tx.subscribe(), move || {
            inner.read_users().values().cloned().collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ranktrack_shared::time::{Clock, ManualClock};

    fn test_backend() -> (Backend, ManualClock) {
        let clock = ManualClock::start_now();
        (Backend::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_presence_merge_leaves_other_fields() {
        let (backend, clock) = test_backend();
        let user = User::new("lena", "lena@example.com", clock.now());
        let id = user.id;
        let created_activity = user.last_activity;
        backend.upsert_user(user).await.unwrap();

        clock.advance(chrono::Duration::seconds(30));
        backend
            .set_presence(
                id,
                PresenceUpdate {
                    presence: Some(PresenceState::Online),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = backend.get_user(id).await.unwrap();
        assert_eq!(stored.presence, PresenceState::Online);
        // last_activity was not part of the merge.
        assert_eq!(stored.last_activity, created_activity);
    }

    #[tokio::test]
    async fn test_presence_write_unknown_user() {
        let (backend, _clock) = test_backend();
        let result = backend
            .set_presence(UserId::new(), PresenceUpdate::default())
            .await;
        assert_eq!(result, Err(StoreError::NotFound));
    }
}
