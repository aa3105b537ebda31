//! Presence tracking for the signed-in user.
//!
//! [`PresenceTracker`] is the single source of truth for self-status. It
//! moves between online and away from local activity signals and a
//! periodic tick, re-writes online on a heartbeat so the remote
//! last-activity stays fresh, and writes offline on session end. Every
//! status write is fire-and-forget: failures are logged at debug level and
//! never retried or surfaced; presence is best-effort by design.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use ranktrack_shared::time::Clock;
use ranktrack_shared::types::{PresenceState, UserId};
use ranktrack_store::{Backend, PresenceUpdate, StoreError, User};

use crate::config::ChatConfig;

pub struct PresenceTracker {
    backend: Backend,
    clock: Arc<dyn Clock>,
    idle_threshold: chrono::Duration,
    heartbeat_interval: chrono::Duration,
    staleness_threshold: chrono::Duration,
    user_id: UserId,
    status: PresenceState,
    last_activity: DateTime<Utc>,
    /// When a status write last succeeded; drives the heartbeat.
    last_write: Option<DateTime<Utc>>,
}

impl PresenceTracker {
    pub fn new(
        backend: Backend,
        clock: Arc<dyn Clock>,
        config: &ChatConfig,
        user_id: UserId,
    ) -> Self {
        let now = clock.now();
        Self {
            backend,
            clock,
            idle_threshold: config.idle_threshold,
            heartbeat_interval: config.heartbeat_interval,
            staleness_threshold: config.staleness_threshold,
            user_id,
            status: PresenceState::Offline,
            last_activity: now,
            last_write: None,
        }
    }

    /// Current self-status as this tracker believes it.
    pub fn status(&self) -> PresenceState {
        self.status
    }

    /// Mark the session online with fresh timestamps.
    pub async fn start_session(&mut self) {
        self.last_activity = self.clock.now();
        self.status = PresenceState::Online;
        self.push(PresenceState::Online, false).await;
    }

    /// A local activity signal (pointer movement, key press, touch).
    ///
    /// Always refreshes the local last-activity. Only an away→online
    /// transition writes immediately; while already online the heartbeat
    /// keeps the remote record fresh.
    pub async fn on_activity(&mut self) {
        self.last_activity = self.clock.now();
        if self.status == PresenceState::Away {
            self.status = PresenceState::Online;
            self.push(PresenceState::Online, false).await;
        }
    }

    /// Periodic tick: idle detection and heartbeat.
    pub async fn on_tick(&mut self) {
        if self.status != PresenceState::Online {
            return;
        }

        let now = self.clock.now();
        if now - self.last_activity >= self.idle_threshold {
            self.status = PresenceState::Away;
            self.push(PresenceState::Away, false).await;
            return;
        }

        let heartbeat_due = match self.last_write {
            Some(at) => now - at >= self.heartbeat_interval,
            None => true,
        };
        if heartbeat_due {
            self.push(PresenceState::Online, false).await;
        }
    }

    /// Best-effort offline write on sign-out or unload.
    pub async fn end_session(&mut self) {
        self.status = PresenceState::Offline;
        self.push(PresenceState::Offline, true).await;
    }

    /// The status to display for a peer: an "online" record whose last
    /// activity is older than the staleness threshold is treated as
    /// offline (the peer's client likely died without its offline write).
    pub fn effective_status(user: &User, now: DateTime<Utc>, staleness: chrono::Duration) -> PresenceState {
        if user.presence == PresenceState::Online && now - user.last_activity >= staleness {
            PresenceState::Offline
        } else {
            user.presence
        }
    }

    /// Persist the staleness downgrade for every affected user.
    ///
    /// Safe for any number of observers to run concurrently: each write
    /// sets the same offline state, so racing sweeps converge instead of
    /// conflicting. Failures are ignored like every other presence write.
    pub async fn sweep_stale(&self) {
        let now = self.clock.now();
        for user in self.backend.users().await {
            if user.presence == PresenceState::Online
                && Self::effective_status(&user, now, self.staleness_threshold)
                    == PresenceState::Offline
            {
                debug!(user = %user.id.short(), "downgrading stale online presence");
                let update = PresenceUpdate {
                    presence: Some(PresenceState::Offline),
                    last_online: Some(user.last_activity),
                    ..Default::default()
                };
                if let Err(error) = self.backend.set_presence(user.id, update).await {
                    debug!(user = %user.id.short(), %error, "stale sweep write failed (ignored)");
                }
            }
        }
    }

    /// Drive the tracker from an activity channel and a coarse real-time
    /// tick until shutdown is signalled. Ends the session on exit.
    pub async fn run(
        mut self,
        mut activity: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.start_session().await;
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                signal = activity.recv() => match signal {
                    Some(()) => self.on_activity().await,
                    None => break,
                },
                _ = ticker.tick() => self.on_tick().await,
            }
        }

        self.end_session().await;
    }

    async fn push(&mut self, state: PresenceState, with_last_online: bool) {
        let now = self.clock.now();
        let update = PresenceUpdate {
            presence: Some(state),
            last_activity: Some(self.last_activity),
            last_online: with_last_online.then_some(now),
        };

        match self.backend.set_presence(self.user_id, update).await {
            Ok(()) => {
                trace!(user = %self.user_id.short(), status = %state, "presence written");
                self.last_write = Some(now);
            }
            Err(StoreError::PermissionDenied) => {
                trace!(user = %self.user_id.short(), "presence write denied (sign-out race)");
            }
            Err(error) => {
                debug!(user = %self.user_id.short(), %error, "presence write failed (ignored)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ranktrack_shared::time::ManualClock;
    use ranktrack_store::WriteFault;

    struct Fixture {
        backend: Backend,
        clock: ManualClock,
        tracker: PresenceTracker,
        user_id: UserId,
    }

    async fn fixture() -> Fixture {
        let clock = ManualClock::start_now();
        let backend = Backend::new(Arc::new(clock.clone()));
        let user = User::new("sam", "sam@example.com", clock.now());
        let user_id = user.id;
        backend.upsert_user(user).await.unwrap();

        let tracker = PresenceTracker::new(
            backend.clone(),
            Arc::new(clock.clone()),
            &ChatConfig::default(),
            user_id,
        );

        Fixture {
            backend,
            clock,
            tracker,
            user_id,
        }
    }

    async fn stored_status(f: &Fixture) -> PresenceState {
        f.backend.get_user(f.user_id).await.unwrap().presence
    }

    #[tokio::test]
    async fn test_away_after_idle_threshold_only() {
        let mut f = fixture().await;
        f.tracker.start_session().await;

        f.clock.advance(Duration::minutes(4));
        f.tracker.on_tick().await;
        assert_eq!(f.tracker.status(), PresenceState::Online);

        f.clock.advance(Duration::minutes(1));
        f.tracker.on_tick().await;
        assert_eq!(f.tracker.status(), PresenceState::Away);
        assert_eq!(stored_status(&f).await, PresenceState::Away);
    }

    #[tokio::test]
    async fn test_activity_restores_online_immediately() {
        let mut f = fixture().await;
        f.tracker.start_session().await;

        f.clock.advance(Duration::minutes(6));
        f.tracker.on_tick().await;
        assert_eq!(f.tracker.status(), PresenceState::Away);

        f.tracker.on_activity().await;
        assert_eq!(f.tracker.status(), PresenceState::Online);
        assert_eq!(stored_status(&f).await, PresenceState::Online);
    }

    #[tokio::test]
    async fn test_never_offline_without_teardown() {
        let mut f = fixture().await;
        f.tracker.start_session().await;

        for _ in 0..30 {
            f.clock.advance(Duration::minutes(1));
            f.tracker.on_tick().await;
            assert_ne!(f.tracker.status(), PresenceState::Offline);
        }

        f.tracker.end_session().await;
        assert_eq!(stored_status(&f).await, PresenceState::Offline);
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_remote_activity() {
        let mut f = fixture().await;
        f.tracker.start_session().await;

        // Activity keeps the user online; the heartbeat must refresh the
        // stored last_activity even between activity writes.
        f.clock.advance(Duration::seconds(45));
        f.tracker.on_activity().await; // online→online: no write
        let before = f.backend.get_user(f.user_id).await.unwrap().last_activity;

        f.clock.advance(Duration::seconds(61));
        f.tracker.on_activity().await;
        f.tracker.on_tick().await; // heartbeat due
        let after = f.backend.get_user(f.user_id).await.unwrap().last_activity;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_sweep_downgrades_stale_online_idempotently() {
        let f = fixture().await;
        let ghost = User {
            presence: PresenceState::Online,
            last_activity: f.clock.now() - Duration::minutes(11),
            ..User::new("ghost", "ghost@example.com", f.clock.now())
        };
        let ghost_id = ghost.id;
        f.backend.upsert_user(ghost).await.unwrap();

        f.tracker.sweep_stale().await;
        assert_eq!(
            f.backend.get_user(ghost_id).await.unwrap().presence,
            PresenceState::Offline
        );

        // A second (racing) sweep sees nothing left to do.
        f.tracker.sweep_stale().await;
        assert_eq!(
            f.backend.get_user(ghost_id).await.unwrap().presence,
            PresenceState::Offline
        );
    }

    #[tokio::test]
    async fn test_write_failures_swallowed() {
        let mut f = fixture().await;
        f.tracker.start_session().await;

        f.backend.set_write_fault(Some(WriteFault::Unavailable));
        f.clock.advance(Duration::minutes(6));
        f.tracker.on_tick().await;
        // Local state still advanced; nothing surfaced.
        assert_eq!(f.tracker.status(), PresenceState::Away);

        f.backend.set_write_fault(Some(WriteFault::PermissionDenied));
        f.tracker.on_activity().await;
        assert_eq!(f.tracker.status(), PresenceState::Online);
    }

    #[test]
    fn test_effective_status_downgrades_stale_online() {
        let now = Utc::now();
        let mut user = User::new("p", "p@example.com", now - Duration::minutes(20));
        user.presence = PresenceState::Online;

        assert_eq!(
            PresenceTracker::effective_status(&user, now, Duration::minutes(10)),
            PresenceState::Offline
        );

        user.last_activity = now - Duration::minutes(5);
        assert_eq!(
            PresenceTracker::effective_status(&user, now, Duration::minutes(10)),
            PresenceState::Online
        );
    }
}
