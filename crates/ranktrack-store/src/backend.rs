//! Backend handle and subscription plumbing.
//!
//! [`Backend`] stands in for the hosted document store's client SDK: an
//! in-memory set of collections with per-collection change notification.
//! Operations are `async` to match the shape of the real network-backed
//! SDK; against this implementation they resolve immediately.
//!
//! Subscriptions re-deliver the **full current window** after every
//! underlying change (not a diff stream). Notification is a per-collection
//! `watch` channel carrying a version counter, so bursts of writes may
//! coalesce into a single redelivery; observers always read the latest
//! state, never an intermediate one.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use ranktrack_shared::constants::DEFAULT_RETENTION_DAYS;
use ranktrack_shared::time::Clock;
use ranktrack_shared::types::{ConversationId, MessageId, UserId};

use crate::error::{Result, StoreError};
use crate::models::{Conversation, Message, User};

/// Ordering key for messages within a conversation: creation time, with the
/// id as tiebreaker for identical timestamps.
pub(crate) type MessageKey = (DateTime<Utc>, MessageId);

/// Fault injected into subsequent mutating calls, for tests and dev tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// Transient outage: writes fail with [`StoreError::Unavailable`].
    Unavailable,
    /// Session no longer authorised: writes fail with
    /// [`StoreError::PermissionDenied`].
    PermissionDenied,
}

pub(crate) struct Inner {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) retention: Duration,
    pub(crate) users: RwLock<BTreeMap<UserId, User>>,
    pub(crate) conversations: RwLock<BTreeMap<ConversationId, Conversation>>,
    pub(crate) messages: RwLock<HashMap<ConversationId, BTreeMap<MessageKey, Message>>>,
    pub(crate) users_tx: watch::Sender<u64>,
    pub(crate) conversations_tx: watch::Sender<u64>,
    pub(crate) messages_tx: watch::Sender<u64>,
    write_fault: Mutex<Option<WriteFault>>,
}

/// Handle to the document store. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Backend {
    pub(crate) inner: Arc<Inner>,
}

impl Backend {
    /// An empty store using the given clock and the default retention
    /// window.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_retention(clock, Duration::days(DEFAULT_RETENTION_DAYS))
    }

    /// An empty store with an explicit retention window. Messages older
    /// than the window are served only through the archived (cold) path.
    pub fn with_retention(clock: Arc<dyn Clock>, retention: Duration) -> Self {
        let (users_tx, _) = watch::channel(0);
        let (conversations_tx, _) = watch::channel(0);
        let (messages_tx, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                clock,
                retention,
                users: RwLock::new(BTreeMap::new()),
                conversations: RwLock::new(BTreeMap::new()),
                messages: RwLock::new(HashMap::new()),
                users_tx,
                conversations_tx,
                messages_tx,
                write_fault: Mutex::new(None),
            }),
        }
    }

    /// Inject (or clear) a fault applied to subsequent mutating calls.
    pub fn set_write_fault(&self, fault: Option<WriteFault>) {
        *self
            .inner
            .write_fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fault;
    }

    pub(crate) fn check_write(&self) -> Result<()> {
        let fault = *self
            .inner
            .write_fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match fault {
            Some(WriteFault::Unavailable) => {
                Err(StoreError::Unavailable("backend unreachable".into()))
            }
            Some(WriteFault::PermissionDenied) => Err(StoreError::PermissionDenied),
            None => Ok(()),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Oldest creation time still inside the live (non-archived) tier.
    pub(crate) fn archive_cutoff(&self) -> DateTime<Utc> {
        self.now() - self.inner.retention
    }
}

// Lock accessors recover from poisoning instead of propagating it: a panic
// in one observer must not wedge the whole store.
impl Inner {
    pub(crate) fn read_users(&self) -> RwLockReadGuard<'_, BTreeMap<UserId, User>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_users(&self) -> RwLockWriteGuard<'_, BTreeMap<UserId, User>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn read_conversations(
        &self,
    ) -> RwLockReadGuard<'_, BTreeMap<ConversationId, Conversation>> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_conversations(
        &self,
    ) -> RwLockWriteGuard<'_, BTreeMap<ConversationId, Conversation>> {
        self.conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn read_messages(
        &self,
    ) -> RwLockReadGuard<'_, HashMap<ConversationId, BTreeMap<MessageKey, Message>>> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_messages(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<ConversationId, BTreeMap<MessageKey, Message>>> {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bump a collection's version counter, waking its watchers.
pub(crate) fn touch(tx: &watch::Sender<u64>) {
    tx.send_modify(|version| *version += 1);
}

/// A live subscription delivering full snapshots of one query window.
///
/// `current()` reads the window synchronously; `next().await` resolves with
/// a fresh snapshot after the next underlying change. Unsubscribing is
/// dropping the value. `next()` returns `None` once the backend itself has
/// been dropped.
pub struct Snapshots<T> {
    rx: watch::Receiver<u64>,
    read: Box<dyn Fn() -> Vec<T> + Send + Sync>,
}

impl<T> Snapshots<T> {
    pub(crate) fn new(
        rx: watch::Receiver<u64>,
        read: impl Fn() -> Vec<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            rx,
            read: Box::new(read),
        }
    }

    /// The window as of now.
    pub fn current(&self) -> Vec<T> {
        (self.read)()
    }

    /// Wait for the next change, then return the full refreshed window.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }
}
