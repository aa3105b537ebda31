//! Optimistic send queue.
//!
//! Locally authored messages are tracked here until the live subscription
//! delivers the confirmed write. Entries are never persisted; they exist
//! only so the window can render a just-sent message immediately and offer
//! a retry affordance when the send fails.

use chrono::{DateTime, Utc};
use serde::Serialize;

use ranktrack_shared::types::{CorrelationId, UserId};
use ranktrack_store::Message;

/// Delivery state of a locally authored message.
///
/// `Sending → Sent` on adapter confirmation, `Sending → Failed` on error,
/// `Failed → Sending` on explicit retry. Removal happens only through
/// [`PendingQueue::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Sending,
    Sent,
    Failed,
}

/// One not-yet-confirmed message.
#[derive(Debug, Clone, Serialize)]
pub struct PendingMessage {
    pub correlation_id: CorrelationId,
    pub sender: UserId,
    pub text: String,
    pub queued_at: DateTime<Utc>,
    pub status: PendingStatus,
}

/// Per-conversation queue of optimistic entries, in authoring order.
///
/// Rendered appended after all confirmed messages. A pending entry is
/// never visually deduplicated against a confirmed message it has not yet
/// been reconciled with; the brief duplicate render self-heals on the next
/// reconciliation pass.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: Vec<PendingMessage>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a new entry in `Sending` state and return its correlation id.
    pub fn push(&mut self, sender: UserId, text: &str, now: DateTime<Utc>) -> CorrelationId {
        let correlation_id = CorrelationId::new();
        self.entries.push(PendingMessage {
            correlation_id,
            sender,
            text: text.to_string(),
            queued_at: now,
            status: PendingStatus::Sending,
        });
        correlation_id
    }

    /// Record adapter confirmation. No-op if the entry was already
    /// reconciled away (the subscription can win the race).
    pub fn mark_sent(&mut self, correlation_id: CorrelationId) {
        self.set_status(correlation_id, PendingStatus::Sent);
    }

    /// Record adapter failure, surfacing the retry affordance.
    pub fn mark_failed(&mut self, correlation_id: CorrelationId) {
        self.set_status(correlation_id, PendingStatus::Failed);
    }

    /// Move a failed entry back to `Sending` and return its text so the
    /// caller can re-invoke the send **with the same correlation id**.
    pub fn begin_retry(&mut self, correlation_id: CorrelationId) -> Option<String> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.correlation_id == correlation_id)?;
        if entry.status != PendingStatus::Failed {
            return None;
        }
        entry.status = PendingStatus::Sending;
        Some(entry.text.clone())
    }

    /// Drop every entry the confirmed set accounts for.
    ///
    /// Primary match is the correlation id; the fallback is the
    /// (sender, text) coincidence for confirmed messages that lost their
    /// correlation id in transit. The fallback deliberately skips `Failed`
    /// entries so a failed send keeps its retry affordance even when an
    /// identical text from the same sender lands meanwhile.
    ///
    /// Robust to delivery order: reconciling against a subscription
    /// snapshot that already contains the confirmed message works whether
    /// or not the send call itself has resolved yet.
    pub fn reconcile(&mut self, confirmed: &[Message]) {
        self.entries.retain(|entry| {
            let matched = confirmed.iter().any(|message| {
                message.correlation_id == Some(entry.correlation_id)
                    || (entry.status != PendingStatus::Failed
                        && message.sender == entry.sender
                        && message.text == entry.text)
            });
            !matched
        });
    }

    /// Entries in authoring order.
    pub fn entries(&self) -> &[PendingMessage] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn set_status(&mut self, correlation_id: CorrelationId, status: PendingStatus) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.correlation_id == correlation_id)
        {
            entry.status = status;
        }
    }
}
