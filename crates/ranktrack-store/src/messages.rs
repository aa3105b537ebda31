//! Message operations: send, edit, tombstone delete, reactions, read
//! receipts, the live window, and the two fetch paths (backward pagination
//! and the cold archived tier).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use ranktrack_shared::types::{ConversationId, CorrelationId, MessageId, UserId};

use crate::backend::{touch, Backend, MessageKey, Snapshots};
use crate::error::{Result, StoreError};
use crate::models::Message;

impl Backend {
    /// Append a message.
    ///
    /// Idempotent with respect to `correlation`: if a message with the same
    /// correlation id already exists in the conversation, it is returned
    /// as-is and nothing is written. A client retrying a failed send with
    /// the original correlation id therefore never produces a duplicate.
    ///
    /// Also bumps the recipient's unread counter and the conversation's
    /// `last_message_at`.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        sender: UserId,
        text: &str,
        correlation: CorrelationId,
    ) -> Result<Message> {
        self.check_write()?;

        let recipient = {
            let conversations = self.inner.read_conversations();
            let conversation = conversations
                .get(&conversation_id)
                .ok_or(StoreError::NotFound)?;
            conversation
                .other(sender)
                .ok_or(StoreError::NotParticipant)?
        };

        let message = {
            let mut messages = self.inner.write_messages();
            let log = messages.entry(conversation_id).or_default();

            if let Some(existing) = log
                .values()
                .find(|message| message.correlation_id == Some(correlation))
            {
                tracing::debug!(
                    conversation = %conversation_id,
                    correlation = %correlation,
                    "send deduplicated by correlation id"
                );
                return Ok(existing.clone());
            }

            let now = self.now();
            let message = Message {
                id: MessageId::new(),
                conversation_id,
                sender,
                text: text.to_string(),
                created_at: now,
                edited: false,
                reactions: BTreeMap::new(),
                read_by: Default::default(),
                correlation_id: Some(correlation),
                deleted: false,
            };
            log.insert((now, message.id), message.clone());
            message
        };

        {
            let mut conversations = self.inner.write_conversations();
            if let Some(conversation) = conversations.get_mut(&conversation_id) {
                *conversation.unread.entry(recipient).or_insert(0) += 1;
                conversation.last_message_at = Some(message.created_at);
            }
        }

        tracing::debug!(
            conversation = %conversation_id,
            message = %message.id,
            sender = %sender.short(),
            "message stored"
        );
        touch(&self.inner.messages_tx);
        touch(&self.inner.conversations_tx);
        Ok(message)
    }

    /// Replace a message's text and flag it as edited.
    pub async fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        new_text: &str,
    ) -> Result<()> {
        self.check_write()?;

        {
            let mut messages = self.inner.write_messages();
            let log = messages
                .get_mut(&conversation_id)
                .ok_or(StoreError::NotFound)?;
            let key = find_live_key(log, message_id)?;
            let message = log.get_mut(&key).ok_or(StoreError::NotFound)?;
            message.text = new_text.to_string();
            message.edited = true;
        }

        touch(&self.inner.messages_tx);
        Ok(())
    }

    /// Soft-delete: the document is kept as a tombstone and remains in
    /// subscription payloads; clients exclude it from render. Deleting an
    /// already-deleted message is a no-op.
    pub async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<()> {
        self.check_write()?;

        let changed = {
            let mut messages = self.inner.write_messages();
            let log = messages
                .get_mut(&conversation_id)
                .ok_or(StoreError::NotFound)?;
            let key = find_key(log, message_id).ok_or(StoreError::NotFound)?;
            let message = log.get_mut(&key).ok_or(StoreError::NotFound)?;
            let was_deleted = message.deleted;
            message.deleted = true;
            !was_deleted
        };

        if changed {
            tracing::debug!(conversation = %conversation_id, message = %message_id, "message tombstoned");
            touch(&self.inner.messages_tx);
        }
        Ok(())
    }

    /// Add `user` to the reactor set for `emoji` on a message. Set-union
    /// semantics: concurrent reactors on the same emoji all survive.
    pub async fn add_reaction(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        emoji: &str,
        user: UserId,
    ) -> Result<()> {
        self.check_write()?;

        let changed = {
            let mut messages = self.inner.write_messages();
            let log = messages
                .get_mut(&conversation_id)
                .ok_or(StoreError::NotFound)?;
            let key = find_live_key(log, message_id)?;
            let message = log.get_mut(&key).ok_or(StoreError::NotFound)?;
            message
                .reactions
                .entry(emoji.to_string())
                .or_default()
                .insert(user)
        };

        if changed {
            touch(&self.inner.messages_tx);
        }
        Ok(())
    }

    /// Remove `user` from the reactor set for `emoji`. Empty sets are
    /// pruned so the emoji disappears with its last reactor.
    pub async fn remove_reaction(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        emoji: &str,
        user: UserId,
    ) -> Result<()> {
        self.check_write()?;

        let changed = {
            let mut messages = self.inner.write_messages();
            let log = messages
                .get_mut(&conversation_id)
                .ok_or(StoreError::NotFound)?;
            let key = find_live_key(log, message_id)?;
            let message = log.get_mut(&key).ok_or(StoreError::NotFound)?;

            match message.reactions.get_mut(emoji) {
                Some(reactors) => {
                    let removed = reactors.remove(&user);
                    if reactors.is_empty() {
                        message.reactions.remove(emoji);
                    }
                    removed
                }
                None => false,
            }
        };

        if changed {
            touch(&self.inner.messages_tx);
        }
        Ok(())
    }

    /// Clear `user`'s unread counter and record them in `read_by` on every
    /// non-deleted message they did not author.
    pub async fn mark_read(&self, conversation_id: ConversationId, user: UserId) -> Result<()> {
        self.check_write()?;

        let counter_changed = {
            let mut conversations = self.inner.write_conversations();
            let conversation = conversations
                .get_mut(&conversation_id)
                .ok_or(StoreError::NotFound)?;
            conversation.unread.insert(user, 0) != Some(0)
        };

        let receipts_changed = {
            let mut messages = self.inner.write_messages();
            let mut changed = false;
            if let Some(log) = messages.get_mut(&conversation_id) {
                for message in log.values_mut() {
                    if message.sender != user && !message.deleted {
                        changed |= message.read_by.insert(user);
                    }
                }
            }
            changed
        };

        if counter_changed {
            touch(&self.inner.conversations_tx);
        }
        if receipts_changed {
            touch(&self.inner.messages_tx);
        }
        Ok(())
    }

    /// The most recent `limit` non-archived messages, oldest first.
    /// Tombstoned messages are included; hiding them is the client's job.
    pub async fn recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Vec<Message> {
        let cutoff = self.archive_cutoff();
        let messages = self.inner.read_messages();
        recent_window(messages.get(&conversation_id), cutoff, limit)
    }

    /// Up to `limit` messages strictly older than `before`, still inside
    /// the retention window, oldest first. Returns fewer than `limit` iff
    /// no more live messages exist before the cursor.
    pub async fn older_messages(
        &self,
        conversation_id: ConversationId,
        before: MessageId,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let cutoff = self.archive_cutoff();
        let messages = self.inner.read_messages();
        let log = messages.get(&conversation_id).ok_or(StoreError::NotFound)?;
        let before_key = find_key(log, before).ok_or(StoreError::NotFound)?;

        let page: Vec<Message> = log
            .range(..before_key)
            .rev()
            .filter(|(_, message)| message.created_at >= cutoff)
            .take(limit)
            .map(|(_, message)| message.clone())
            .collect();

        // Collected newest-first; flip back to render order.
        Ok(page.into_iter().rev().collect())
    }

    /// The newest `limit` messages beyond the retention window, oldest
    /// first. Cold path, fetched on demand only, never subscribed.
    pub async fn archived_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Vec<Message> {
        let cutoff = self.archive_cutoff();
        let messages = self.inner.read_messages();
        let Some(log) = messages.get(&conversation_id) else {
            return Vec::new();
        };

        let page: Vec<Message> = log
            .values()
            .rev()
            .filter(|message| message.created_at < cutoff)
            .take(limit)
            .cloned()
            .collect();
        page.into_iter().rev().collect()
    }

    /// Subscribe to the live window of a conversation: the most recent
    /// `limit` non-archived messages, redelivered in full on every change.
    pub fn watch_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Snapshots<Message> {
        let inner = self.inner.clone();
        Snapshots::new(self.inner.messages_tx.subscribe(), move || {
            let cutoff = inner.clock.now() - inner.retention;
            let messages = inner.read_messages();
            recent_window(messages.get(&conversation_id), cutoff, limit)
        })
    }
}

fn recent_window(
    log: Option<&BTreeMap<MessageKey, Message>>,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> Vec<Message> {
    let Some(log) = log else {
        return Vec::new();
    };
    let window: Vec<Message> = log
        .values()
        .rev()
        .filter(|message| message.created_at >= cutoff)
        .take(limit)
        .cloned()
        .collect();
    window.into_iter().rev().collect()
}

fn find_key(log: &BTreeMap<MessageKey, Message>, id: MessageId) -> Option<MessageKey> {
    log.iter()
        .find(|(_, message)| message.id == id)
        .map(|(key, _)| *key)
}

/// Like [`find_key`] but treats tombstones as absent: edits and reactions
/// target only messages that are still rendered.
fn find_live_key(log: &BTreeMap<MessageKey, Message>, id: MessageId) -> Result<MessageKey> {
    let key = find_key(log, id).ok_or(StoreError::NotFound)?;
    match log.get(&key) {
        Some(message) if !message.deleted => Ok(key),
        _ => Err(StoreError::NotFound),
    }
}
