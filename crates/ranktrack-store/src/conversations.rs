//! Conversation documents: creation, typing flags, roster queries.

use std::collections::BTreeMap;

use ranktrack_shared::types::{ConversationId, UserId};

use crate::backend::{touch, Backend, Snapshots};
use crate::error::{Result, StoreError};
use crate::models::{Conversation, ParticipantInfo, User};

impl Backend {
    /// Create the conversation for a participant pair, or return the
    /// existing one. Idempotent: the id is derived from the unordered pair,
    /// so the same two users always resolve to the same document.
    ///
    /// Participant display info is (re-)denormalised on every call so heads
    /// can render the peer without a user fetch.
    pub async fn ensure_conversation(&self, a: &User, b: &User) -> Result<Conversation> {
        self.check_write()?;

        let id = ConversationId::for_pair(a.id, b.id);
        let mut conversations = self.inner.write_conversations();

        let conversation = conversations.entry(id).or_insert_with(|| {
            tracing::debug!(conversation = %id, "creating conversation");
            Conversation {
                id,
                participants: ConversationId::ordered_pair(a.id, b.id),
                unread: BTreeMap::new(),
                typing: BTreeMap::new(),
                participant_info: BTreeMap::new(),
                created_at: self.now(),
                last_message_at: None,
            }
        });

        conversation.participant_info.insert(a.id, ParticipantInfo::from(a));
        conversation.participant_info.insert(b.id, ParticipantInfo::from(b));
        let snapshot = conversation.clone();
        drop(conversations);

        touch(&self.inner.conversations_tx);
        Ok(snapshot)
    }

    /// Fetch a single conversation.
    pub async fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.inner
            .read_conversations()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// All conversations involving `user`, most recently active first.
    pub async fn conversations_for(&self, user: UserId) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> = self
            .inner
            .read_conversations()
            .values()
            .filter(|conversation| conversation.involves(user))
            .cloned()
            .collect();
        sort_most_recent_first(&mut conversations);
        conversations
    }

    /// Set one participant's typing flag. Writing the already-stored value
    /// is a no-op and does not wake watchers.
    pub async fn set_typing(&self, id: ConversationId, user: UserId, flag: bool) -> Result<()> {
        self.check_write()?;

        let mut conversations = self.inner.write_conversations();
        let conversation = conversations.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !conversation.involves(user) {
            return Err(StoreError::NotParticipant);
        }

        let previous = conversation.typing.insert(user, flag);
        drop(conversations);

        if previous != Some(flag) {
            touch(&self.inner.conversations_tx);
        }
        Ok(())
    }

    /// Subscribe to all conversations involving `user`, most recently
    /// active first.
    pub fn watch_conversations(&self, user: UserId) -> Snapshots<Conversation> {
        let inner = self.inner.clone();
        Snapshots::new(self.inner.conversations_tx.subscribe(), move || {
            let mut conversations: Vec<Conversation> = inner
                .read_conversations()
                .values()
                .filter(|conversation| conversation.involves(user))
                .cloned()
                .collect();
            sort_most_recent_first(&mut conversations);
            conversations
        })
    }
}

fn sort_most_recent_first(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        b.last_message_at
            .unwrap_or(b.created_at)
            .cmp(&a.last_message_at.unwrap_or(a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
