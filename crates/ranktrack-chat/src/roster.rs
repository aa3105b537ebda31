//! Supervision of the open chat heads for the signed-in user.
//!
//! The roster subscribes to the user's conversations and reduces each
//! snapshot into head create/update/remove decisions. Snapshots are
//! applied in event order: a slow fetch resolving after a newer snapshot
//! has already been applied is ignored, not merged.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use ranktrack_shared::time::Clock;
use ranktrack_shared::types::{ConversationId, UserId};
use ranktrack_store::{Backend, Conversation, ParticipantInfo, User};

use crate::config::ChatConfig;
use crate::error::Result;
use crate::head::{ChatHead, Point};

pub struct ChatRosterManager {
    backend: Backend,
    clock: Arc<dyn Clock>,
    config: ChatConfig,
    self_id: UserId,
    heads: Vec<ChatHead>,
    /// Stack slot per open conversation; freed slots are reused lowest
    /// first so heads never overlap.
    slots: HashMap<ConversationId, usize>,
    last_seq: u64,
}

impl ChatRosterManager {
    pub fn new(
        backend: Backend,
        clock: Arc<dyn Clock>,
        config: &ChatConfig,
        self_id: UserId,
    ) -> Self {
        Self {
            backend,
            clock,
            config: config.clone(),
            self_id,
            heads: Vec::new(),
            slots: HashMap::new(),
            last_seq: 0,
        }
    }

    pub fn heads(&self) -> &[ChatHead] {
        &self.heads
    }

    pub fn head(&self, conversation: ConversationId) -> Option<&ChatHead> {
        self.heads
            .iter()
            .find(|head| head.conversation_id() == conversation)
    }

    pub fn head_mut(&mut self, conversation: ConversationId) -> Option<&mut ChatHead> {
        self.heads
            .iter_mut()
            .find(|head| head.conversation_id() == conversation)
    }

    /// Reduce one conversations snapshot into the head set.
    ///
    /// `seq` is the snapshot's position in event order; anything at or
    /// below the last applied sequence is a late resolution and is
    /// dropped.
    ///
    /// Rules per conversation:
    /// - unread > 0, no head: auto-open a collapsed head with the badge.
    /// - head exists: update badge and peer-typing without touching the
    ///   expand state.
    /// - unread drops to 0 while the head is collapsed: remove the head.
    pub async fn apply_conversations(&mut self, seq: u64, snapshot: &[Conversation]) {
        if seq <= self.last_seq {
            debug!(seq, last = self.last_seq, "stale conversations snapshot ignored");
            return;
        }
        self.last_seq = seq;

        let mut to_remove: Vec<ConversationId> = Vec::new();
        for conversation in snapshot {
            if !conversation.involves(self.self_id) {
                continue;
            }
            let unread = conversation.unread_for(self.self_id);

            let existing = self
                .heads
                .iter()
                .position(|head| head.conversation_id() == conversation.id);
            match existing {
                Some(index) => {
                    let head = &mut self.heads[index];
                    let previous = head.unread();
                    head.set_peer_typing(conversation.peer_typing(self.self_id));
                    head.set_unread(unread);
                    if unread == 0 && previous > 0 && !head.is_expanded() {
                        to_remove.push(conversation.id);
                    }
                }
                None if unread > 0 => {
                    debug!(
                        conversation = %conversation.id,
                        unread,
                        "auto-opening head for inbound unread"
                    );
                    let mut head = self.spawn_head(conversation);
                    head.set_unread(unread);
                    head.set_peer_typing(conversation.peer_typing(self.self_id));
                    self.heads.push(head);
                }
                None => {}
            }
        }

        for conversation in to_remove {
            self.remove_head(conversation).await;
        }
    }

    /// Explicit open from the people list: create or focus the head for
    /// this peer, expanded. Idempotent: an already-open conversation is
    /// expanded in place, never duplicated.
    pub async fn open_conversation(&mut self, peer: &User) -> Result<ConversationId> {
        let me = self.backend.get_user(self.self_id).await?;
        let conversation = self.backend.ensure_conversation(&me, peer).await?;

        if self.head(conversation.id).is_none() {
            let head = self.spawn_head(&conversation);
            self.heads.push(head);
        }
        if let Some(head) = self.head_mut(conversation.id) {
            head.expand().await;
        }
        Ok(conversation.id)
    }

    /// User closed the head explicitly.
    pub async fn close(&mut self, conversation: ConversationId) {
        self.remove_head(conversation).await;
    }

    /// Fan the cooperative tick out to every head, pulling fresh message
    /// windows along the way.
    pub async fn tick(&mut self) {
        for head in &mut self.heads {
            head.refresh_from_store();
            head.tick().await;
        }
    }

    /// Drive the roster from the conversations subscription and a coarse
    /// tick until shutdown is signalled. Tears all heads down on exit.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut conversations = self.backend.watch_conversations(self.self_id);
        let mut seq = self.last_seq;

        seq += 1;
        let initial = conversations.current();
        self.apply_conversations(seq, &initial).await;

        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                delivered = conversations.next() => match delivered {
                    Some(snapshot) => {
                        seq += 1;
                        self.apply_conversations(seq, &snapshot).await;
                    }
                    None => break,
                },
                _ = ticker.tick() => self.tick().await,
            }
        }

        self.shutdown().await;
    }

    /// Tear down every head (best-effort typing clears included).
    pub async fn shutdown(&mut self) {
        for head in &mut self.heads {
            head.shutdown().await;
        }
        self.heads.clear();
        self.slots.clear();
    }

    fn spawn_head(&mut self, conversation: &Conversation) -> ChatHead {
        let peer_info = conversation
            .other(self.self_id)
            .and_then(|peer| conversation.participant_info.get(&peer).cloned())
            .unwrap_or(ParticipantInfo {
                display_name: "Unknown".to_string(),
                avatar_url: None,
            });

        let slot = self.claim_slot(conversation.id);
        ChatHead::new(
            self.backend.clone(),
            Arc::clone(&self.clock),
            &self.config,
            conversation.id,
            self.self_id,
            peer_info,
            self.slot_position(slot),
        )
    }

    async fn remove_head(&mut self, conversation: ConversationId) {
        if let Some(index) = self
            .heads
            .iter()
            .position(|head| head.conversation_id() == conversation)
        {
            let mut head = self.heads.remove(index);
            head.shutdown().await;
            self.slots.remove(&conversation);
            debug!(conversation = %conversation, "head removed");
        }
    }

    /// Lowest stack slot not currently occupied.
    fn claim_slot(&mut self, conversation: ConversationId) -> usize {
        let mut slot = 0;
        while self.slots.values().any(|taken| *taken == slot) {
            slot += 1;
        }
        self.slots.insert(conversation, slot);
        slot
    }

    fn slot_position(&self, slot: usize) -> Point {
        Point::new(
            self.config.head_stack_x_px,
            self.config.head_stack_base_px
                + slot as f32 * (self.config.head_size_px + self.config.head_stack_gap_px),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranktrack_shared::time::ManualClock;
    use ranktrack_shared::types::CorrelationId;

    struct Fixture {
        backend: Backend,
        roster: ChatRosterManager,
        me: User,
        peer: User,
        conversation: ConversationId,
    }

    async fn fixture() -> Fixture {
        let clock = ManualClock::start_now();
        let backend = Backend::new(Arc::new(clock.clone()));

        let me = User::new("me", "me@example.com", clock.now());
        let peer = User::new("peer", "peer@example.com", clock.now());
        backend.upsert_user(me.clone()).await.unwrap();
        backend.upsert_user(peer.clone()).await.unwrap();
        let conversation = backend.ensure_conversation(&me, &peer).await.unwrap().id;

        let roster = ChatRosterManager::new(
            backend.clone(),
            Arc::new(clock.clone()),
            &ChatConfig::default(),
            me.id,
        );

        Fixture {
            backend,
            roster,
            me,
            peer,
            conversation,
        }
    }

    async fn snapshot(f: &Fixture) -> Vec<Conversation> {
        f.backend.conversations_for(f.me.id).await
    }

    async fn peer_send(f: &Fixture, text: &str) {
        f.backend
            .send_message(f.conversation, f.peer.id, text, CorrelationId::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_auto_open_on_unread_and_remove_on_read_through() {
        let mut f = fixture().await;
        for text in ["a", "b", "c"] {
            peer_send(&f, text).await;
        }

        let snap = snapshot(&f).await;
        f.roster.apply_conversations(1, &snap).await;

        let head = f.roster.head(f.conversation).expect("auto-opened");
        assert!(!head.is_expanded());
        assert_eq!(head.unread(), 3);

        // Read through on another device: unread drops to zero while the
        // head is still collapsed.
        f.backend.mark_read(f.conversation, f.me.id).await.unwrap();
        let snap = snapshot(&f).await;
        f.roster.apply_conversations(2, &snap).await;

        assert!(f.roster.head(f.conversation).is_none());
    }

    #[tokio::test]
    async fn test_badge_updates_without_expand_state_change() {
        let mut f = fixture().await;
        peer_send(&f, "one").await;
        f.roster.apply_conversations(1, &snapshot(&f).await).await;
        let position = f.roster.head(f.conversation).unwrap().position();

        peer_send(&f, "two").await;
        f.roster.apply_conversations(2, &snapshot(&f).await).await;

        let head = f.roster.head(f.conversation).unwrap();
        assert_eq!(head.unread(), 2);
        assert!(!head.is_expanded());
        assert_eq!(head.position(), position);
        assert_eq!(f.roster.heads().len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_open_is_idempotent() {
        let mut f = fixture().await;

        let first = f.roster.open_conversation(&f.peer.clone()).await.unwrap();
        let second = f.roster.open_conversation(&f.peer.clone()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.roster.heads().len(), 1);
        assert!(f.roster.head(first).unwrap().is_expanded());
    }

    #[tokio::test]
    async fn test_explicit_open_focuses_auto_opened_head() {
        let mut f = fixture().await;
        peer_send(&f, "ping").await;
        f.roster.apply_conversations(1, &snapshot(&f).await).await;
        assert!(!f.roster.head(f.conversation).unwrap().is_expanded());

        f.roster.open_conversation(&f.peer.clone()).await.unwrap();
        assert_eq!(f.roster.heads().len(), 1);
        assert!(f.roster.head(f.conversation).unwrap().is_expanded());
    }

    #[tokio::test]
    async fn test_expanded_head_survives_read_through() {
        let mut f = fixture().await;
        f.roster.open_conversation(&f.peer.clone()).await.unwrap();

        peer_send(&f, "hello").await;
        f.roster.apply_conversations(1, &snapshot(&f).await).await;
        assert_eq!(f.roster.head(f.conversation).unwrap().unread(), 1);

        f.backend.mark_read(f.conversation, f.me.id).await.unwrap();
        f.roster.apply_conversations(2, &snapshot(&f).await).await;

        // Expanded heads are never auto-removed.
        assert!(f.roster.head(f.conversation).is_some());
    }

    #[tokio::test]
    async fn test_stale_snapshot_ignored() {
        let mut f = fixture().await;
        peer_send(&f, "fresh").await;
        let newer = snapshot(&f).await;

        f.roster.apply_conversations(5, &newer).await;
        assert_eq!(f.roster.head(f.conversation).unwrap().unread(), 1);

        // A stale in-flight fetch from before the send finally resolves.
        let mut stale = newer.clone();
        stale[0].unread.insert(f.me.id, 0);
        f.roster.apply_conversations(3, &stale).await;

        assert_eq!(f.roster.head(f.conversation).unwrap().unread(), 1);
    }

    #[tokio::test]
    async fn test_heads_stack_without_overlap_and_reuse_slots() {
        let mut f = fixture().await;
        let other = User::new("other", "other@example.com", chrono::Utc::now());
        f.backend.upsert_user(other.clone()).await.unwrap();

        let first = f.roster.open_conversation(&f.peer.clone()).await.unwrap();
        let second = f.roster.open_conversation(&other).await.unwrap();

        let p1 = f.roster.head(first).unwrap().position();
        let p2 = f.roster.head(second).unwrap().position();
        assert_ne!(p1.y, p2.y);

        f.roster.close(first).await;
        assert!(f.roster.head(first).is_none());

        // The freed slot is handed to the next head.
        let third = f.roster.open_conversation(&f.peer.clone()).await.unwrap();
        assert_eq!(f.roster.head(third).unwrap().position(), p1);
    }

    #[tokio::test]
    async fn test_typing_flag_reaches_head() {
        let mut f = fixture().await;
        peer_send(&f, "hi").await;
        f.backend
            .set_typing(f.conversation, f.peer.id, true)
            .await
            .unwrap();

        f.roster.apply_conversations(1, &snapshot(&f).await).await;
        assert!(f.roster.head(f.conversation).unwrap().peer_typing());
    }
}
