//! Domain model structs held in the hosted document store.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the rendering layer.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ranktrack_shared::types::{ConversationId, CorrelationId, MessageId, PresenceState, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An account, including the presence fields maintained by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    /// Reference to the avatar image, if one was uploaded.
    pub avatar_url: Option<String>,
    /// Presence status written by this user's own tracker.
    pub presence: PresenceState,
    /// Last local activity (pointer/key/touch) seen by the tracker.
    pub last_activity: DateTime<Utc>,
    /// When the user last ended a session.
    pub last_online: DateTime<Utc>,
}

impl User {
    /// A fresh offline account record.
    pub fn new(display_name: impl Into<String>, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            display_name: display_name.into(),
            email: email.into(),
            avatar_url: None,
            presence: PresenceState::Offline,
            last_activity: now,
            last_online: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Display info denormalised onto the conversation so heads can render
/// without a user fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for ParticipantInfo {
    fn from(user: &User) -> Self {
        Self {
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// A two-party message thread and its per-user metadata.
///
/// There is exactly one conversation document per unordered participant
/// pair; see [`ConversationId::for_pair`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    /// The two participants, sorted ascending.
    pub participants: [UserId; 2],
    /// Unread message count per participant.
    pub unread: BTreeMap<UserId, u32>,
    /// Typing flag per participant.
    pub typing: BTreeMap<UserId, bool>,
    /// Denormalised display info per participant.
    pub participant_info: BTreeMap<UserId, ParticipantInfo>,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the newest message, used to order roster listings.
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn involves(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// The participant that is not `me`, if `me` is a participant.
    pub fn other(&self, me: UserId) -> Option<UserId> {
        match self.participants {
            [a, b] if a == me => Some(b),
            [a, b] if b == me => Some(a),
            _ => None,
        }
    }

    pub fn unread_for(&self, user: UserId) -> u32 {
        self.unread.get(&user).copied().unwrap_or(0)
    }

    /// True iff any participant other than `me` has their typing flag set.
    pub fn peer_typing(&self, me: UserId) -> bool {
        self.typing
            .iter()
            .any(|(user, flag)| *user != me && *flag)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Lifecycle of a message, derived from its tombstone flag and age.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageLifecycle {
    Active,
    Archived,
    Deleted,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Set once the text has been replaced after the initial send.
    pub edited: bool,
    /// Emoji → users who reacted with it. Updates are set unions, so
    /// concurrent reactors on the same emoji never lose each other.
    pub reactions: BTreeMap<String, BTreeSet<UserId>>,
    /// Users who have read through this message.
    pub read_by: BTreeSet<UserId>,
    /// Correlation id supplied by the sender's client, used to match the
    /// confirmed write against the optimistic pending entry.
    pub correlation_id: Option<CorrelationId>,
    /// Tombstone: the document is retained but excluded from render.
    pub deleted: bool,
}

impl Message {
    /// True iff this message has aged out of the live subscription window.
    pub fn is_archived(&self, archive_cutoff: DateTime<Utc>) -> bool {
        self.created_at < archive_cutoff
    }

    /// Deleted wins over archived; everything else is active.
    pub fn lifecycle(&self, archive_cutoff: DateTime<Utc>) -> MessageLifecycle {
        if self.deleted {
            MessageLifecycle::Deleted
        } else if self.is_archived(archive_cutoff) {
            MessageLifecycle::Archived
        } else {
            MessageLifecycle::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ranktrack_shared::types::ConversationId;

    fn test_message(created_at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId::new(),
            conversation_id: ConversationId(uuid::Uuid::new_v4()),
            sender: UserId::new(),
            text: "hello".into(),
            created_at,
            edited: false,
            reactions: BTreeMap::new(),
            read_by: BTreeSet::new(),
            correlation_id: None,
            deleted: false,
        }
    }

    #[test]
    fn test_lifecycle_deleted_wins_over_archived() {
        let now = Utc::now();
        let mut msg = test_message(now - Duration::days(30));
        let cutoff = now - Duration::days(15);

        assert_eq!(msg.lifecycle(cutoff), MessageLifecycle::Archived);

        msg.deleted = true;
        assert_eq!(msg.lifecycle(cutoff), MessageLifecycle::Deleted);
    }

    #[test]
    fn test_peer_typing_ignores_self() {
        let me = UserId::new();
        let them = UserId::new();

        let mut conv = Conversation {
            id: ConversationId::for_pair(me, them),
            participants: ConversationId::ordered_pair(me, them),
            unread: BTreeMap::new(),
            typing: BTreeMap::new(),
            participant_info: BTreeMap::new(),
            created_at: Utc::now(),
            last_message_at: None,
        };

        conv.typing.insert(me, true);
        assert!(!conv.peer_typing(me));

        conv.typing.insert(them, true);
        assert!(conv.peer_typing(me));
        assert!(conv.other(me) == Some(them));
    }
}
