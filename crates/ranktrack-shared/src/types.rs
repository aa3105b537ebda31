use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account identifier assigned by the auth collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a two-party conversation document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Deterministic id for an unordered participant pair.
    ///
    /// The same two users always map to the same conversation, which is how
    /// the one-conversation-per-pair invariant is enforced: creation is a
    /// lookup-or-insert on this id, never a second document.
    pub fn for_pair(a: UserId, b: UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut buf = [0u8; 32];
        buf[..16].copy_from_slice(lo.0.as_bytes());
        buf[16..].copy_from_slice(hi.0.as_bytes());
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, &buf))
    }

    /// Sorted participant pair for a new conversation document.
    pub fn ordered_pair(a: UserId, b: UserId) -> [UserId; 2] {
        if a <= b {
            [a, b]
        } else {
            [b, a]
        }
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-chosen id correlating an optimistic send with the confirmed write.
///
/// A retried send MUST reuse the correlation id of the original attempt;
/// the store deduplicates on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's presence status as shown to peers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Away,
    Offline,
}

impl PresenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for PresenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_id_is_order_independent() {
        let a = UserId::new();
        let b = UserId::new();

        assert_eq!(ConversationId::for_pair(a, b), ConversationId::for_pair(b, a));
        assert_ne!(
            ConversationId::for_pair(a, b),
            ConversationId::for_pair(a, UserId::new())
        );
    }

    #[test]
    fn test_ordered_pair_sorts() {
        let a = UserId::new();
        let b = UserId::new();

        let pair = ConversationId::ordered_pair(a, b);
        assert!(pair[0] <= pair[1]);
        assert_eq!(pair, ConversationId::ordered_pair(b, a));
    }

    #[test]
    fn test_short_id_length() {
        assert_eq!(UserId::new().short().len(), 8);
    }
}
