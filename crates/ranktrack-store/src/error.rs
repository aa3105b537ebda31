use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A lookup expected exactly one document but found none.
    #[error("Record not found")]
    NotFound,

    /// The caller is no longer allowed to write (expected during sign-out
    /// races; callers on non-critical paths suppress this silently).
    #[error("Permission denied")]
    PermissionDenied,

    /// Transient backend failure.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The writing user is not a participant of the target conversation.
    #[error("Not a participant of this conversation")]
    NotParticipant,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
