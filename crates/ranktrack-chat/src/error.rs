use thiserror::Error;

use ranktrack_store::StoreError;

/// Errors surfaced by the chat core.
///
/// Non-critical write paths (presence, typing) swallow their failures and
/// never produce one of these; only operations with a user-visible "try
/// again" affordance (edit, delete, react, pagination, opening a
/// conversation) propagate.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
