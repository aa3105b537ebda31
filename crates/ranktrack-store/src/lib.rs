//! # ranktrack-store
//!
//! Client-side stand-in for the hosted backend's document store SDK.
//!
//! The crate exposes a cloneable [`Backend`] handle with typed operations
//! for every chat collection (users, conversations, messages) plus live
//! [`Snapshots`] subscriptions that redeliver the full query window on
//! every change. All state is in memory; the operation surface and
//! semantics (merge writes, correlation-id idempotent sends, set-union
//! reactions, tombstone deletes, retention tiers) match what the hosted
//! service provides, so the chat core can be exercised against it in tests
//! and local development without network access.

pub mod backend;
pub mod conversations;
pub mod messages;
pub mod models;
pub mod users;

mod error;

pub use backend::{Backend, Snapshots, WriteFault};
pub use error::StoreError;
pub use models::*;
pub use users::PresenceUpdate;
