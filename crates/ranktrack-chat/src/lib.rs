//! # ranktrack-chat
//!
//! The chat/presence core of the RankTrack web client: presence tracking,
//! typing indicators, the optimistic send queue, chat head state machines,
//! and the roster that supervises them. Persistence and fan-out live in
//! the hosted backend, reached through `ranktrack-store`; this crate is a
//! pure state layer over that SDK.

pub mod config;
pub mod head;
pub mod pending;
pub mod presence;
pub mod roster;
pub mod session;
pub mod throttle;
pub mod typing;

mod error;

pub use config::ChatConfig;
pub use error::{ChatError, Result};
pub use head::{ChatHead, HeadMode, Overlay, Point, RenderItem, SearchState, Viewport};
pub use pending::{PendingMessage, PendingQueue, PendingStatus};
pub use presence::PresenceTracker;
pub use roster::ChatRosterManager;
pub use session::{ChatSession, SessionInfo};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise tracing for binaries embedding the chat core.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ranktrack_chat=debug,ranktrack_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
