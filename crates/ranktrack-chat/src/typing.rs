//! Typing-indicator writes for one open conversation.
//!
//! The flag is shared state on the conversation document, so writes are
//! bounded: the first keystroke arms a short debounce, actual `true`
//! writes pass through a minimum-interval gate, and a keystroke-idle
//! window clears the flag. The feature is non-critical: every write
//! error is swallowed, and permission-denied in particular is expected
//! during sign-out races and logged at trace level only.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use tracing::{debug, trace};

use ranktrack_shared::time::Clock;
use ranktrack_shared::types::{ConversationId, UserId};
use ranktrack_store::{Backend, Conversation, StoreError};

use crate::config::ChatConfig;
use crate::throttle::{Debouncer, WriteGate};

pub struct TypingCoordinator {
    backend: Backend,
    clock: Arc<dyn Clock>,
    conversation_id: ConversationId,
    user_id: UserId,
    idle_window: chrono::Duration,
    debounce: Debouncer,
    gate: WriteGate,
    last_keystroke: Option<DateTime<Utc>>,
    draft_nonempty: bool,
    /// A `true` write is owed but was held back by the gate.
    pending_true: bool,
    /// Last flag value successfully written.
    flag_written: bool,
}

impl TypingCoordinator {
    pub fn new(
        backend: Backend,
        clock: Arc<dyn Clock>,
        config: &ChatConfig,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Self {
        Self {
            backend,
            clock,
            conversation_id,
            user_id,
            idle_window: config.typing_idle,
            debounce: Debouncer::new(config.typing_debounce),
            gate: WriteGate::new(config.typing_throttle),
            last_keystroke: None,
            draft_nonempty: false,
            pending_true: false,
            flag_written: false,
        }
    }

    /// The draft text changed. An empty draft clears the indicator right
    /// away; a non-empty one records the keystroke and, on the first
    /// keystroke of a burst, arms the debounce.
    pub async fn on_draft_changed(&mut self, draft: &str) {
        let now = self.clock.now();

        if draft.is_empty() {
            self.draft_nonempty = false;
            self.last_keystroke = None;
            self.pending_true = false;
            self.debounce.cancel();
            if self.flag_written {
                self.write_flag(false).await;
            }
            return;
        }

        self.draft_nonempty = true;
        self.last_keystroke = Some(now);
        if !self.flag_written && !self.pending_true {
            self.debounce.arm(now);
        }
    }

    /// Poll timers: fire the debounced write when the gate allows it, and
    /// clear the flag after the keystroke-idle window.
    pub async fn on_tick(&mut self) {
        let now = self.clock.now();

        let idle = match self.last_keystroke {
            Some(at) => now - at >= self.idle_window,
            None => true,
        };

        if self.draft_nonempty && idle {
            self.pending_true = false;
            self.debounce.cancel();
            if self.flag_written {
                self.write_flag(false).await;
            }
            return;
        }

        if self.debounce.fire_due(now) {
            self.pending_true = true;
        }
        if self.pending_true && !idle && self.gate.try_acquire(now) {
            self.write_flag(true).await;
            if self.flag_written {
                self.pending_true = false;
            }
        }
    }

    /// Best-effort clear on unmount or conversation switch.
    pub async fn shutdown(&mut self) {
        self.debounce.cancel();
        self.pending_true = false;
        self.draft_nonempty = false;
        self.last_keystroke = None;
        if self.flag_written {
            self.write_flag(false).await;
        }
    }

    /// Read side: whether any participant other than `me` is typing.
    pub fn peer_typing(conversation: &Conversation, me: UserId) -> bool {
        conversation.peer_typing(me)
    }

    async fn write_flag(&mut self, flag: bool) {
        match self
            .backend
            .set_typing(self.conversation_id, self.user_id, flag)
            .await
        {
            Ok(()) => {
                trace!(conversation = %self.conversation_id, flag, "typing flag written");
                self.flag_written = flag;
            }
            Err(StoreError::PermissionDenied) => {
                // Expected while a sign-out tears the session down.
                trace!(conversation = %self.conversation_id, "typing write denied (ignored)");
                self.flag_written = false;
            }
            Err(error) => {
                debug!(conversation = %self.conversation_id, %error, "typing write failed (ignored)");
                if !flag {
                    // Clearing is best-effort; do not retry.
                    self.flag_written = false;
                }
            }
        }
    }
}
