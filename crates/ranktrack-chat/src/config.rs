//! Chat core configuration loaded from environment variables.
//!
//! All thresholds are product constants with sensible defaults, so the core
//! runs with zero configuration. None of them is an invariant: deployments
//! may tune every value.

use chrono::Duration;

use ranktrack_shared::constants::*;

/// Tunables for presence, typing, pagination, and head layout.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Idle time before an online user is marked away.
    /// Env: `RANKTRACK_IDLE_SECS`
    pub idle_threshold: Duration,

    /// Interval at which an online status is re-written to keep the remote
    /// last-activity fresh.
    /// Env: `RANKTRACK_HEARTBEAT_SECS`
    pub heartbeat_interval: Duration,

    /// Age of an "online" peer's last activity beyond which observers
    /// display (and may persist) offline instead.
    /// Env: `RANKTRACK_STALENESS_SECS`
    pub staleness_threshold: Duration,

    /// Delay between the first keystroke and the typing-flag write.
    /// Env: `RANKTRACK_TYPING_DEBOUNCE_MS`
    pub typing_debounce: Duration,

    /// Minimum interval between typing-flag writes.
    /// Env: `RANKTRACK_TYPING_THROTTLE_MS`
    pub typing_throttle: Duration,

    /// Keystroke-idle window after which the typing flag is cleared.
    /// Env: `RANKTRACK_TYPING_IDLE_MS`
    pub typing_idle: Duration,

    /// Retention window separating the live message tier from the cold
    /// (archived) tier. Applied when constructing the store backend.
    /// Env: `RANKTRACK_RETENTION_DAYS`
    pub retention: Duration,

    /// Live message window size per conversation subscription.
    /// Env: `RANKTRACK_SUBSCRIBE_LIMIT`
    pub subscribe_limit: usize,

    /// Page size for backward pagination and archived fetches.
    /// Env: `RANKTRACK_PAGE_SIZE`
    pub page_size: usize,

    /// Pointer displacement below which a press-release cycle counts as a
    /// click rather than a drag, in px.
    pub click_drag_threshold_px: f32,

    /// Chat head bubble size (square), in px.
    pub head_size_px: f32,

    /// Horizontal offset of stacked heads, in px.
    pub head_stack_x_px: f32,

    /// Vertical offset of the first stacked head, in px.
    pub head_stack_base_px: f32,

    /// Gap between stacked heads, in px.
    pub head_stack_gap_px: f32,

    /// Width of the sidebar strip reserved at the right viewport edge that
    /// heads must not cover, in px.
    pub sidebar_reserved_px: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::seconds(DEFAULT_IDLE_THRESHOLD_SECS),
            heartbeat_interval: Duration::seconds(DEFAULT_HEARTBEAT_SECS),
            staleness_threshold: Duration::seconds(DEFAULT_STALENESS_SECS),
            typing_debounce: Duration::milliseconds(DEFAULT_TYPING_DEBOUNCE_MS),
            typing_throttle: Duration::milliseconds(DEFAULT_TYPING_THROTTLE_MS),
            typing_idle: Duration::milliseconds(DEFAULT_TYPING_IDLE_MS),
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
            subscribe_limit: DEFAULT_SUBSCRIBE_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            click_drag_threshold_px: DEFAULT_CLICK_DRAG_THRESHOLD_PX,
            head_size_px: HEAD_SIZE_PX,
            head_stack_x_px: HEAD_STACK_X_PX,
            head_stack_base_px: HEAD_STACK_BASE_PX,
            head_stack_gap_px: HEAD_STACK_GAP_PX,
            sidebar_reserved_px: SIDEBAR_RESERVED_PX,
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_i64("RANKTRACK_IDLE_SECS") {
            config.idle_threshold = Duration::seconds(secs);
        }
        if let Some(secs) = env_i64("RANKTRACK_HEARTBEAT_SECS") {
            config.heartbeat_interval = Duration::seconds(secs);
        }
        if let Some(secs) = env_i64("RANKTRACK_STALENESS_SECS") {
            config.staleness_threshold = Duration::seconds(secs);
        }
        if let Some(ms) = env_i64("RANKTRACK_TYPING_DEBOUNCE_MS") {
            config.typing_debounce = Duration::milliseconds(ms);
        }
        if let Some(ms) = env_i64("RANKTRACK_TYPING_THROTTLE_MS") {
            config.typing_throttle = Duration::milliseconds(ms);
        }
        if let Some(ms) = env_i64("RANKTRACK_TYPING_IDLE_MS") {
            config.typing_idle = Duration::milliseconds(ms);
        }
        if let Some(days) = env_i64("RANKTRACK_RETENTION_DAYS") {
            config.retention = Duration::days(days);
        }
        if let Some(n) = env_i64("RANKTRACK_SUBSCRIBE_LIMIT") {
            config.subscribe_limit = n.max(1) as usize;
        }
        if let Some(n) = env_i64("RANKTRACK_PAGE_SIZE") {
            config.page_size = n.max(1) as usize;
        }

        config
    }
}

fn env_i64(name: &str) -> Option<i64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<i64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!(var = name, value = %raw, "invalid value, using default");
            None
        }
    }
}
