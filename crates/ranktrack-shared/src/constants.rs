/// Application name
pub const APP_NAME: &str = "RankTrack";

/// Idle time before an online user is marked away, in seconds
pub const DEFAULT_IDLE_THRESHOLD_SECS: i64 = 5 * 60;

/// Presence heartbeat interval, in seconds
pub const DEFAULT_HEARTBEAT_SECS: i64 = 60;

/// Age of an "online" user's last activity beyond which observers may
/// downgrade them to offline, in seconds
pub const DEFAULT_STALENESS_SECS: i64 = 10 * 60;

/// Delay after the first keystroke before the typing flag is written, in ms
pub const DEFAULT_TYPING_DEBOUNCE_MS: i64 = 500;

/// Minimum interval between two typing-flag writes, in ms
pub const DEFAULT_TYPING_THROTTLE_MS: i64 = 3_000;

/// Keystroke-idle window after which the typing flag is cleared, in ms
pub const DEFAULT_TYPING_IDLE_MS: i64 = 2_000;

/// Messages older than this move to the cold (archived) read path, in days
pub const DEFAULT_RETENTION_DAYS: i64 = 15;

/// Live message window size per conversation subscription
pub const DEFAULT_SUBSCRIBE_LIMIT: usize = 50;

/// Page size for backward pagination
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Pointer displacement (px) below which a press-release counts as a click
pub const DEFAULT_CLICK_DRAG_THRESHOLD_PX: f32 = 6.0;

/// Chat head bubble size in px (square)
pub const HEAD_SIZE_PX: f32 = 56.0;

/// Horizontal offset of stacked heads from the left viewport edge, in px
pub const HEAD_STACK_X_PX: f32 = 16.0;

/// Vertical offset of the first stacked head, in px
pub const HEAD_STACK_BASE_PX: f32 = 96.0;

/// Gap between stacked heads, in px
pub const HEAD_STACK_GAP_PX: f32 = 16.0;

/// Width of the sidebar strip reserved at the right viewport edge, in px
pub const SIDEBAR_RESERVED_PX: f32 = 240.0;
