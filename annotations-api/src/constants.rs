//! Service-wide constants.

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 4008;

/// Active highlights a non-premium user may keep on one item.
pub const DEFAULT_BASIC_HIGHLIGHT_LIMIT: usize = 3;

/// Health check path polled by the federation gateway.
pub const HEALTH_PATH: &str = "/.well-known/apollo/server-health";

// ============================================================================
// REQUEST HEADERS
// ============================================================================

/// Numeric id of the calling user.
pub const USER_ID_HEADER: &str = "userid";

/// `"true"` when the calling user has a premium account.
pub const PREMIUM_HEADER: &str = "premium";

/// Id of the calling client application.
pub const API_ID_HEADER: &str = "apiid";

// ============================================================================
// RELATIONAL STORE
// ============================================================================

/// `user_annotations.status` of a live highlight.
pub const STATUS_ACTIVE: i16 = 1;

/// `user_annotations.status` of a soft-deleted highlight.
pub const STATUS_DELETED: i16 = 0;

/// `users_meta.property` touched on every highlight mutation.
pub const ACCOUNT_PROPERTY: i16 = 4;

/// `users_meta.value` timestamp layout.
pub const LEDGER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// MESSAGES
// ============================================================================

pub const PREMIUM_REQUIRED_MESSAGE: &str = "Premium account required to access this feature";
