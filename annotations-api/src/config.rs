//! API Configuration Module
//!
//! Service settings, notes table layout, and batch retry tuning. Everything
//! is loaded from environment variables with defaults suited to local
//! development.

use std::time::Duration;

use annotations_storage::RetryPolicy;

use crate::constants::DEFAULT_BASIC_HIGHLIGHT_LIMIT;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Service-level configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Deployment environment ("production", "development", "test").
    pub environment: String,

    /// Active highlights per item allowed for non-premium users.
    pub basic_highlight_limit: usize,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            basic_highlight_limit: DEFAULT_BASIC_HIGHLIGHT_LIMIT,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ANNOTATIONS_ENVIRONMENT`: deployment environment (default: development)
    /// - `BASIC_HIGHLIGHT_LIMIT`: per-item highlight quota for non-premium users (default: 3)
    /// - `ANNOTATIONS_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `ANNOTATIONS_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `ANNOTATIONS_CORS_MAX_AGE_SECS`: preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        let environment = std::env::var("ANNOTATIONS_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string());

        let basic_highlight_limit = std::env::var("BASIC_HIGHLIGHT_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BASIC_HIGHLIGHT_LIMIT);

        let cors_origins = std::env::var("ANNOTATIONS_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("ANNOTATIONS_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let cors_max_age_secs = std::env::var("ANNOTATIONS_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(86400);

        Self {
            environment,
            basic_highlight_limit,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
        }
    }

    /// Whether this is a production deployment.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// The GraphiQL playground is served everywhere except production.
    pub fn graphiql_enabled(&self) -> bool {
        !self.is_production()
    }
}

// ============================================================================
// NOTES TABLE CONFIGURATION
// ============================================================================

/// Name and attribute layout of the notes table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesTableConfig {
    pub name: String,
    /// Partition key attribute (the highlight id).
    pub key: String,
    /// Note text attribute.
    pub note: String,
    pub created_at: String,
    pub updated_at: String,
    /// Owning user attribute, used for erasure.
    pub user_id: String,
}

impl Default for NotesTableConfig {
    fn default() -> Self {
        Self {
            name: "annotations_highlight_notes".to_string(),
            key: "highlightId".to_string(),
            note: "note".to_string(),
            created_at: "_createdAt".to_string(),
            updated_at: "_updatedAt".to_string(),
            user_id: "userId".to_string(),
        }
    }
}

impl NotesTableConfig {
    /// Environment variables: `HIGHLIGHT_NOTES_TABLE`, `HIGHLIGHT_NOTES_KEY`,
    /// `HIGHLIGHT_NOTES_NOTE`, `HIGHLIGHT_NOTES_CREATED_AT`,
    /// `HIGHLIGHT_NOTES_UPDATED_AT`, `HIGHLIGHT_NOTES_USER_ID`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str, default: String| std::env::var(name).unwrap_or(default);
        Self {
            name: var("HIGHLIGHT_NOTES_TABLE", defaults.name),
            key: var("HIGHLIGHT_NOTES_KEY", defaults.key),
            note: var("HIGHLIGHT_NOTES_NOTE", defaults.note),
            created_at: var("HIGHLIGHT_NOTES_CREATED_AT", defaults.created_at),
            updated_at: var("HIGHLIGHT_NOTES_UPDATED_AT", defaults.updated_at),
            user_id: var("HIGHLIGHT_NOTES_USER_ID", defaults.user_id),
        }
    }
}

// ============================================================================
// RETRY CONFIGURATION
// ============================================================================

/// Batch retry policy for the notes table.
///
/// Environment variables:
/// - `NOTES_RETRY_BASE_MS` (default: 100)
/// - `NOTES_RETRY_MAX_MS` (default: 3000)
/// - `NOTES_RETRY_MAX_ATTEMPTS` (default: 10)
pub fn retry_policy_from_env() -> RetryPolicy {
    let defaults = RetryPolicy::default();
    let millis = |name: &str| {
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
    };

    RetryPolicy::new()
        .with_base_delay(millis("NOTES_RETRY_BASE_MS").unwrap_or(defaults.base_delay))
        .with_max_delay(millis("NOTES_RETRY_MAX_MS").unwrap_or(defaults.max_delay))
        .with_max_attempts(
            std::env::var("NOTES_RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
        )
}
