//! Request Context
//!
//! Built once per GraphQL request from the gateway-supplied headers. It holds
//! the caller identity (or the reason there is none), the shared store
//! handles, and the request's note loader. Capability checks are explicit
//! `ApiResult` accessors; nothing touches a store before they pass.

use axum::http::HeaderMap;

use crate::constants::{API_ID_HEADER, PREMIUM_HEADER, PREMIUM_REQUIRED_MESSAGE, USER_ID_HEADER};
use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::loader::NotesLoader;
use crate::repositories::{HighlightRepository, NoteRepository, NotesTable};

// ============================================================================
// IDENTITY
// ============================================================================

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub is_premium: bool,
    /// Calling client application, when the gateway forwards one.
    pub api_id: Option<String>,
}

impl Identity {
    pub fn new(user_id: i64, is_premium: bool) -> Self {
        Self {
            user_id,
            is_premium,
            api_id: None,
        }
    }

    /// Identity for background work on behalf of a user.
    pub fn service(user_id: i64, is_premium: bool) -> Self {
        Self {
            user_id,
            is_premium,
            api_id: Some("service".to_string()),
        }
    }

    /// Parse `userid`, `premium` and `apiid`. A missing or non-numeric user
    /// id is Unauthenticated; a missing premium flag means non-premium.
    pub fn from_headers(headers: &HeaderMap) -> ApiResult<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .and_then(|value| value.parse::<i64>().ok())
            .ok_or_else(ApiError::unauthenticated)?;
        let is_premium = header(PREMIUM_HEADER)
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let api_id = header(API_ID_HEADER).map(str::to_string);

        Ok(Self {
            user_id,
            is_premium,
            api_id,
        })
    }

    /// Forbidden unless the caller has a premium account.
    pub fn require_premium(&self) -> ApiResult<()> {
        if self.is_premium {
            Ok(())
        } else {
            Err(ApiError::forbidden(PREMIUM_REQUIRED_MESSAGE))
        }
    }
}

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

/// Per-request bindings handed to resolvers.
pub struct RequestContext {
    identity: ApiResult<Identity>,
    db: DbClient,
    notes: NotesTable,
    highlight_limit: usize,
    notes_loader: ApiResult<NotesLoader>,
}

impl RequestContext {
    pub fn new(
        identity: ApiResult<Identity>,
        db: DbClient,
        notes: NotesTable,
        highlight_limit: usize,
    ) -> Self {
        let notes_loader = identity
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|identity| NoteRepository::new(notes.clone(), identity))
            .map(NotesLoader::new);

        Self {
            identity,
            db,
            notes,
            highlight_limit,
            notes_loader,
        }
    }

    pub fn from_headers(
        headers: &HeaderMap,
        db: DbClient,
        notes: NotesTable,
        highlight_limit: usize,
    ) -> Self {
        Self::new(Identity::from_headers(headers), db, notes, highlight_limit)
    }

    /// The caller, or Unauthenticated.
    pub fn identity(&self) -> ApiResult<&Identity> {
        self.identity.as_ref().map_err(Clone::clone)
    }

    /// Highlight access for the caller.
    pub fn highlights(&self) -> ApiResult<HighlightRepository> {
        let identity = self.identity()?;
        Ok(HighlightRepository::new(
            self.db.clone(),
            identity.clone(),
            self.highlight_limit,
        ))
    }

    /// Note access for the caller. Forbidden for non-premium callers.
    pub fn notes(&self) -> ApiResult<NoteRepository> {
        NoteRepository::new(self.notes.clone(), self.identity()?)
    }

    /// The request's note loader. Same errors as `notes()`.
    pub fn notes_loader(&self) -> ApiResult<&NotesLoader> {
        self.notes_loader.as_ref().map_err(Clone::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_identity_from_headers() -> ApiResult<()> {
        let identity = Identity::from_headers(&headers(&[
            ("userid", "42"),
            ("premium", "true"),
            ("apiid", "web"),
        ]))?;
        assert_eq!(identity.user_id, 42);
        assert!(identity.is_premium);
        assert_eq!(identity.api_id.as_deref(), Some("web"));
        Ok(())
    }

    #[test]
    fn test_missing_premium_header_is_non_premium() -> ApiResult<()> {
        let identity = Identity::from_headers(&headers(&[("userid", "7")]))?;
        assert!(!identity.is_premium);
        assert_eq!(
            identity.require_premium().err().map(|e| e.code),
            Some(ErrorCode::Forbidden)
        );
        Ok(())
    }

    #[test]
    fn test_missing_or_invalid_user_id_is_unauthenticated() {
        for map in [headers(&[]), headers(&[("userid", "abc")]), headers(&[("userid", " ")])] {
            let code = Identity::from_headers(&map).err().map(|e| e.code);
            assert_eq!(code, Some(ErrorCode::Unauthenticated));
        }
    }
}
