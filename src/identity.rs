//! Caller identity
//!
//! Authentication happens upstream; the boundary forwards the caller's
//! stable id in a configured request header. Public share-token routes
//! never extract a principal.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// True when `owner_id` names this principal
    pub fn owns(&self, owner_id: Option<&str>) -> bool {
        owner_id == Some(self.user_id.as_str())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = state.config().identity.header.as_str();

        let user_id = parts
            .headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                AppError::Validation(format!("Missing credentials: '{}' header is required", header))
            })?;

        Ok(Principal::new(user_id))
    }
}
