use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::AppState;
use super::response::ApiError;
use crate::types::User;

/// Header set by the fronting authentication layer to the acting user's id.
pub const ACTOR_HEADER: &str = "x-forkwiki-user";

/// The acting user, if the request carries one.
pub struct MaybeActor(pub Option<User>);

/// Extractor that requires an acting user.
pub struct RequireActor(pub User);

impl FromRequestParts<Arc<AppState>> for MaybeActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(ACTOR_HEADER) else {
            return Ok(MaybeActor(None));
        };

        let user_id: i64 = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| ApiError::unauthorized("Invalid user header"))?;

        let user = state
            .store
            .get_user(user_id)?
            .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;

        Ok(MaybeActor(Some(user)))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match MaybeActor::from_request_parts(parts, state).await? {
            MaybeActor(Some(user)) => Ok(RequireActor(user)),
            MaybeActor(None) => Err(ApiError::unauthorized("Authentication required")),
        }
    }
}
