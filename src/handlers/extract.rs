use crate::{errors::ApiError, services::cart::CartOwner};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Header carrying the authenticated user id, populated by the upstream
/// auth layer before requests reach this service.
const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the anonymous session id for guests.
const SESSION_ID_HEADER: &str = "x-session-id";

/// The authenticated user. Rejects the request when the auth layer did not
/// attach an identity.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id_from(parts)?.map(CurrentUser).ok_or(ApiError::Unauthorized)
    }
}

/// Cart identity: the authenticated user when present, otherwise the
/// anonymous session.
#[derive(Debug, Clone)]
pub struct CartIdentity(pub CartOwner);

#[async_trait]
impl<S> FromRequestParts<S> for CartIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = user_id_from(parts)? {
            return Ok(CartIdentity(CartOwner::User(user_id)));
        }

        if let Some(session) = parts.headers.get(SESSION_ID_HEADER) {
            let session = session.to_str().map_err(|_| ApiError::BadRequest {
                message: "Invalid session id header".to_string(),
            })?;
            if !session.is_empty() {
                return Ok(CartIdentity(CartOwner::Session(session.to_string())));
            }
        }

        Err(ApiError::BadRequest {
            message: "A user or session identity is required".to_string(),
        })
    }
}

fn user_id_from(parts: &Parts) -> Result<Option<Uuid>, ApiError> {
    let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let raw = raw.to_str().map_err(|_| ApiError::BadRequest {
        message: "Invalid user id header".to_string(),
    })?;
    let user_id = raw.parse::<Uuid>().map_err(|_| ApiError::BadRequest {
        message: "Invalid user id header".to_string(),
    })?;
    Ok(Some(user_id))
}
