use axum::{
    async_trait,
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{claims::TokenError, jwt::JwtKeys};
use crate::{error::AppError, state::AppState, users::repo_types::User};

/// The authenticated caller, loaded from the store by the token subject.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(TokenError::Missing)?;

        let token = bearer_token(header)
            .ok_or_else(|| AppError::Unauthenticated("invalid auth scheme".into()))?;

        let claims = JwtKeys::from_ref(state).verify(token).map_err(|e| {
            warn!(reason = %e, "bearer token rejected");
            e
        })?;

        let user = state
            .store
            .get_user_by_id(&claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token subject no longer exists");
                AppError::Unauthenticated("user not found".into())
            })?;

        Ok(CurrentUser(user))
    }
}

/// `Bearer <token>` with a case-insensitive scheme.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
}

/// `Json<T>` whose rejections (malformed body, unknown `type`) are 400s in
/// the API error shape.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}
