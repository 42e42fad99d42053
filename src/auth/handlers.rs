use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{AuthResponse, LoginRequest, SignupRequest},
    extractors::{ApiJson, CurrentUser},
    jwt::JwtKeys,
    services,
};
use crate::{error::AppResult, state::AppState, users::dto::PublicUser};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(signup))
        .route("/users/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let user = services::register(state.store.as_ref(), payload).await?;
    let token = JwtKeys::from_ref(&state).sign(&user.id)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = services::authenticate(state.store.as_ref(), payload).await?;
    let token = JwtKeys::from_ref(&state).sign(&user.id)?;
    Ok(Json(AuthResponse {
        user: user.into(),
        token,
    }))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}
