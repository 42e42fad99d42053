use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{PublicUser, UpdateUserRequest, UserCollection},
    services,
};
use crate::{
    auth::extractors::{ApiJson, CurrentUser},
    error::AppResult,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> AppResult<Json<UserCollection>> {
    let users = state.store.list_users().await?;
    Ok(Json(UserCollection {
        users: users.into_iter().map(PublicUser::from).collect(),
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    let user = services::get_user(state.store.as_ref(), &id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, _caller, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = services::update_user(state.store.as_ref(), &id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, _caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    services::delete_user(state.store.as_ref(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
