use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ResourceCollection, ResourceInput, ResourceView},
    services,
};
use crate::{
    auth::extractors::{ApiJson, CurrentUser},
    error::AppResult,
    state::AppState,
};

pub fn resource_routes() -> Router<AppState> {
    Router::new()
        .route("/resources", get(list_resources).post(create_resource))
        .route("/resources/user/:id", get(list_user_resources))
        .route(
            "/resources/:id",
            put(update_resource).delete(delete_resource),
        )
}

#[instrument(skip(state, caller, payload))]
pub async fn create_resource(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiJson(payload): ApiJson<ResourceInput>,
) -> AppResult<(StatusCode, Json<ResourceView>)> {
    let view = services::create_resource(state.store.as_ref(), &caller, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip_all)]
pub async fn list_resources(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> AppResult<Json<ResourceCollection>> {
    let resources = services::list_resources(state.store.as_ref()).await?;
    Ok(Json(ResourceCollection { resources }))
}

#[instrument(skip(state, _caller))]
pub async fn list_user_resources(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<ResourceCollection>> {
    let resources = services::list_resources_for_user(state.store.as_ref(), &id).await?;
    Ok(Json(ResourceCollection { resources }))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_resource(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<ResourceInput>,
) -> AppResult<Json<ResourceView>> {
    let view = services::update_resource(state.store.as_ref(), &id, &caller, payload).await?;
    Ok(Json(view))
}

#[instrument(skip(state, caller))]
pub async fn delete_resource(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    services::delete_resource(state.store.as_ref(), &id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}
