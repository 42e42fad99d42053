use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{info, instrument};

use super::{
    dto::{CreateTagRequest, TagCollection},
    repo_types::Tag,
};
use crate::{
    auth::extractors::{ApiJson, CurrentUser},
    error::AppResult,
    state::AppState,
};

pub fn tag_routes() -> Router<AppState> {
    Router::new().route("/tags", get(list_tags).post(create_tag))
}

/// Tags are shared vocabulary: any authenticated caller may add one and
/// duplicate names are accepted.
#[instrument(skip(state, caller, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiJson(payload): ApiJson<CreateTagRequest>,
) -> AppResult<(StatusCode, Json<Tag>)> {
    let tag = state.store.create_tag(&payload.name).await?;
    info!(tag_id = %tag.id, user_id = %caller.id, "tag created");
    Ok((StatusCode::CREATED, Json(tag)))
}

#[instrument(skip(state))]
pub async fn list_tags(State(state): State<AppState>) -> AppResult<Json<TagCollection>> {
    let tags = state.store.list_tags().await?;
    Ok(Json(TagCollection { tags }))
}
