use tracing::{info, warn};

use super::{
    dto::{ResourceInput, ResourceView},
    materializer::{ensure_tags_exist, materialize, materialize_all},
    repo_types::ResourceRecord,
};
use crate::{
    error::{AppError, AppResult},
    store::Store,
    users::repo_types::User,
};

/// The caller becomes the owner. Nothing is written when a tag is missing.
pub async fn create_resource(
    store: &dyn Store,
    owner: &User,
    input: ResourceInput,
) -> AppResult<ResourceView> {
    ensure_tags_exist(store, &input.tag_ids).await?;
    let record = store
        .create_resource(input.into_new(owner.id.clone()))
        .await?;
    info!(resource_id = %record.id, user_id = %owner.id, kind = %record.kind, "resource created");
    materialize(store, record).await
}

pub async fn list_resources(store: &dyn Store) -> AppResult<Vec<ResourceView>> {
    let records = store.list_resources().await?;
    materialize_all(store, records).await
}

pub async fn list_resources_for_user(
    store: &dyn Store,
    user_id: &str,
) -> AppResult<Vec<ResourceView>> {
    if store.get_user_by_id(user_id).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }
    let records = store.get_resources_by_user_id(user_id).await?;
    materialize_all(store, records).await
}

pub async fn update_resource(
    store: &dyn Store,
    id: &str,
    caller: &User,
    input: ResourceInput,
) -> AppResult<ResourceView> {
    owned_resource(store, id, caller, "update").await?;
    ensure_tags_exist(store, &input.tag_ids).await?;

    let record = store
        .update_resource(id, input.into_patch())
        .await?
        .ok_or(AppError::NotFound("Resource"))?;
    info!(resource_id = %record.id, kind = %record.kind, "resource updated");
    materialize(store, record).await
}

pub async fn delete_resource(store: &dyn Store, id: &str, caller: &User) -> AppResult<()> {
    owned_resource(store, id, caller, "delete").await?;
    if !store.delete_resource(id).await? {
        return Err(AppError::NotFound("Resource"));
    }
    info!(resource_id = %id, "resource deleted");
    Ok(())
}

async fn owned_resource(
    store: &dyn Store,
    id: &str,
    caller: &User,
    action: &str,
) -> AppResult<ResourceRecord> {
    let record = store
        .get_resource_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Resource"))?;
    if record.user_id != caller.id {
        warn!(resource_id = %id, user_id = %caller.id, "non-owner mutation rejected");
        return Err(AppError::Forbidden(format!(
            "You can only {action} your own resources"
        )));
    }
    Ok(record)
}
