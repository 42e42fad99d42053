use tracing::{info, warn};

use super::{
    dto::UpdateUserRequest,
    repo_types::{User, UserPatch},
};
use crate::{
    auth::{password::hash_password, services::validate_email},
    error::{AppError, AppResult},
    store::Store,
};

pub async fn get_user(store: &dyn Store, id: &str) -> AppResult<User> {
    store
        .get_user_by_id(id)
        .await?
        .ok_or(AppError::NotFound("User"))
}

/// Merges the given fields into the stored profile. A changed email must be
/// well formed and not held by another user; a new password is re-hashed.
pub async fn update_user(store: &dyn Store, id: &str, req: UpdateUserRequest) -> AppResult<User> {
    let existing = get_user(store, id).await?;

    if let Some(email) = req.email.as_deref() {
        validate_email(email)?;
        if email != existing.email && store.get_user_by_email(email).await?.is_some() {
            warn!(user_id = %id, "email change to a registered address");
            return Err(AppError::EmailTaken);
        }
    }

    let password_hash = req.password.as_deref().map(hash_password).transpose()?;
    let patch = UserPatch {
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
        password_hash,
    };

    let user = store
        .update_user(id, patch)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    info!(user_id = %user.id, "user updated");
    Ok(user)
}

/// Hard delete. Resources owned by the user are left in place.
pub async fn delete_user(store: &dyn Store, id: &str) -> AppResult<()> {
    if !store.delete_user(id).await? {
        return Err(AppError::NotFound("User"));
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}
