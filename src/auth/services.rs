use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    dto::{LoginRequest, SignupRequest},
    password::{hash_password, verify_password},
};
use crate::{
    error::{AppError, AppResult},
    store::Store,
    users::repo_types::{NewUser, User},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Rejects malformed addresses before anything touches the store.
pub(crate) fn validate_email(email: &str) -> AppResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        warn!(email = %email, "invalid email");
        Err(AppError::Validation("Invalid email address".into()))
    }
}

pub async fn register(store: &dyn Store, req: SignupRequest) -> AppResult<User> {
    validate_email(&req.email)?;

    if store.get_user_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::EmailTaken);
    }

    let password_hash = hash_password(&req.password)?;
    let user = store
        .create_user(NewUser {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// Unknown email and wrong password are indistinguishable to the caller.
/// A malformed email simply matches no user.
pub async fn authenticate(store: &dyn Store, req: LoginRequest) -> AppResult<User> {
    let Some(user) = store.get_user_by_email(&req.email).await? else {
        warn!("login for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user)
}
