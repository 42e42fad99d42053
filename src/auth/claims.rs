use serde::{Deserialize, Serialize};

/// JWT payload binding a user id as subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // user ID
    pub exp: i64,    // expires at (unix seconds), enforced
    pub iat: i64,    // issued at (unix seconds), audit only
}

/// Why a bearer token was rejected. Both surface as 401.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Missing bearer token")]
    Missing,
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}
