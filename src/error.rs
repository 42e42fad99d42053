//! Error taxonomy shared by every handler.
//!
//! Domain-rule failures are detected explicitly and mapped to a specific
//! variant; storage failures arrive as `anyhow::Error` and are reported as a
//! generic 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::{auth::claims::TokenError, store::UserWriteError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Tags {0:?} do not exist")]
    MissingTags(Vec<String>),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("owning user not found for resource {resource_id}")]
    OwnerNotFound { resource_id: String },

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::EmailTaken | Self::MissingTags(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials | Self::Unauthenticated(_) | Self::Token(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::OwnerNotFound { .. } => StatusCode::NOT_FOUND,
            Self::UnknownResourceType(_) | Self::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::MissingTags(_) => "MISSING_TAGS",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Token(TokenError::Expired) => "TOKEN_EXPIRED",
            Self::Token(_) => "INVALID_TOKEN",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) | Self::OwnerNotFound { .. } => "NOT_FOUND",
            Self::UnknownResourceType(_) | Self::Storage(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

impl From<UserWriteError> for AppError {
    fn from(err: UserWriteError) -> Self {
        match err {
            UserWriteError::EmailTaken => Self::EmailTaken,
            UserWriteError::Other(e) => Self::Storage(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = ?self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "detail": message,
            "code": self.error_code(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status() {
        assert_eq!(AppError::EmailTaken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::MissingTags(vec!["t".into()]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Token(TokenError::Expired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("nope".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::NotFound("User").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::UnknownResourceType("video".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_tags_message_names_ids() {
        let err = AppError::MissingTags(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), r#"Tags ["a", "b"] do not exist"#);
    }

    #[test]
    fn store_email_conflict_is_a_client_error() {
        let err = AppError::from(UserWriteError::EmailTaken);
        assert!(matches!(err, AppError::EmailTaken));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = AppError::from(UserWriteError::Other(anyhow::anyhow!("timeout")));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn server_errors_hide_detail() {
        let res = AppError::Storage(anyhow::anyhow!("connection refused to 10.0.0.1")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["detail"], "Internal server error");
        assert_eq!(body["code"], "INTERNAL_ERROR");
    }
}
