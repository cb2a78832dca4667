use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Failures coming out of a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unique constraint violated: {0}")]
    Duplicate(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("email domain is not allowed")]
    DomainNotAllowed,
    #[error("{0}")]
    WeakPassword(String),
    #[error("{0}")]
    NotFound(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("email is already registered")]
    EmailTaken,
    #[error("{0}")]
    Conflict(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("insufficient privileges")]
    Forbidden,
    #[error("email not verified")]
    EmailNotVerified,
    #[error("too many attempts")]
    TooManyAttempts { retry_after_secs: u64 },
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::InvalidInput(format!("Invalid request body: {}", e.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::InvalidInput(format!("Invalid query string: {}", e.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'static str>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_)
            | AppError::DomainNotAllowed
            | AppError::WeakPassword(_)
            | AppError::InvalidToken
            | AppError::TokenExpired
            | AppError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::EmailTaken | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::EmailNotVerified => StatusCode::FORBIDDEN,
            AppError::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::DomainNotAllowed => "domain_not_allowed",
            AppError::WeakPassword(_) => "weak_password",
            AppError::NotFound(_) => "not_found",
            AppError::MethodNotAllowed => "method_not_allowed",
            AppError::EmailTaken => "email_taken",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthenticated => "unauthenticated",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::Forbidden => "forbidden",
            AppError::EmailNotVerified => "email_not_verified",
            AppError::TooManyAttempts { .. } => "too_many_attempts",
            AppError::InvalidToken => "invalid_token",
            AppError::TokenExpired => "token_expired",
            AppError::InvalidOrExpiredToken => "invalid_or_expired_token",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg)
            | AppError::WeakPassword(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::DomainNotAllowed => {
                "Registrations are only accepted from approved email providers".into()
            }
            AppError::MethodNotAllowed => "Method not allowed".into(),
            AppError::EmailTaken => "This email is already registered".into(),
            AppError::Unauthenticated => "Please log in to continue".into(),
            AppError::InvalidCredentials => "Invalid email or password".into(),
            AppError::Forbidden => "You do not have permission to do this".into(),
            AppError::EmailNotVerified => {
                "Please verify your email address before logging in".into()
            }
            AppError::TooManyAttempts { retry_after_secs } => format!(
                "Too many attempts, please try again in {} minutes",
                retry_after_secs.div_ceil(60).max(1)
            ),
            AppError::InvalidToken => "Invalid verification link".into(),
            AppError::TokenExpired => {
                "This link has expired, please request a new one".into()
            }
            AppError::InvalidOrExpiredToken => "Invalid or expired reset link".into(),
            AppError::Internal(_) => "Internal server error".into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Internal(detail) = &self {
            tracing::error!("internal error: {}", detail);
        }

        let redirect = matches!(self, AppError::Unauthenticated).then_some("/login");
        let body = Json(ErrorResponse {
            success: false,
            error: self.code(),
            message: self.public_message(),
            redirect,
        });

        let mut response = (status, body).into_response();
        if let AppError::TooManyAttempts { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_detail_never_reaches_the_message() {
        let err = AppError::Internal("relation \"users\" does not exist".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(AppError::EmailTaken.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::EmailNotVerified.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::TooManyAttempts { retry_after_secs: 60 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AppError::TokenExpired.status(), StatusCode::BAD_REQUEST);
    }
}
