use axum::{extract::FromRequestParts, http::HeaderMap, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::config::Config;
use crate::error::AppError;
use crate::models::User;

pub const SESSION_COOKIE: &str = "toloni_session";

fn cookie_header(value: &str, max_age: u64, config: &Config) -> String {
    let mut header = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, value, max_age
    );
    if config.cookie_secure {
        header.push_str("; Secure");
    }
    header
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(token: &str, config: &Config) -> String {
    cookie_header(token, config.session_ttl_secs, config)
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn expired_session_cookie(config: &Config) -> String {
    cookie_header("", 0, config)
}

pub fn session_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<Option<User>, AppError> {
    match session_token(&parts.headers) {
        Some(token) => state.auth.validate_session(&token).await,
        None => Ok(None),
    }
}

/// Any logged-in user. Rejects with 401 and a login redirect hint.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or(AppError::Unauthenticated)
    }
}

/// Logged-in admin. Non-admins get 403.
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(
                target: "security",
                event = "admin_access_denied",
                user_id = user.id,
                path = %parts.uri.path(),
            );
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

/// Session user if there is one. Never rejects.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match resolve(parts, state).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(e) => {
                tracing::warn!("Session lookup failed, treating caller as anonymous: {}", e);
                Ok(MaybeUser(None))
            }
        }
    }
}
