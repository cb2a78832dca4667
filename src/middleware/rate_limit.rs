use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::store::AttemptStore;
use crate::utils::client_ip;

/// Caller address, read from the proxy headers only when they are trusted.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(
            &parts.headers,
            parts.extensions.get::<ConnectInfo<SocketAddr>>(),
            state.config.trust_proxy_headers,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointCategory {
    Auth,
    Api,
    Admin,
}

impl EndpointCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointCategory::Auth => "auth",
            EndpointCategory::Api => "api",
            EndpointCategory::Admin => "admin",
        }
    }
}

/// Fixed-window request budget per client IP for one endpoint category.
#[derive(Clone)]
pub struct RateLimiter {
    attempts: Arc<dyn AttemptStore>,
    category: EndpointCategory,
    max_requests: u32,
    window: Duration,
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        category: EndpointCategory,
        max_requests: u32,
        window: Duration,
    ) -> Self {
        Self {
            attempts,
            category,
            max_requests,
            window,
            trust_proxy: false,
        }
    }

    pub fn for_category(
        attempts: Arc<dyn AttemptStore>,
        category: EndpointCategory,
        config: &Config,
    ) -> Self {
        let max_requests = match category {
            EndpointCategory::Auth => config.auth_rate_limit_requests,
            EndpointCategory::Api => config.rate_limit_requests,
            EndpointCategory::Admin => config.admin_rate_limit_requests,
        };
        Self {
            trust_proxy: config.trust_proxy_headers,
            ..Self::new(attempts, category, max_requests, config.rate_limit_window())
        }
    }

    /// Count one request from `ip` and refuse it once the budget is spent.
    pub async fn check(&self, ip: &str) -> AppResult<()> {
        let key = format!("{}:{}", self.category.as_str(), ip);
        let state = self.attempts.hit(&key, self.window).await?;
        if state.count > u64::from(self.max_requests) {
            tracing::warn!(
                target: "security",
                event = "rate_limited",
                category = self.category.as_str(),
                ip = %ip,
                count = state.count,
            );
            return Err(AppError::TooManyAttempts {
                retry_after_secs: state.resets_in_secs,
            });
        }
        Ok(())
    }
}

pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(
        req.headers(),
        req.extensions().get::<ConnectInfo<SocketAddr>>(),
        limiter.trust_proxy,
    );
    limiter.check(&ip).await?;
    Ok(next.run(req).await)
}
