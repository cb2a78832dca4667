use std::any::Any;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    AppState,
    error::AppError,
    middleware::{EndpointCategory, RateLimiter, log_errors, rate_limit},
};

pub mod admin;
pub mod auth;
pub mod trophy;

/// `Json` whose rejection is rendered like every other error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Query` whose rejection is rendered like every other error.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    status: &'static str,
    time: DateTime<Utc>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "ok",
        time: Utc::now(),
    })
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    AppError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Every route of the service, mounted under `api_base_uri`.
pub fn router(state: AppState) -> Router {
    let limiter = |category| RateLimiter::for_category(state.attempts.clone(), category, &state.config);

    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/verify-email", get(auth::verify_email))
        .route("/auth/resend-verification", post(auth::resend_verification))
        .layer(from_fn_with_state(limiter(EndpointCategory::Auth), rate_limit));

    let api_routes = Router::new()
        .route("/auth/session", get(auth::session))
        .route("/trophies", get(trophy::public_trophies))
        .route("/webhooks/reports", post(trophy::report_webhook))
        .layer(from_fn_with_state(limiter(EndpointCategory::Api), rate_limit));

    let admin_routes = Router::new()
        .route(
            "/admin/trophies",
            get(trophy::admin_read).post(trophy::admin_write),
        )
        .route("/admin/users/{id}/admin", post(admin::set_admin))
        .layer(from_fn_with_state(limiter(EndpointCategory::Admin), rate_limit));

    let api = Router::new()
        .route("/health", get(health))
        .merge(auth_routes)
        .merge(api_routes)
        .merge(admin_routes);

    let base = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(&base, api)
    };

    router
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(from_fn(log_errors)),
        )
        .with_state(state)
}
