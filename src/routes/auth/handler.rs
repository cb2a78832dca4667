use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    Json,
};

use crate::{
    AppState,
    auth::mailer::escape_html,
    error::{AppError, AppResult},
    middleware::{ClientIp, MaybeUser, expired_session_cookie, session_cookie, session_token},
    models::PublicUser,
    routes::{AppJson, AppQuery},
};

use super::model::{
    EmailRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, SessionResponse, VerifyEmailQuery,
};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<Json<RegisterResponse>> {
    let outcome = state
        .auth
        .register(&req.name, &req.email, &req.password)
        .await?;

    let message = if outcome.email_sent {
        "Account created. Check your inbox to confirm your email."
    } else {
        "Account created, but we could not send the confirmation email. Ask for a new one."
    };
    Ok(Json(RegisterResponse {
        success: true,
        message: message.into(),
        email_sent: outcome.email_sent,
    }))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<Response> {
    let outcome = state.auth.login(&req.email, &req.password, &ip).await?;
    let cookie = session_cookie(&outcome.token, &state.config);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            success: true,
            user: PublicUser::from(&outcome.user),
        }),
    )
        .into_response())
}

#[axum::debug_handler]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session_token(&headers) {
        state.auth.logout(&token).await?;
    }
    Ok((
        [(header::SET_COOKIE, expired_session_cookie(&state.config))],
        Json(MessageResponse::ok("Logged out")),
    )
        .into_response())
}

#[axum::debug_handler(state = AppState)]
pub async fn session(MaybeUser(user): MaybeUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        success: true,
        authenticated: user.is_some(),
        user: user.as_ref().map(PublicUser::from),
    })
}

#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(req): AppJson<EmailRequest>,
) -> Json<MessageResponse> {
    state.auth.forgot_password(&req.email).await;
    Json(MessageResponse::ok(
        "If an account exists for this email, a reset link is on its way.",
    ))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.reset_password(&req.token, &req.new_password).await?;
    Ok(Json(MessageResponse::ok(
        "Password updated. Please log in again.",
    )))
}

fn verification_page(config: &crate::config::Config, ok: bool, message: &str) -> Html<String> {
    let (title, link, label) = if ok {
        ("Email confirmed", format!("{}/login", config.app_base_url), "Log in")
    } else {
        (
            "Could not confirm email",
            format!("{}/resend-verification", config.app_base_url),
            "Send a new link",
        )
    };
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title} - Toloni Pescarias</title></head>\
         <body><h1>{title}</h1><p>{message}</p><p><a href=\"{link}\">{label}</a></p></body></html>"
    ))
}

/// Link target of the confirmation email. Browsers get a page, API clients
/// asking for `format=json` get the usual envelope.
#[axum::debug_handler]
pub async fn verify_email(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<VerifyEmailQuery>,
) -> Response {
    let token = query.token.as_deref().unwrap_or_default();
    let result = state.auth.verify_email(token).await;

    if query.wants_json() {
        return match result {
            Ok(_) => Json(MessageResponse::ok("Email confirmed")).into_response(),
            Err(e) => e.into_response(),
        };
    }

    match result {
        Ok(user) => verification_page(
            &state.config,
            true,
            &format!("Welcome, {}! Your account is active.", escape_html(&user.name)),
        )
        .into_response(),
        Err(e) => {
            let (status, message) = match e {
                AppError::TokenExpired => (
                    StatusCode::BAD_REQUEST,
                    "This confirmation link has expired.",
                ),
                AppError::Internal(detail) => {
                    tracing::error!("internal error: {}", detail);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Something went wrong, please try again later.",
                    )
                }
                _ => (
                    StatusCode::BAD_REQUEST,
                    "This confirmation link is invalid or was already used.",
                ),
            };
            (status, verification_page(&state.config, false, message)).into_response()
        }
    }
}

/// Same answer whether or not the address has a pending account.
#[axum::debug_handler]
pub async fn resend_verification(
    State(state): State<AppState>,
    AppJson(req): AppJson<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.resend_verification(&req.email).await?;
    Ok(Json(MessageResponse::ok(
        "If this email has a pending account, a new confirmation link is on its way.",
    )))
}
