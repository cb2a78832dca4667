use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState,
    error::AppResult,
    middleware::AdminUser,
    models::PublicUser,
    routes::AppJson,
};

use super::model::{SetAdminRequest, UserResponse};

/// `POST /admin/users/{id}/admin`
#[axum::debug_handler]
pub async fn set_admin(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    AppJson(req): AppJson<SetAdminRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state.auth.set_admin(&admin, user_id, req.is_admin).await?;
    Ok(Json(UserResponse {
        success: true,
        user: PublicUser::from(&user),
    }))
}
