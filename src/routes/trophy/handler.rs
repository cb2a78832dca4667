use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::AdminUser,
    models::{AuditAction, ReportEvent},
    routes::AppQuery,
    trophy::{ManualEntryInput, ResetTrigger},
    utils::secrets_match,
};

use super::model::{
    ArchivedMonthsResponse, AuditLogResponse, ManualEntryResponse, MonthlyResetResponse,
    RemoveEntryRequest, TrophiesResponse, TrophyQuery, UpdateRankingResponse, WebhookResponse,
};

const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

const READ_ACTIONS: &[&str] = &["current", "month", "archive", "audit"];
const WRITE_ACTIONS: &[&str] = &["update-ranking", "reset-monthly", "add", "remove"];

fn requested_action(query: &TrophyQuery, default: &str) -> String {
    query
        .action
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(default)
        .to_ascii_lowercase()
}

fn unknown_action(action: &str, allowed: &[&str], other: &[&str]) -> AppError {
    if other.contains(&action) {
        AppError::MethodNotAllowed
    } else {
        AppError::InvalidInput(format!(
            "Unknown action `{}`, expected one of: {}",
            action,
            allowed.join(", ")
        ))
    }
}

fn json_body<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid request body: {e}")))
}

/// `GET /admin/trophies?action=current|month|archive|audit`
#[axum::debug_handler]
pub async fn admin_read(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    AppQuery(query): AppQuery<TrophyQuery>,
) -> AppResult<Response> {
    let engine = &state.trophies;
    let action = requested_action(&query, "current");
    let response = match action.as_str() {
        "current" => {
            let month = engine.current_month();
            Json(TrophiesResponse {
                success: true,
                month,
                trophies: engine.month_entries(month).await?,
            })
            .into_response()
        }
        "month" => {
            let month = query
                .month()?
                .ok_or_else(|| AppError::InvalidInput("month=YYYY-MM is required".into()))?;
            Json(TrophiesResponse {
                success: true,
                month,
                trophies: engine.month_entries(month).await?,
            })
            .into_response()
        }
        "archive" => match query.month()? {
            Some(month) => Json(TrophiesResponse {
                success: true,
                month,
                trophies: engine.archived(month).await?,
            })
            .into_response(),
            None => Json(ArchivedMonthsResponse {
                success: true,
                months: engine.archived_months().await?,
            })
            .into_response(),
        },
        "audit" => Json(AuditLogResponse {
            success: true,
            entries: engine.audit_log(query.limit.unwrap_or(50)).await?,
        })
        .into_response(),
        other => return Err(unknown_action(other, READ_ACTIONS, WRITE_ACTIONS)),
    };
    Ok(response)
}

/// `POST /admin/trophies?action=update-ranking|reset-monthly|add|remove`
#[axum::debug_handler]
pub async fn admin_write(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppQuery(query): AppQuery<TrophyQuery>,
    body: Bytes,
) -> AppResult<Response> {
    let engine = &state.trophies;
    let actor = admin.email.as_str();
    let action = requested_action(&query, "");
    let response = match action.as_str() {
        "update-ranking" => {
            let month = query.month()?.unwrap_or_else(|| engine.current_month());
            let outcome = engine
                .recompute(month, AuditAction::ManualUpdate, actor)
                .await?;
            Json(UpdateRankingResponse {
                success: true,
                month: outcome.month,
                updated_entries: outcome.updated_entries,
                trophies: outcome.entries,
            })
            .into_response()
        }
        "reset-monthly" => {
            let outcome = engine.monthly_reset(actor, ResetTrigger::Manual).await?;
            Json(MonthlyResetResponse {
                success: true,
                archived_month: outcome.archived_month,
                archived_count: outcome.archived_count,
                month: outcome.month,
                new_count: outcome.new_count,
            })
            .into_response()
        }
        "add" => {
            let mut input: ManualEntryInput = json_body(&body)?;
            if input.month.is_none() {
                input.month = query.month()?;
            }
            let trophy = engine.add_manual(actor, input).await?;
            (
                StatusCode::CREATED,
                Json(ManualEntryResponse {
                    success: true,
                    trophy,
                }),
            )
                .into_response()
        }
        "remove" => {
            let req: RemoveEntryRequest = json_body(&body)?;
            let month = match req.month {
                Some(month) => month,
                None => query.month()?.unwrap_or_else(|| engine.current_month()),
            };
            engine.remove_manual(actor, month, req.position).await?;
            Json(serde_json::json!({ "success": true })).into_response()
        }
        other => return Err(unknown_action(other, WRITE_ACTIONS, READ_ACTIONS)),
    };
    Ok(response)
}

/// Public board: the current month, or a past month from its archive.
#[axum::debug_handler]
pub async fn public_trophies(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<TrophyQuery>,
) -> AppResult<Json<TrophiesResponse>> {
    let engine = &state.trophies;
    let current = engine.current_month();
    let month = query.month()?.unwrap_or(current);
    if month > current {
        return Err(AppError::InvalidInput("Month is in the future".into()));
    }

    let mut trophies = if month < current {
        engine.archived(month).await?
    } else {
        Vec::new()
    };
    if trophies.is_empty() {
        trophies = engine.month_entries(month).await?;
    }
    Ok(Json(TrophiesResponse {
        success: true,
        month,
        trophies,
    }))
}

/// Report lifecycle notifications from the report service.
///
/// The event is queued and acknowledged right away; ranking failures never
/// reach the caller.
#[axum::debug_handler]
pub async fn report_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<WebhookResponse>)> {
    let Some(expected) = state.config.trophy_webhook_secret.as_deref() else {
        tracing::warn!("Report webhook called but TROPHY_WEBHOOK_SECRET is not set");
        return Err(AppError::Forbidden);
    };
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(provided, expected) {
        tracing::warn!(target: "security", event = "webhook_rejected");
        return Err(AppError::Forbidden);
    }
    let event: ReportEvent = json_body(&body)?;

    let queued = state.events.publish(event);
    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookResponse {
            success: true,
            queued,
        }),
    ))
}
