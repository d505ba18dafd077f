use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{Message, MessageResponse, SendMessageRequest, SenderType};
use crate::services::ChangeEvent;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_messages))
        .route("/", post(send_message))
        .route("/read", post(mark_read))
}

async fn check_request_access(
    state: &AppState,
    auth_user: &AuthUser,
    request_id: Uuid,
) -> AppResult<()> {
    let row: Option<(Option<Uuid>,)> =
        sqlx::query_as("SELECT organization_id FROM work_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&state.pool)
            .await?;

    let organization_id = row
        .ok_or_else(|| AppError::NotFound("Demande introuvable".to_string()))?
        .0;

    if !auth_user.is_admin() && organization_id != auth_user.organization_id {
        return Err(AppError::Forbidden);
    }

    Ok(())
}

/// Fil de messages d'une demande, du plus ancien au plus récent.
#[utoipa::path(
    get,
    path = "/api/v1/requests/{request_id}/messages",
    tag = "messages",
    security(("bearer_auth" = [])),
    params(("request_id" = Uuid, Path, description = "ID de la demande")),
    responses(
        (status = 200, description = "Messages de la demande", body = Vec<MessageResponse>),
        (status = 404, description = "Demande introuvable")
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Vec<MessageResponse>>> {
    check_request_access(&state, &auth_user, request_id).await?;

    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE work_request_id = $1 ORDER BY created_at ASC",
    )
    .bind(request_id)
    .fetch_all(&state.pool)
    .await?;

    let sender_ids: Vec<Uuid> = messages.iter().filter_map(|m| m.sender_id).collect();
    let names: std::collections::HashMap<Uuid, String> =
        sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, full_name FROM accounts WHERE id = ANY($1)",
        )
        .bind(&sender_ids)
        .fetch_all(&state.pool)
        .await?
        .into_iter()
        .collect();

    let response = messages
        .into_iter()
        .map(|message| {
            let sender_name = message.sender_id.and_then(|id| names.get(&id).cloned());
            MessageResponse {
                message,
                sender_name,
            }
        })
        .collect();

    Ok(Json(response))
}

/// Ajout d'un message au fil. Le type d'expéditeur est dérivé du rôle du
/// compte, jamais du payload.
#[utoipa::path(
    post,
    path = "/api/v1/requests/{request_id}/messages",
    tag = "messages",
    security(("bearer_auth" = [])),
    params(("request_id" = Uuid, Path, description = "ID de la demande")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message envoyé"),
        (status = 400, description = "Message vide"),
        (status = 404, description = "Demande introuvable")
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<Json<Value>> {
    check_request_access(&state, &auth_user, request_id).await?;

    if payload.body.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Le message ne peut pas être vide".to_string(),
        ));
    }

    let sender_type = if auth_user.is_admin() {
        SenderType::Admin
    } else {
        SenderType::Manager
    };

    let message = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (work_request_id, sender_id, sender_type, body)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(request_id)
    .bind(auth_user.account_id)
    .bind(sender_type)
    .bind(payload.body.trim())
    .fetch_one(&state.pool)
    .await?;

    state.realtime.publish(ChangeEvent::MessageInserted {
        request_id,
        message_id: message.id,
    });

    Ok(Json(json!({
        "success": true,
        "data": message
    })))
}

/// Marque comme lus les messages de l'autre partie.
pub async fn mark_read(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    check_request_access(&state, &auth_user, request_id).await?;

    let own_type = if auth_user.is_admin() {
        SenderType::Admin
    } else {
        SenderType::Manager
    };

    let result = sqlx::query(
        r#"
        UPDATE messages SET read = TRUE
        WHERE work_request_id = $1 AND sender_type <> $2 AND read = FALSE
        "#,
    )
    .bind(request_id)
    .bind(own_type)
    .execute(&state.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "marked": result.rows_affected()
    })))
}
