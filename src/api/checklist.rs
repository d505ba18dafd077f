use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{AddChecklistItemRequest, ChecklistItem};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items))
        .route("/", post(add_item))
        .route("/:item_id", delete(remove_item))
        .route("/:item_id/toggle", put(toggle_item))
}

/// Composition de la liste (ajout/retrait): gestionnaire propriétaire de
/// la demande. Le pointage revient aux admins.
fn can_compose(auth_user: &AuthUser) -> bool {
    !auth_user.is_admin() && auth_user.organization_id.is_some()
}

fn can_toggle(auth_user: &AuthUser) -> bool {
    auth_user.is_admin()
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

pub async fn list_items(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Vec<ChecklistItem>>> {
    check_request_access(&state, &auth_user, request_id).await?;

    let items = sqlx::query_as::<_, ChecklistItem>(
        "SELECT * FROM checklist_items WHERE work_request_id = $1 ORDER BY item_order ASC, created_at ASC",
    )
    .bind(request_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(items))
}

pub async fn add_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<AddChecklistItemRequest>,
) -> AppResult<Json<Value>> {
    if !can_compose(&auth_user) {
        return Err(AppError::Forbidden);
    }
    check_request_access(&state, &auth_user, request_id).await?;

    if payload.description.trim().is_empty() {
        return Err(AppError::BadRequest(
            "La description est requise".to_string(),
        ));
    }

    // Rang = nombre d'éléments existants. Les trous laissés par des
    // suppressions ne sont pas comblés.
    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM checklist_items WHERE work_request_id = $1")
            .bind(request_id)
            .fetch_one(&state.pool)
            .await?;

    let item = sqlx::query_as::<_, ChecklistItem>(
        r#"
        INSERT INTO checklist_items (work_request_id, description, item_order)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(request_id)
    .bind(payload.description.trim())
    .bind(count.0 as i32)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": item
    })))
}

pub async fn remove_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((request_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    if !can_compose(&auth_user) {
        return Err(AppError::Forbidden);
    }
    check_request_access(&state, &auth_user, request_id).await?;

    let result =
        sqlx::query("DELETE FROM checklist_items WHERE id = $1 AND work_request_id = $2")
            .bind(item_id)
            .bind(request_id)
            .execute(&state.pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Tâche introuvable".to_string()));
    }

    Ok(Json(json!({ "success": true })))
}

/// Bascule l'état d'une tâche. Pose ou efface completed_at/completed_by
/// selon le nouvel état.
pub async fn toggle_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((request_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    if !can_toggle(&auth_user) {
        return Err(AppError::Forbidden);
    }

    let item = sqlx::query_as::<_, ChecklistItem>(
        r#"
        UPDATE checklist_items SET
            is_completed = NOT is_completed,
            completed_at = CASE WHEN is_completed THEN NULL ELSE NOW() END,
            completed_by = CASE WHEN is_completed THEN NULL ELSE $3 END,
            updated_at = NOW()
        WHERE id = $1 AND work_request_id = $2
        RETURNING *
        "#,
    )
    .bind(item_id)
    .bind(request_id)
    .bind(auth_user.account_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Tâche introuvable".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": item
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountRole;

    fn manager() -> AuthUser {
        AuthUser {
            account_id: Uuid::new_v4(),
            role: AccountRole::Manager,
            organization_id: Some(Uuid::new_v4()),
        }
    }

    fn admin() -> AuthUser {
        AuthUser {
            account_id: Uuid::new_v4(),
            role: AccountRole::Admin,
            organization_id: None,
        }
    }

    #[test]
    fn manager_composes_but_does_not_toggle() {
        let user = manager();
        assert!(can_compose(&user));
        assert!(!can_toggle(&user));
    }

    #[test]
    fn admin_toggles_but_does_not_compose() {
        let user = admin();
        assert!(!can_compose(&user));
        assert!(can_toggle(&user));
    }
}
