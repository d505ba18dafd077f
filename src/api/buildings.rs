use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{Building, CreateBuildingRequest, UpdateBuildingRequest};
use crate::utils::validators::validate_postal_code;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_buildings))
        .route("/", post(create_building))
        .route("/:id", get(get_building))
        .route("/:id", put(update_building))
        .route("/:id", delete(delete_building))
}

/// Liste des immeubles de l'organisation courante. Les admins voient
/// tous les immeubles.
pub async fn list_buildings(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<Building>>> {
    let buildings = if auth_user.is_admin() {
        sqlx::query_as::<_, Building>("SELECT * FROM buildings ORDER BY address ASC")
            .fetch_all(&state.pool)
            .await?
    } else {
        let organization_id = auth_user.require_organization()?;
        sqlx::query_as::<_, Building>(
            "SELECT * FROM buildings WHERE organization_id = $1 ORDER BY address ASC",
        )
        .bind(organization_id)
        .fetch_all(&state.pool)
        .await?
    };

    Ok(Json(buildings))
}

pub async fn create_building(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateBuildingRequest>,
) -> AppResult<Json<Value>> {
    let organization_id = auth_user.require_organization()?;

    if payload.address.trim().is_empty() {
        return Err(AppError::BadRequest("L'adresse est requise".to_string()));
    }
    if let Some(postal_code) = payload.postal_code.as_deref() {
        if !validate_postal_code(postal_code) {
            return Err(AppError::Validation("Code postal invalide".to_string()));
        }
    }

    let building = sqlx::query_as::<_, Building>(
        r#"
        INSERT INTO buildings (organization_id, address, city, postal_code, unit_count, notes)
        VALUES ($1, $2, COALESCE($3, 'Montréal'), $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(organization_id)
    .bind(payload.address.trim())
    .bind(payload.city.as_deref())
    .bind(payload.postal_code.as_deref())
    .bind(payload.unit_count)
    .bind(payload.notes.as_deref())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(building_id = %building.id, "Immeuble créé");

    Ok(Json(json!({
        "success": true,
        "data": building
    })))
}

pub async fn get_building(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Building>> {
    let building = sqlx::query_as::<_, Building>("SELECT * FROM buildings WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Immeuble introuvable".to_string()))?;

    if !auth_user.is_admin() && Some(building.organization_id) != auth_user.organization_id {
        return Err(AppError::Forbidden);
    }

    Ok(Json(building))
}

pub async fn update_building(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBuildingRequest>,
) -> AppResult<Json<Value>> {
    let organization_id = auth_user.require_organization()?;

    if let Some(postal_code) = payload.postal_code.as_deref() {
        if !validate_postal_code(postal_code) {
            return Err(AppError::Validation("Code postal invalide".to_string()));
        }
    }

    let building = sqlx::query_as::<_, Building>(
        r#"
        UPDATE buildings SET
            address = COALESCE($3, address),
            city = COALESCE($4, city),
            postal_code = COALESCE($5, postal_code),
            unit_count = COALESCE($6, unit_count),
            notes = COALESCE($7, notes),
            updated_at = NOW()
        WHERE id = $1 AND organization_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(organization_id)
    .bind(payload.address.as_deref())
    .bind(payload.city.as_deref())
    .bind(payload.postal_code.as_deref())
    .bind(payload.unit_count)
    .bind(payload.notes.as_deref())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Immeuble introuvable".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": building
    })))
}

/// Suppression d'un immeuble. La contrainte FK sur work_requests est en
/// RESTRICT: un immeuble référencé par une demande renvoie un conflit.
pub async fn delete_building(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let organization_id = auth_user.require_organization()?;

    let result = sqlx::query("DELETE FROM buildings WHERE id = $1 AND organization_id = $2")
        .bind(id)
        .bind(organization_id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => {
            Err(AppError::NotFound("Immeuble introuvable".to_string()))
        }
        Ok(_) => Ok(Json(json!({ "success": true }))),
        Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
            Err(AppError::Conflict(
                "Impossible de supprimer un immeuble avec des demandes de travaux".to_string(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}
