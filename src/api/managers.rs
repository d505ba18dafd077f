use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{require_admin, AppState, AuthUser};
use crate::models::{
    Account, CreateManagerRequest, ManagerResponse, Organization, UpdateManagerRequest,
};
use crate::services::query_service::clamp_limit;
use crate::services::AuthService;
use crate::utils::validators::validate_email;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_managers))
        .route("/", post(create_manager))
        .route("/:id", get(get_manager))
        .route("/:id", put(update_manager))
}

#[derive(Debug, Deserialize)]
pub struct ManagersQuery {
    pub query: Option<String>,
    pub limit: Option<i64>,
}

/// Liste des gestionnaires avec leur compte
#[utoipa::path(
    get,
    path = "/api/v1/admin/managers",
    tag = "managers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Liste des gestionnaires", body = Vec<ManagerResponse>),
        (status = 403, description = "Réservé aux admins")
    )
)]
pub async fn list_managers(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ManagersQuery>,
) -> AppResult<Json<Vec<ManagerResponse>>> {
    require_admin(&auth_user)?;

    let limit = clamp_limit(query.limit);
    let search = query.query.as_ref().map(|q| format!("%{}%", q));

    let rows = sqlx::query_as::<_, (Uuid, Uuid, String, Option<String>, Option<String>, Option<String>, chrono::DateTime<chrono::Utc>, String, String)>(
        r#"
        SELECT o.id, o.account_id, o.company_name,
               o.contact_phone, o.address, o.notes, o.created_at,
               a.email, a.full_name
        FROM organizations o
        JOIN accounts a ON a.id = o.account_id
        WHERE ($1::varchar IS NULL OR o.company_name ILIKE $1 OR a.full_name ILIKE $1 OR a.email ILIKE $1)
        ORDER BY o.created_at DESC
        LIMIT $2
        "#,
    )
    .bind(&search)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    let response = rows
        .into_iter()
        .map(
            |(id, account_id, company_name, contact_phone, address, notes, created_at, email, full_name)| {
                ManagerResponse {
                    id,
                    account_id,
                    email,
                    full_name,
                    company_name,
                    contact_phone,
                    address,
                    notes,
                    created_at,
                }
            },
        )
        .collect();

    Ok(Json(response))
}

/// Provisionnement d'un gestionnaire: crée le compte (identifiants) et
/// son organisation dans une seule transaction.
#[utoipa::path(
    post,
    path = "/api/v1/admin/managers",
    tag = "managers",
    security(("bearer_auth" = [])),
    request_body = CreateManagerRequest,
    responses(
        (status = 200, description = "Gestionnaire créé"),
        (status = 400, description = "Champs requis manquants"),
        (status = 403, description = "Réservé aux admins"),
        (status = 409, description = "Courriel déjà utilisé")
    )
)]
pub async fn create_manager(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateManagerRequest>,
) -> AppResult<Json<Value>> {
    require_admin(&auth_user)?;

    if payload.full_name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.password.is_empty()
        || payload.company_name.trim().is_empty()
    {
        return Err(AppError::BadRequest("Champs requis manquants".to_string()));
    }
    if !validate_email(payload.email.trim()) {
        return Err(AppError::Validation("Courriel invalide".to_string()));
    }

    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM accounts WHERE email = $1")
        .bind(payload.email.trim())
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Courriel déjà utilisé".to_string()));
    }

    let password_hash = AuthService::hash_password(&payload.password)?;

    let mut tx = state.pool.begin().await?;

    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (email, password_hash, role, full_name, phone)
        VALUES ($1, $2, 'manager', $3, $4)
        RETURNING *
        "#,
    )
    .bind(payload.email.trim())
    .bind(&password_hash)
    .bind(payload.full_name.trim())
    .bind(payload.contact_phone.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    let organization = sqlx::query_as::<_, Organization>(
        r#"
        INSERT INTO organizations (account_id, company_name, contact_email, contact_phone, address, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(account.id)
    .bind(payload.company_name.trim())
    .bind(payload.email.trim())
    .bind(payload.contact_phone.as_deref())
    .bind(payload.address.as_deref())
    .bind(payload.notes.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        organization_id = %organization.id,
        account_id = %account.id,
        "Gestionnaire provisionné"
    );

    Ok(Json(json!({
        "success": true,
        "data": {
            "id": organization.id,
            "account_id": account.id,
            "email": account.email,
            "company_name": organization.company_name
        }
    })))
}

/// Détail d'un gestionnaire
pub async fn get_manager(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    require_admin(&auth_user)?;

    let organization = sqlx::query_as::<_, Organization>(
        "SELECT * FROM organizations WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Gestionnaire introuvable".to_string()))?;

    let account: (String, String, Option<String>) = sqlx::query_as(
        "SELECT email, full_name, phone FROM accounts WHERE id = $1",
    )
    .bind(organization.account_id)
    .fetch_one(&state.pool)
    .await?;

    let building_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM buildings WHERE organization_id = $1")
            .bind(id)
            .fetch_one(&state.pool)
            .await?;

    let request_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM work_requests WHERE organization_id = $1")
            .bind(id)
            .fetch_one(&state.pool)
            .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "organization": organization,
            "email": account.0,
            "full_name": account.1,
            "phone": account.2,
            "building_count": building_count.0,
            "request_count": request_count.0
        }
    })))
}

/// Mise à jour du compte et de l'organisation d'un gestionnaire
#[utoipa::path(
    put,
    path = "/api/v1/admin/managers/{id}",
    tag = "managers",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID de l'organisation")),
    request_body = UpdateManagerRequest,
    responses(
        (status = 200, description = "Gestionnaire mis à jour"),
        (status = 403, description = "Réservé aux admins"),
        (status = 404, description = "Gestionnaire introuvable")
    )
)]
pub async fn update_manager(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateManagerRequest>,
) -> AppResult<Json<Value>> {
    require_admin(&auth_user)?;

    if payload.full_name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.company_name.trim().is_empty()
    {
        return Err(AppError::BadRequest("Champs requis manquants".to_string()));
    }

    let account_id: (Uuid,) = sqlx::query_as("SELECT account_id FROM organizations WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Gestionnaire introuvable".to_string()))?;

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "UPDATE accounts SET full_name = $2, email = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(account_id.0)
    .bind(payload.full_name.trim())
    .bind(payload.email.trim())
    .execute(&mut *tx)
    .await?;

    let organization = sqlx::query_as::<_, Organization>(
        r#"
        UPDATE organizations SET
            company_name = $2,
            contact_email = $3,
            contact_phone = $4,
            address = $5,
            notes = $6,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.company_name.trim())
    .bind(payload.email.trim())
    .bind(payload.contact_phone.as_deref())
    .bind(payload.address.as_deref())
    .bind(payload.notes.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(json!({
        "success": true,
        "data": organization
    })))
}
