use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    Building, ChecklistItem, CreateWorkRequestPayload, Document, Organization, Photo,
    RequestPriority, RequestReport, RequestStats, RequestStatus, StatusHistoryEntry,
    TransitionPayload, UpdateWorkRequestPayload, WorkRequest, WorkRequestDetail,
    WorkRequestWithRelations,
};
use crate::services::file_service::{
    validate_image_content_type, FileService, MAX_FILE_SIZE, MAX_PHOTOS_PER_REQUEST,
};
use crate::services::lifecycle_service;
use crate::services::query_service::{
    clamp_limit, compute_report, compute_stats, matches_search, normalize_axis,
    organization_scope,
};
use crate::services::ChangeEvent;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests))
        .route("/", post(create_request))
        .route("/stats", get(get_stats))
        .route("/reports", get(get_report))
        .route("/:id", get(get_request))
        .route("/:id", put(update_request))
        .route("/:id/status", put(transition_status))
}

#[derive(Debug, Deserialize)]
pub struct RequestsQuery {
    /// Statut, ou "all" pour ne pas filtrer
    pub status: Option<String>,
    /// Priorité, ou "all" pour ne pas filtrer
    pub priority: Option<String>,
    pub building_id: Option<Uuid>,
    /// Admin seulement: restreindre à une organisation
    pub organization_id: Option<Uuid>,
    pub search: Option<String>,
    pub date_from: Option<chrono::DateTime<chrono::Utc>>,
    pub date_to: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<i64>,
}

async fn load_relations(
    state: &AppState,
    requests: Vec<WorkRequest>,
) -> AppResult<Vec<WorkRequestWithRelations>> {
    let building_ids: Vec<Uuid> = requests.iter().filter_map(|r| r.building_id).collect();
    let organization_ids: Vec<Uuid> = requests.iter().filter_map(|r| r.organization_id).collect();

    let buildings: HashMap<Uuid, Building> =
        sqlx::query_as::<_, Building>("SELECT * FROM buildings WHERE id = ANY($1)")
            .bind(&building_ids)
            .fetch_all(&state.pool)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

    let organizations: HashMap<Uuid, Organization> =
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = ANY($1)")
            .bind(&organization_ids)
            .fetch_all(&state.pool)
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();

    Ok(requests
        .into_iter()
        .map(|request| {
            let building = request.building_id.and_then(|id| buildings.get(&id).cloned());
            let organization = request
                .organization_id
                .and_then(|id| organizations.get(&id).cloned());
            WorkRequestWithRelations {
                request,
                building,
                organization,
            }
        })
        .collect())
}

/// Liste des demandes de travaux. Les gestionnaires ne voient que leur
/// organisation; les admins voient tout et peuvent filtrer par
/// organisation. Les axes status/priority acceptent la sentinelle "all".
#[utoipa::path(
    get,
    path = "/api/v1/requests",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("status" = Option<String>, Query, description = "Filtre par statut, ou 'all'"),
        ("priority" = Option<String>, Query, description = "Filtre par priorité, ou 'all'"),
        ("search" = Option<String>, Query, description = "Recherche plein texte")
    ),
    responses(
        (status = 200, description = "Liste des demandes", body = Vec<WorkRequestWithRelations>),
        (status = 401, description = "Non authentifié")
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<RequestsQuery>,
) -> AppResult<Json<Vec<WorkRequestWithRelations>>> {
    let organization_filter = organization_scope(&auth_user, query.organization_id)?;

    let status = normalize_axis(query.status);
    let priority = normalize_axis(query.priority);
    let limit = clamp_limit(query.limit);

    let requests = sqlx::query_as::<_, WorkRequest>(
        r#"
        SELECT * FROM work_requests
        WHERE ($1::uuid IS NULL OR organization_id = $1)
          AND ($2::varchar IS NULL OR status::text = $2)
          AND ($3::varchar IS NULL OR priority::text = $3)
          AND ($4::uuid IS NULL OR building_id = $4)
          AND ($5::timestamptz IS NULL OR created_at >= $5)
          AND ($6::timestamptz IS NULL OR created_at <= $6)
        ORDER BY created_at DESC
        LIMIT $7
        "#,
    )
    .bind(organization_filter)
    .bind(&status)
    .bind(&priority)
    .bind(query.building_id)
    .bind(query.date_from)
    .bind(query.date_to)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    let mut rows = load_relations(&state, requests).await?;

    if let Some(search) = query.search.as_deref() {
        if !search.trim().is_empty() {
            rows.retain(|row| matches_search(row, search));
        }
    }

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Admin seulement: restreindre à une organisation
    pub organization_id: Option<Uuid>,
}

/// Agrégats par regroupement de statuts pour le tableau de bord.
pub async fn get_stats(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<RequestStats>> {
    let organization_filter = organization_scope(&auth_user, query.organization_id)?;

    let rows: Vec<(RequestStatus, RequestPriority)> = sqlx::query_as(
        r#"
        SELECT status, priority FROM work_requests
        WHERE ($1::uuid IS NULL OR organization_id = $1)
        "#,
    )
    .bind(organization_filter)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(compute_stats(&rows)))
}

/// Rapport d'activité: volumes par catégorie de travaux et par mois.
pub async fn get_report(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<RequestReport>> {
    let organization_filter = organization_scope(&auth_user, query.organization_id)?;

    let rows: Vec<(String, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
        r#"
        SELECT work_category, created_at FROM work_requests
        WHERE ($1::uuid IS NULL OR organization_id = $1)
        "#,
    )
    .bind(organization_filter)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(compute_report(&rows)))
}

async fn fetch_scoped_request(
    state: &AppState,
    auth_user: &AuthUser,
    id: Uuid,
) -> AppResult<WorkRequest> {
    let request = sqlx::query_as::<_, WorkRequest>("SELECT * FROM work_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Demande introuvable".to_string()))?;

    // L'existence d'une demande d'une autre organisation n'est pas révélée
    if !auth_user.is_admin() && request.organization_id != auth_user.organization_id {
        return Err(AppError::NotFound("Demande introuvable".to_string()));
    }

    Ok(request)
}

/// Détail complet d'une demande: relations, photos, documents,
/// historique de statuts et liste de tâches.
#[utoipa::path(
    get,
    path = "/api/v1/requests/{id}",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID de la demande")),
    responses(
        (status = 200, description = "Détail de la demande", body = WorkRequestDetail),
        (status = 404, description = "Demande introuvable")
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<WorkRequestDetail>> {
    let request = fetch_scoped_request(&state, &auth_user, id).await?;

    let building = match request.building_id {
        Some(building_id) => {
            sqlx::query_as::<_, Building>("SELECT * FROM buildings WHERE id = $1")
                .bind(building_id)
                .fetch_optional(&state.pool)
                .await?
        }
        None => None,
    };

    let organization = match request.organization_id {
        Some(organization_id) => {
            sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
                .bind(organization_id)
                .fetch_optional(&state.pool)
                .await?
        }
        None => None,
    };

    let photos = sqlx::query_as::<_, Photo>(
        "SELECT * FROM photos WHERE work_request_id = $1 ORDER BY created_at ASC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let documents = sqlx::query_as::<_, Document>(
        "SELECT * FROM documents WHERE work_request_id = $1 ORDER BY created_at ASC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let status_history = sqlx::query_as::<_, StatusHistoryEntry>(
        "SELECT * FROM status_history WHERE work_request_id = $1 ORDER BY created_at ASC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let checklist = sqlx::query_as::<_, ChecklistItem>(
        "SELECT * FROM checklist_items WHERE work_request_id = $1 ORDER BY item_order ASC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(WorkRequestDetail {
        request,
        building,
        organization,
        photos,
        documents,
        status_history,
        checklist,
    }))
}

/// Création d'une demande (multipart): partie "payload" en JSON, parties
/// "photos" optionnelles (max 5). Un échec de téléversement individuel
/// n'annule pas la création.
#[utoipa::path(
    post,
    path = "/api/v1/requests",
    tag = "requests",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Demande créée"),
        (status = 400, description = "Payload invalide"),
        (status = 403, description = "Réservé aux gestionnaires")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut payload: Option<CreateWorkRequestPayload> = None;
    let mut photos: Vec<(String, String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Formulaire invalide: {}", e)))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("payload") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Payload illisible: {}", e)))?;
                payload = Some(serde_json::from_str(&text).map_err(|e| {
                    AppError::BadRequest(format!("Payload invalide: {}", e))
                })?);
            }
            Some("photos") => {
                let file_name = field
                    .file_name()
                    .unwrap_or("photo.jpg")
                    .to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if !validate_image_content_type(&content_type) {
                    return Err(AppError::File(format!(
                        "Type de fichier non supporté: {}",
                        content_type
                    )));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::File(format!("Lecture du fichier échouée: {}", e)))?;
                if data.len() > MAX_FILE_SIZE {
                    return Err(AppError::File(
                        "Fichier trop volumineux (max 10MB)".to_string(),
                    ));
                }
                photos.push((file_name, content_type, data.to_vec()));
            }
            _ => {}
        }
    }

    let payload =
        payload.ok_or_else(|| AppError::BadRequest("Partie 'payload' manquante".to_string()))?;

    // Un gestionnaire crée toujours pour sa propre organisation; un admin
    // doit nommer l'organisation cible.
    let organization_id = if auth_user.is_admin() {
        payload.organization_id.ok_or_else(|| {
            AppError::BadRequest("organization_id est requis pour un admin".to_string())
        })?
    } else {
        auth_user.require_organization()?
    };

    if photos.len() as i64 > MAX_PHOTOS_PER_REQUEST {
        return Err(AppError::File("Maximum 5 photos par demande".to_string()));
    }

    let request = lifecycle_service::create_request(
        &state.pool,
        &state.realtime,
        &auth_user,
        organization_id,
        &payload,
    )
    .await?;

    let mut uploaded: Vec<Photo> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();

    if !photos.is_empty() {
        let file_service = FileService::new(&state.config).await?;
        for (file_name, content_type, data) in photos {
            let key = FileService::build_key(request.id, &file_name);
            let size = data.len() as i64;
            match file_service.upload(&key, &content_type, data).await {
                Ok(()) => {
                    let photo = sqlx::query_as::<_, Photo>(
                        r#"
                        INSERT INTO photos (work_request_id, uploaded_by, file_path, file_name, file_size, photo_type)
                        VALUES ($1, $2, $3, $4, $5, 'initial')
                        RETURNING *
                        "#,
                    )
                    .bind(request.id)
                    .bind(auth_user.account_id)
                    .bind(&key)
                    .bind(&file_name)
                    .bind(size)
                    .fetch_one(&state.pool)
                    .await?;
                    uploaded.push(photo);
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %request.id,
                        file_name = %file_name,
                        error = %e,
                        "Téléversement de photo échoué, fichier ignoré"
                    );
                    skipped.push(file_name);
                }
            }
        }
    }

    Ok(Json(json!({
        "success": true,
        "data": request,
        "photos": {
            "uploaded": uploaded,
            "skipped": skipped
        }
    })))
}

/// Mise à jour des champs descriptifs d'une demande par son gestionnaire
/// ou un admin. Le statut passe par la route dédiée.
pub async fn update_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateWorkRequestPayload>,
) -> AppResult<Json<Value>> {
    fetch_scoped_request(&state, &auth_user, id).await?;

    let units = lifecycle_service::validate_update_payload(&payload)?;

    let request = sqlx::query_as::<_, WorkRequest>(
        r#"
        UPDATE work_requests SET
            building_id = COALESCE($2, building_id),
            unit_numbers = COALESCE($3, unit_numbers),
            work_type = COALESCE($4, work_type),
            work_category = COALESCE($5, work_category),
            priority = COALESCE($6, priority),
            description = COALESCE($7, description),
            access_info = COALESCE($8, access_info),
            contact_email = COALESCE($9, contact_email),
            contact_phone = COALESCE($10, contact_phone),
            contact_sms = COALESCE($11, contact_sms),
            contact_portal = COALESCE($12, contact_portal),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.building_id)
    .bind(&units)
    .bind(payload.work_type.as_deref().map(str::trim))
    .bind(payload.work_category.as_deref().map(str::trim))
    .bind(payload.priority)
    .bind(payload.description.as_deref().map(str::trim))
    .bind(payload.access_info.as_deref())
    .bind(payload.contact_email)
    .bind(payload.contact_phone)
    .bind(payload.contact_sms)
    .bind(payload.contact_portal)
    .fetch_one(&state.pool)
    .await?;

    state
        .realtime
        .publish(ChangeEvent::RequestChanged { request_id: id });

    Ok(Json(json!({
        "success": true,
        "data": request
    })))
}

/// Changement de statut (admin). Écrit le nouveau statut, les coûts et
/// l'entrée d'historique dans une seule transaction.
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}/status",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID de la demande")),
    request_body = TransitionPayload,
    responses(
        (status = 200, description = "Statut mis à jour"),
        (status = 403, description = "Réservé aux admins"),
        (status = 404, description = "Demande introuvable")
    )
)]
pub async fn transition_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionPayload>,
) -> AppResult<Json<Value>> {
    let request =
        lifecycle_service::transition(&state.pool, &state.realtime, id, &auth_user, &payload)
            .await?;

    Ok(Json(json!({
        "success": true,
        "data": request
    })))
}
