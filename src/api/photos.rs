use axum::{
    extract::{Multipart, Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{Document, DocumentType, Photo, PhotoType, PhotoUploadResponse};
use crate::services::file_service::{
    validate_document_content_type, validate_image_content_type, FileService, MAX_FILE_SIZE,
    MAX_PHOTOS_PER_REQUEST,
};

pub fn photo_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_photos))
        .route("/", post(upload_photos))
        .route("/:photo_id", delete(delete_photo))
}

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_documents))
        .route("/", post(upload_document))
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

fn parse_photo_type(raw: &str) -> PhotoType {
    match raw {
        "progress" => PhotoType::Progress,
        "completion" => PhotoType::Completion,
        _ => PhotoType::Initial,
    }
}

fn parse_document_type(raw: &str) -> DocumentType {
    match raw {
        "quote" => DocumentType::Quote,
        "invoice" => DocumentType::Invoice,
        "contract" => DocumentType::Contract,
        _ => DocumentType::Other,
    }
}

pub async fn list_photos(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    check_request_access(&state, &auth_user, request_id).await?;

    let photos = sqlx::query_as::<_, Photo>(
        "SELECT * FROM photos WHERE work_request_id = $1 ORDER BY created_at ASC",
    )
    .bind(request_id)
    .fetch_all(&state.pool)
    .await?;

    let file_service = FileService::new(&state.config).await?;
    let with_urls: Vec<Value> = photos
        .into_iter()
        .map(|photo| {
            let url = file_service.public_url(&photo.file_path);
            json!({ "photo": photo, "url": url })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": with_urls
    })))
}

/// Téléversement de photos après création. Le plafond de 5 photos par
/// demande s'applique au total, pas à l'envoi.
pub async fn upload_photos(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<PhotoUploadResponse>> {
    check_request_access(&state, &auth_user, request_id).await?;

    let mut photo_type = PhotoType::Initial;
    let mut caption: Option<String> = None;
    let mut files: Vec<(String, String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Formulaire invalide: {}", e)))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("photo_type") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Champ illisible: {}", e)))?;
                photo_type = parse_photo_type(text.trim());
            }
            Some("caption") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Champ illisible: {}", e)))?;
                if !text.trim().is_empty() {
                    caption = Some(text.trim().to_string());
                }
            }
            Some("photos") | Some("photo") => {
                let file_name = field.file_name().unwrap_or("photo.jpg").to_string();
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
                files.push((file_name, content_type, data.to_vec()));
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("Aucune photo fournie".to_string()));
    }

    let existing: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM photos WHERE work_request_id = $1")
            .bind(request_id)
            .fetch_one(&state.pool)
            .await?;

    if existing.0 + files.len() as i64 > MAX_PHOTOS_PER_REQUEST {
        return Err(AppError::File("Maximum 5 photos par demande".to_string()));
    }

    let file_service = FileService::new(&state.config).await?;
    let mut uploaded: Vec<Photo> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();

    for (file_name, content_type, data) in files {
        let key = FileService::build_key(request_id, &file_name);
        let size = data.len() as i64;
        match file_service.upload(&key, &content_type, data).await {
            Ok(()) => {
                let photo = sqlx::query_as::<_, Photo>(
                    r#"
                    INSERT INTO photos (work_request_id, uploaded_by, file_path, file_name, file_size, photo_type, caption)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING *
                    "#,
                )
                .bind(request_id)
                .bind(auth_user.account_id)
                .bind(&key)
                .bind(&file_name)
                .bind(size)
                .bind(photo_type)
                .bind(caption.as_deref())
                .fetch_one(&state.pool)
                .await?;
                uploaded.push(photo);
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    file_name = %file_name,
                    error = %e,
                    "Téléversement de photo échoué, fichier ignoré"
                );
                skipped.push(file_name);
            }
        }
    }

    Ok(Json(PhotoUploadResponse {
        success: true,
        uploaded,
        skipped,
    }))
}

pub async fn delete_photo(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((request_id, photo_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    check_request_access(&state, &auth_user, request_id).await?;

    let photo = sqlx::query_as::<_, Photo>(
        "DELETE FROM photos WHERE id = $1 AND work_request_id = $2 RETURNING *",
    )
    .bind(photo_id)
    .bind(request_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Photo introuvable".to_string()))?;

    // Suppression du blob en mode meilleur effort: la ligne fait foi.
    let file_service = FileService::new(&state.config).await?;
    if let Err(e) = file_service.delete(&photo.file_path).await {
        tracing::warn!(photo_id = %photo.id, error = %e, "Suppression du blob échouée");
    }

    Ok(Json(json!({ "success": true })))
}

pub async fn list_documents(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Vec<Document>>> {
    check_request_access(&state, &auth_user, request_id).await?;

    let documents = sqlx::query_as::<_, Document>(
        "SELECT * FROM documents WHERE work_request_id = $1 ORDER BY created_at ASC",
    )
    .bind(request_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(documents))
}

/// Téléversement d'un document (soumission, facture, contrat).
pub async fn upload_document(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(request_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    check_request_access(&state, &auth_user, request_id).await?;

    let mut document_type = DocumentType::Other;
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Formulaire invalide: {}", e)))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("document_type") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Champ illisible: {}", e)))?;
                document_type = parse_document_type(text.trim());
            }
            Some("file") | Some("document") => {
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if !validate_document_content_type(&content_type) {
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
                file = Some((file_name, content_type, data.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| AppError::BadRequest("Aucun fichier fourni".to_string()))?;

    let file_service = FileService::new(&state.config).await?;
    let key = FileService::build_key(request_id, &file_name);
    let size = data.len() as i64;
    file_service.upload(&key, &content_type, data).await?;

    let document = sqlx::query_as::<_, Document>(
        r#"
        INSERT INTO documents (work_request_id, uploaded_by, file_path, file_name, file_size, document_type)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(request_id)
    .bind(auth_user.account_id)
    .bind(&key)
    .bind(&file_name)
    .bind(size)
    .bind(document_type)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": document
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_type_defaults_to_initial() {
        assert_eq!(parse_photo_type("progress"), PhotoType::Progress);
        assert_eq!(parse_photo_type("completion"), PhotoType::Completion);
        assert_eq!(parse_photo_type("n'importe quoi"), PhotoType::Initial);
    }

    #[test]
    fn document_type_defaults_to_other() {
        assert_eq!(parse_document_type("quote"), DocumentType::Quote);
        assert_eq!(parse_document_type("invoice"), DocumentType::Invoice);
        assert_eq!(parse_document_type(""), DocumentType::Other);
    }
}
