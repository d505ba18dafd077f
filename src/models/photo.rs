use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "photo_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PhotoType {
    Initial,
    Progress,
    Completion,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Photo {
    pub id: Uuid,
    pub work_request_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub photo_type: PhotoType,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "document_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Quote,
    Invoice,
    Contract,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub work_request_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub document_type: DocumentType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PhotoUploadResponse {
    pub success: bool,
    pub uploaded: Vec<Photo>,
    /// Fichiers ignorés suite à un échec de téléversement individuel
    pub skipped: Vec<String>,
}
