use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Tâche d'une demande de travaux. item_order peut comporter des trous
/// après suppression; aucun réindexage n'est fait.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub work_request_id: Uuid,
    pub description: String,
    pub item_order: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddChecklistItemRequest {
    pub description: String,
}
