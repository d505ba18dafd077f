use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Building {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub address: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub unit_count: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBuildingRequest {
    pub address: String,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub unit_count: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBuildingRequest {
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub unit_count: Option<i32>,
    pub notes: Option<String>,
}
