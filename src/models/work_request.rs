use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Building, Organization};

/// Cycle de vie d'une demande. Progression normale:
/// nouveau → en_evaluation → soumission_envoyee → approuve → en_cours
/// → complete → facture. Branche terminale: refuse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Nouveau,
    EnEvaluation,
    SoumissionEnvoyee,
    Approuve,
    EnCours,
    Complete,
    Facture,
    Refuse,
}

impl Default for RequestStatus {
    fn default() -> Self {
        Self::Nouveau
    }
}

impl RequestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Nouveau => "Nouveau",
            Self::EnEvaluation => "En évaluation",
            Self::SoumissionEnvoyee => "Soumission envoyée",
            Self::Approuve => "Approuvé",
            Self::EnCours => "En cours",
            Self::Complete => "Complété",
            Self::Facture => "Facturé",
            Self::Refuse => "Refusé",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Facture | Self::Refuse)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "request_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    Normal,
    Prioritaire,
    Urgent,
}

impl Default for RequestPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl RequestPriority {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Prioritaire => "Prioritaire",
            Self::Urgent => "Urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkRequest {
    pub id: Uuid,
    pub request_number: String,
    pub organization_id: Option<Uuid>,
    pub building_id: Option<Uuid>,
    pub unit_numbers: Vec<String>,
    pub work_type: String,
    pub work_category: String,
    pub priority: RequestPriority,
    pub description: String,
    pub access_info: Option<String>,
    pub status: RequestStatus,
    pub contact_email: bool,
    pub contact_phone: bool,
    pub contact_sms: bool,
    pub contact_portal: bool,
    pub estimated_cost: Option<Decimal>,
    pub final_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Entrée d'audit, append-only. old_status est NULL pour l'entrée de création.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub work_request_id: Uuid,
    pub old_status: Option<RequestStatus>,
    pub new_status: RequestStatus,
    pub changed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// DTOs

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorkRequestPayload {
    /// Admin seulement: organisation cible. Ignoré pour un gestionnaire,
    /// toujours rattaché à la sienne.
    pub organization_id: Option<Uuid>,
    pub building_id: Option<Uuid>,
    /// Numéros d'unité séparés par des virgules, ex: "101, 102"
    pub unit_numbers: String,
    pub work_type: String,
    pub work_category: String,
    #[serde(default)]
    pub priority: RequestPriority,
    pub description: String,
    pub access_info: Option<String>,
    #[serde(default)]
    pub contact_email: Option<bool>,
    #[serde(default)]
    pub contact_phone: Option<bool>,
    #[serde(default)]
    pub contact_sms: Option<bool>,
    #[serde(default)]
    pub contact_portal: Option<bool>,
    /// Tâches saisies avant la création, persistées avec la demande
    #[serde(default)]
    pub checklist: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateWorkRequestPayload {
    pub building_id: Option<Uuid>,
    pub unit_numbers: Option<String>,
    pub work_type: Option<String>,
    pub work_category: Option<String>,
    pub priority: Option<RequestPriority>,
    pub description: Option<String>,
    pub access_info: Option<String>,
    pub contact_email: Option<bool>,
    pub contact_phone: Option<bool>,
    pub contact_sms: Option<bool>,
    pub contact_portal: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionPayload {
    pub status: RequestStatus,
    pub note: Option<String>,
    pub estimated_cost: Option<Decimal>,
    pub final_cost: Option<Decimal>,
}

/// Projection typée pour les listes: demande + relations chargées.
#[derive(Debug, Serialize, ToSchema)]
pub struct WorkRequestWithRelations {
    #[serde(flatten)]
    pub request: WorkRequest,
    pub building: Option<Building>,
    pub organization: Option<Organization>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkRequestDetail {
    #[serde(flatten)]
    pub request: WorkRequest,
    pub building: Option<Building>,
    pub organization: Option<Organization>,
    pub photos: Vec<super::Photo>,
    pub documents: Vec<super::Document>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub checklist: Vec<super::ChecklistItem>,
}

/// Agrégats pour les tableaux de bord. Le regroupement des statuts est un
/// choix d'affichage, pas un champ stocké.
#[derive(Debug, Default, Serialize, PartialEq, Eq, ToSchema)]
pub struct RequestStats {
    pub total: i64,
    pub nouveau: i64,
    pub en_cours: i64,
    pub complete: i64,
    pub urgent: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq, ToSchema)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq, ToSchema)]
pub struct MonthCount {
    /// Mois de création, format AAAA-MM
    pub month: String,
    pub count: i64,
}

/// Rapport d'activité: volumes par catégorie et par mois.
#[derive(Debug, Default, Serialize, PartialEq, Eq, ToSchema)]
pub struct RequestReport {
    pub by_category: Vec<CategoryCount>,
    pub by_month: Vec<MonthCount>,
}
