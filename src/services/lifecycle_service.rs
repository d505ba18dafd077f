use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{
    CreateWorkRequestPayload, RequestStatus, TransitionPayload, UpdateWorkRequestPayload,
    WorkRequest,
};
use crate::services::{ChangeEvent, RealtimeBus};

pub const CREATION_NOTE: &str = "Demande créée";

/// Format du numéro de demande: {année}-{séquence sur 3 chiffres}.
pub fn format_request_number(year: i32, seq: i64) -> String {
    format!("{}-{:03}", year, seq)
}

/// Découpe "101, 102" en ["101", "102"]. Les entrées vides sont ignorées.
pub fn parse_unit_numbers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|unit| unit.trim().to_string())
        .filter(|unit| !unit.is_empty())
        .collect()
}

/// Valide les champs requis et retourne les numéros d'unité normalisés.
pub fn validate_create_payload(payload: &CreateWorkRequestPayload) -> AppResult<Vec<String>> {
    let units = parse_unit_numbers(&payload.unit_numbers);
    if units.is_empty() {
        return Err(AppError::Validation(
            "Au moins un numéro d'unité est requis".to_string(),
        ));
    }
    if payload.work_type.trim().is_empty() {
        return Err(AppError::Validation("Le type de travaux est requis".to_string()));
    }
    if payload.work_category.trim().is_empty() {
        return Err(AppError::Validation("La catégorie est requise".to_string()));
    }
    if payload.description.trim().is_empty() {
        return Err(AppError::Validation("La description est requise".to_string()));
    }
    Ok(units)
}

/// Les invariants de création tiennent aussi à la modification: un champ
/// fourni ne peut pas vider ce qu'il remplace. Retourne les numéros
/// d'unité normalisés quand ils sont fournis.
pub fn validate_update_payload(payload: &UpdateWorkRequestPayload) -> AppResult<Option<Vec<String>>> {
    let units = match payload.unit_numbers.as_deref() {
        Some(raw) => {
            let parsed = parse_unit_numbers(raw);
            if parsed.is_empty() {
                return Err(AppError::Validation(
                    "Au moins un numéro d'unité est requis".to_string(),
                ));
            }
            Some(parsed)
        }
        None => None,
    };
    if matches!(payload.work_type.as_deref(), Some(v) if v.trim().is_empty()) {
        return Err(AppError::Validation("Le type de travaux est requis".to_string()));
    }
    if matches!(payload.work_category.as_deref(), Some(v) if v.trim().is_empty()) {
        return Err(AppError::Validation("La catégorie est requise".to_string()));
    }
    if matches!(payload.description.as_deref(), Some(v) if v.trim().is_empty()) {
        return Err(AppError::Validation("La description est requise".to_string()));
    }
    Ok(units)
}

/// Seul un admin pilote le cycle de vie; la politique est encodée ici,
/// pas répétée par handler.
pub fn can_transition(acting: &AuthUser) -> bool {
    acting.is_admin()
}

/// Crée la demande avec son entrée d'historique de création et les tâches
/// initiales, dans une seule transaction. Les photos sont téléversées par
/// l'appelant après coup (tolérance aux échecs partiels).
pub async fn create_request(
    pool: &PgPool,
    bus: &RealtimeBus,
    acting: &AuthUser,
    organization_id: Uuid,
    payload: &CreateWorkRequestPayload,
) -> AppResult<WorkRequest> {
    let units = validate_create_payload(payload)?;

    let mut tx = pool.begin().await?;

    // Numérotation globale par comptage. Deux créations simultanées
    // peuvent produire le même numéro; la contrainte UNIQUE fait alors
    // échouer la seconde plutôt que de corrompre la séquence.
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM work_requests")
        .fetch_one(&mut *tx)
        .await?;
    let year = chrono::Datelike::year(&chrono::Utc::now());
    let request_number = format_request_number(year, count.0 + 1);

    let request = sqlx::query_as::<_, WorkRequest>(
        r#"
        INSERT INTO work_requests (
            request_number, organization_id, building_id, unit_numbers,
            work_type, work_category, priority, description, access_info,
            status, contact_email, contact_phone, contact_sms, contact_portal
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'nouveau', $10, $11, $12, $13)
        RETURNING *
        "#,
    )
    .bind(&request_number)
    .bind(organization_id)
    .bind(payload.building_id)
    .bind(&units)
    .bind(payload.work_type.trim())
    .bind(payload.work_category.trim())
    .bind(payload.priority)
    .bind(payload.description.trim())
    .bind(payload.access_info.as_deref())
    .bind(payload.contact_email.unwrap_or(true))
    .bind(payload.contact_phone.unwrap_or(false))
    .bind(payload.contact_sms.unwrap_or(false))
    .bind(payload.contact_portal.unwrap_or(true))
    .fetch_one(&mut *tx)
    .await?;

    // Entrée d'historique de création: old_status = NULL
    sqlx::query(
        r#"
        INSERT INTO status_history (work_request_id, old_status, new_status, changed_by, notes)
        VALUES ($1, NULL, 'nouveau', $2, $3)
        "#,
    )
    .bind(request.id)
    .bind(acting.account_id)
    .bind(CREATION_NOTE)
    .execute(&mut *tx)
    .await?;

    for (index, description) in payload.checklist.iter().enumerate() {
        if description.trim().is_empty() {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO checklist_items (work_request_id, description, item_order)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(request.id)
        .bind(description.trim())
        .bind(index as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        request_number = %request.request_number,
        organization_id = %organization_id,
        "Demande de travaux créée"
    );

    bus.publish(ChangeEvent::RequestChanged {
        request_id: request.id,
    });

    Ok(request)
}

/// Applique un changement de statut. Réservé aux admins; le graphe de
/// progression n'est pas imposé côté serveur (un admin peut poser
/// n'importe quel statut), mais chaque écriture produit exactement une
/// entrée d'historique, dans la même transaction que la mise à jour.
pub async fn transition(
    pool: &PgPool,
    bus: &RealtimeBus,
    request_id: Uuid,
    acting: &AuthUser,
    payload: &TransitionPayload,
) -> AppResult<WorkRequest> {
    if !can_transition(acting) {
        return Err(AppError::Forbidden);
    }

    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, WorkRequest>(
        "SELECT * FROM work_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Demande introuvable".to_string()))?;

    let old_status = current.status;

    let updated = sqlx::query_as::<_, WorkRequest>(
        r#"
        UPDATE work_requests SET
            status = $2,
            estimated_cost = COALESCE($3, estimated_cost),
            final_cost = COALESCE($4, final_cost),
            completed_at = CASE WHEN $2 = 'complete'::request_status THEN NOW() ELSE completed_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(request_id)
    .bind(payload.status)
    .bind(payload.estimated_cost)
    .bind(payload.final_cost)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO status_history (work_request_id, old_status, new_status, changed_by, notes)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(request_id)
    .bind(old_status)
    .bind(payload.status)
    .bind(acting.account_id)
    .bind(payload.note.as_deref())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        request_number = %updated.request_number,
        old_status = old_status.label(),
        new_status = payload.status.label(),
        changed_by = %acting.account_id,
        "Statut modifié"
    );

    bus.publish(ChangeEvent::RequestChanged { request_id });

    Ok(updated)
}

/// Progression attendue du cycle de vie, pour les actions rapides côté
/// client. Purement indicatif: `transition` n'impose pas ce graphe.
pub fn next_forward_status(status: RequestStatus) -> Option<RequestStatus> {
    match status {
        RequestStatus::Nouveau => Some(RequestStatus::EnEvaluation),
        RequestStatus::EnEvaluation => Some(RequestStatus::SoumissionEnvoyee),
        RequestStatus::SoumissionEnvoyee => Some(RequestStatus::Approuve),
        RequestStatus::Approuve => Some(RequestStatus::EnCours),
        RequestStatus::EnCours => Some(RequestStatus::Complete),
        RequestStatus::Complete => Some(RequestStatus::Facture),
        RequestStatus::Facture | RequestStatus::Refuse => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountRole, RequestPriority};
    use once_cell::sync::Lazy;
    use regex::Regex;

    static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{3}$").unwrap());

    fn payload(units: &str) -> CreateWorkRequestPayload {
        CreateWorkRequestPayload {
            organization_id: None,
            building_id: None,
            unit_numbers: units.to_string(),
            work_type: "Fuite d'eau".to_string(),
            work_category: "plumbing".to_string(),
            priority: RequestPriority::Normal,
            description: "Fuite sous l'évier".to_string(),
            access_info: None,
            contact_email: None,
            contact_phone: None,
            contact_sms: None,
            contact_portal: None,
            checklist: vec![],
        }
    }

    #[test]
    fn test_request_number_format() {
        assert_eq!(format_request_number(2026, 1), "2026-001");
        assert_eq!(format_request_number(2026, 42), "2026-042");
        assert_eq!(format_request_number(2026, 999), "2026-999");
        assert!(NUMBER_RE.is_match(&format_request_number(2026, 7)));
    }

    #[test]
    fn test_parse_unit_numbers() {
        assert_eq!(parse_unit_numbers("101, 102"), vec!["101", "102"]);
        assert_eq!(parse_unit_numbers("304"), vec!["304"]);
        assert_eq!(parse_unit_numbers(" 102 ,, 205 , 308 "), vec!["102", "205", "308"]);
        assert!(parse_unit_numbers("  , ,").is_empty());
    }

    #[test]
    fn test_validate_create_payload_rejects_empty_units() {
        let result = validate_create_payload(&payload(" , "));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_create_payload_rejects_blank_description() {
        let mut p = payload("101");
        p.description = "   ".to_string();
        assert!(matches!(
            validate_create_payload(&p),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_create_payload_splits_units() {
        let units = validate_create_payload(&payload("101, 102")).unwrap();
        assert_eq!(units, vec!["101", "102"]);
    }

    fn update_payload() -> UpdateWorkRequestPayload {
        UpdateWorkRequestPayload {
            building_id: None,
            unit_numbers: None,
            work_type: None,
            work_category: None,
            priority: None,
            description: None,
            access_info: None,
            contact_email: None,
            contact_phone: None,
            contact_sms: None,
            contact_portal: None,
        }
    }

    #[test]
    fn test_validate_update_payload_absent_fields_pass() {
        assert_eq!(validate_update_payload(&update_payload()).unwrap(), None);
    }

    #[test]
    fn test_validate_update_payload_rejects_blank_units() {
        let mut p = update_payload();
        p.unit_numbers = Some(" , ".to_string());
        assert!(matches!(
            validate_update_payload(&p),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_update_payload_rejects_emptied_fields() {
        for field in ["work_type", "work_category", "description"] {
            let mut p = update_payload();
            match field {
                "work_type" => p.work_type = Some("  ".to_string()),
                "work_category" => p.work_category = Some("".to_string()),
                _ => p.description = Some(" ".to_string()),
            }
            assert!(
                matches!(validate_update_payload(&p), Err(AppError::Validation(_))),
                "un champ fourni mais vide doit être rejeté: {}",
                field
            );
        }
    }

    #[test]
    fn test_validate_update_payload_normalizes_units() {
        let mut p = update_payload();
        p.unit_numbers = Some("101, 102".to_string());
        assert_eq!(
            validate_update_payload(&p).unwrap(),
            Some(vec!["101".to_string(), "102".to_string()])
        );
    }

    #[test]
    fn test_transition_gate_by_role() {
        let admin = AuthUser {
            account_id: uuid::Uuid::new_v4(),
            role: AccountRole::Admin,
            organization_id: None,
        };
        let manager = AuthUser {
            account_id: uuid::Uuid::new_v4(),
            role: AccountRole::Manager,
            organization_id: Some(uuid::Uuid::new_v4()),
        };

        assert!(can_transition(&admin));
        assert!(!can_transition(&manager));
    }

    #[test]
    fn test_forward_flow_ends_at_facture() {
        let mut status = RequestStatus::Nouveau;
        let mut hops = 0;
        while let Some(next) = next_forward_status(status) {
            status = next;
            hops += 1;
        }
        assert_eq!(status, RequestStatus::Facture);
        assert_eq!(hops, 6);
        assert!(status.is_terminal());
        assert!(next_forward_status(RequestStatus::Refuse).is_none());
    }
}
