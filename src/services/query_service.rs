use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::models::{
    CategoryCount, MonthCount, RequestPriority, RequestReport, RequestStats, RequestStatus,
    WorkRequestWithRelations,
};

/// Portée organisation d'une lecture: un admin lit tout ou restreint à
/// l'organisation demandée, un gestionnaire est toujours ramené à la
/// sienne quel que soit le paramètre.
pub fn organization_scope(
    auth_user: &AuthUser,
    requested: Option<Uuid>,
) -> AppResult<Option<Uuid>> {
    if auth_user.is_admin() {
        Ok(requested)
    } else {
        Ok(Some(auth_user.require_organization()?))
    }
}

/// Taille de page: défaut 50, bornée à [1, 100].
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 100)
}

/// Valeur sentinelle "all" (ou axe absent/vide) = pas de filtre sur cet axe.
pub fn normalize_axis(value: Option<String>) -> Option<String> {
    match value.as_deref() {
        None | Some("") | Some("all") => None,
        Some(v) => Some(v.to_string()),
    }
}

/// Recherche libre appliquée en mémoire après le fetch filtré: numéro de
/// demande, type de travaux, description et adresse d'immeuble, sous-chaîne
/// insensible à la casse.
pub fn matches_search(row: &WorkRequestWithRelations, search: &str) -> bool {
    let needle = search.to_lowercase();
    if needle.is_empty() {
        return true;
    }

    let request = &row.request;
    if request.request_number.to_lowercase().contains(&needle)
        || request.work_type.to_lowercase().contains(&needle)
        || request.description.to_lowercase().contains(&needle)
    {
        return true;
    }

    row.building
        .as_ref()
        .map(|b| b.address.to_lowercase().contains(&needle))
        .unwrap_or(false)
}

/// Agrégation pour tableau de bord. "en_cours" regroupe
/// en_evaluation|soumission_envoyee|approuve|en_cours et "complete"
/// regroupe complete|facture.
pub fn compute_stats(rows: &[(RequestStatus, RequestPriority)]) -> RequestStats {
    let mut stats = RequestStats {
        total: rows.len() as i64,
        ..Default::default()
    };

    for (status, priority) in rows {
        match status {
            RequestStatus::Nouveau => stats.nouveau += 1,
            RequestStatus::EnEvaluation
            | RequestStatus::SoumissionEnvoyee
            | RequestStatus::Approuve
            | RequestStatus::EnCours => stats.en_cours += 1,
            RequestStatus::Complete | RequestStatus::Facture => stats.complete += 1,
            RequestStatus::Refuse => {}
        }
        if *priority == RequestPriority::Urgent {
            stats.urgent += 1;
        }
    }

    stats
}

/// Agrégats du rapport d'activité: volume par catégorie de travaux
/// (décroissant) et par mois de création (chronologique).
pub fn compute_report(rows: &[(String, DateTime<Utc>)]) -> RequestReport {
    let mut categories: HashMap<&str, i64> = HashMap::new();
    let mut months: BTreeMap<String, i64> = BTreeMap::new();

    for (category, created_at) in rows {
        *categories.entry(category.as_str()).or_insert(0) += 1;
        *months
            .entry(created_at.format("%Y-%m").to_string())
            .or_insert(0) += 1;
    }

    let mut by_category: Vec<CategoryCount> = categories
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect();
    by_category.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category)));

    let by_month = months
        .into_iter()
        .map(|(month, count)| MonthCount { month, count })
        .collect();

    RequestReport {
        by_category,
        by_month,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountRole, Building, WorkRequest};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn sample_row(number: &str, work_type: &str, description: &str, address: Option<&str>) -> WorkRequestWithRelations {
        let now = Utc::now();
        WorkRequestWithRelations {
            request: WorkRequest {
                id: Uuid::new_v4(),
                request_number: number.to_string(),
                organization_id: None,
                building_id: None,
                unit_numbers: vec!["101".to_string()],
                work_type: work_type.to_string(),
                work_category: "plumbing".to_string(),
                priority: RequestPriority::Normal,
                description: description.to_string(),
                access_info: None,
                status: RequestStatus::Nouveau,
                contact_email: true,
                contact_phone: false,
                contact_sms: false,
                contact_portal: true,
                estimated_cost: None,
                final_cost: None,
                created_at: now,
                updated_at: now,
                completed_at: None,
            },
            building: address.map(|a| Building {
                id: Uuid::new_v4(),
                organization_id: Uuid::new_v4(),
                address: a.to_string(),
                city: "Montréal".to_string(),
                postal_code: None,
                unit_count: None,
                notes: None,
                created_at: now,
                updated_at: now,
            }),
            organization: None,
        }
    }

    #[test]
    fn test_normalize_axis_sentinel() {
        assert_eq!(normalize_axis(None), None);
        assert_eq!(normalize_axis(Some("all".to_string())), None);
        assert_eq!(normalize_axis(Some("".to_string())), None);
        assert_eq!(
            normalize_axis(Some("urgent".to_string())),
            Some("urgent".to_string())
        );
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let row = sample_row("2026-001", "Fuite d'eau", "Sous l'évier", None);
        assert!(matches_search(&row, "FUITE"));
        assert!(matches_search(&row, "évier"));
        assert!(matches_search(&row, "2026-001"));
        assert!(!matches_search(&row, "toiture"));
    }

    #[test]
    fn test_search_covers_building_address() {
        let row = sample_row("2026-002", "Peinture", "Couloir", Some("1200 Rue Sainte-Catherine"));
        assert!(matches_search(&row, "sainte-catherine"));

        let without_building = sample_row("2026-003", "Peinture", "Couloir", None);
        assert!(!matches_search(&without_building, "sainte-catherine"));
    }

    #[test]
    fn test_empty_search_matches_everything() {
        let row = sample_row("2026-004", "Toiture", "Infiltration", None);
        assert!(matches_search(&row, ""));
    }

    #[test]
    fn test_stats_bucketing() {
        let rows = vec![
            (RequestStatus::Nouveau, RequestPriority::Urgent),
            (RequestStatus::EnEvaluation, RequestPriority::Normal),
            (RequestStatus::SoumissionEnvoyee, RequestPriority::Normal),
            (RequestStatus::Approuve, RequestPriority::Prioritaire),
            (RequestStatus::EnCours, RequestPriority::Urgent),
            (RequestStatus::Complete, RequestPriority::Normal),
            (RequestStatus::Facture, RequestPriority::Normal),
            (RequestStatus::Refuse, RequestPriority::Normal),
        ];

        let stats = compute_stats(&rows);
        assert_eq!(stats.total, 8);
        assert_eq!(stats.nouveau, 1);
        assert_eq!(stats.en_cours, 4);
        assert_eq!(stats.complete, 2);
        assert_eq!(stats.urgent, 2);
    }

    #[test]
    fn test_stats_empty() {
        assert_eq!(compute_stats(&[]), RequestStats::default());
    }

    fn manager_user(organization_id: Uuid) -> AuthUser {
        AuthUser {
            account_id: Uuid::new_v4(),
            role: AccountRole::Manager,
            organization_id: Some(organization_id),
        }
    }

    fn admin_user() -> AuthUser {
        AuthUser {
            account_id: Uuid::new_v4(),
            role: AccountRole::Admin,
            organization_id: None,
        }
    }

    #[test]
    fn test_organization_scope_manager_is_forced_to_own() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let user = manager_user(own);

        assert_eq!(organization_scope(&user, None).unwrap(), Some(own));
        // Un gestionnaire ne peut pas lire une autre organisation
        assert_eq!(organization_scope(&user, Some(other)).unwrap(), Some(own));
    }

    #[test]
    fn test_organization_scope_admin_chooses() {
        let target = Uuid::new_v4();
        let user = admin_user();

        assert_eq!(organization_scope(&user, None).unwrap(), None);
        assert_eq!(organization_scope(&user, Some(target)).unwrap(), Some(target));
    }

    #[test]
    fn test_clamp_limit_bounds() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(-1)), 1);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(25)), 25);
        assert_eq!(clamp_limit(Some(1000)), 100);
    }

    #[test]
    fn test_report_groups_by_category_and_month() {
        let january = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let february = Utc.with_ymd_and_hms(2026, 2, 3, 10, 0, 0).unwrap();
        let rows = vec![
            ("plumbing".to_string(), january),
            ("plumbing".to_string(), february),
            ("painting".to_string(), february),
        ];

        let report = compute_report(&rows);

        assert_eq!(report.by_category.len(), 2);
        assert_eq!(report.by_category[0].category, "plumbing");
        assert_eq!(report.by_category[0].count, 2);
        assert_eq!(report.by_category[1].category, "painting");

        assert_eq!(report.by_month.len(), 2);
        assert_eq!(report.by_month[0].month, "2026-01");
        assert_eq!(report.by_month[0].count, 1);
        assert_eq!(report.by_month[1].month, "2026-02");
        assert_eq!(report.by_month[1].count, 2);
    }

    #[test]
    fn test_report_empty() {
        assert_eq!(compute_report(&[]), RequestReport::default());
    }
}
