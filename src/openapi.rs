use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MrBrico Immo API",
        version = "1.0.0",
        description = "API backend du portail de demandes de travaux MrBrico Immo",
        contact(
            name = "MrBrico Immo",
            email = "support@mrbrico-immo.ca"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Serveur de développement local")
    ),
    tags(
        (name = "auth", description = "Authentification et comptes"),
        (name = "requests", description = "Demandes de travaux"),
        (name = "messages", description = "Fil de messages par demande"),
        (name = "managers", description = "Provisionnement des gestionnaires (admin)")
    ),
    paths(
        // Auth
        crate::api::auth::login,
        crate::api::auth::refresh_token,
        crate::api::auth::get_me,
        // Requests
        crate::api::requests::list_requests,
        crate::api::requests::get_request,
        crate::api::requests::create_request,
        crate::api::requests::transition_status,
        // Messages
        crate::api::messages::list_messages,
        crate::api::messages::send_message,
        // Managers
        crate::api::managers::list_managers,
        crate::api::managers::create_manager,
        crate::api::managers::update_manager,
    ),
    components(
        schemas(
            // Auth
            crate::models::LoginRequest,
            crate::models::AuthResponse,
            crate::models::RefreshTokenRequest,
            crate::models::TokenResponse,
            crate::models::AccountPublic,
            crate::models::AccountRole,
            // Requests
            crate::models::RequestStatus,
            crate::models::RequestPriority,
            crate::models::WorkRequest,
            crate::models::WorkRequestWithRelations,
            crate::models::WorkRequestDetail,
            crate::models::CreateWorkRequestPayload,
            crate::models::UpdateWorkRequestPayload,
            crate::models::TransitionPayload,
            crate::models::StatusHistoryEntry,
            crate::models::RequestStats,
            crate::models::RequestReport,
            crate::models::CategoryCount,
            crate::models::MonthCount,
            // Buildings
            crate::models::Building,
            crate::models::CreateBuildingRequest,
            crate::models::UpdateBuildingRequest,
            // Organizations
            crate::models::Organization,
            crate::models::CreateManagerRequest,
            crate::models::UpdateManagerRequest,
            crate::models::ManagerResponse,
            // Messages
            crate::models::SenderType,
            crate::models::Message,
            crate::models::SendMessageRequest,
            crate::models::MessageResponse,
            // Photos et documents
            crate::models::PhotoType,
            crate::models::Photo,
            crate::models::PhotoUploadResponse,
            crate::models::DocumentType,
            crate::models::Document,
            // Checklist
            crate::models::ChecklistItem,
            crate::models::AddChecklistItemRequest,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
