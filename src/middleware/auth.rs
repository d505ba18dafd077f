use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::AccountRole;
use crate::services::{AuthService, RealtimeBus};

/// Contexte d'action explicite: compte résolu + rôle + organisation liée
/// pour les gestionnaires. Passé en paramètre à chaque handler, jamais
/// porté par un état global.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub account_id: Uuid,
    pub role: AccountRole,
    pub organization_id: Option<Uuid>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == AccountRole::Admin
    }

    /// L'organisation du gestionnaire; Forbidden pour un compte admin
    /// sans profil gestionnaire.
    pub fn require_organization(&self) -> AppResult<Uuid> {
        self.organization_id.ok_or(AppError::Forbidden)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub realtime: RealtimeBus,
}

pub fn require_admin(user: &AuthUser) -> AppResult<()> {
    if !user.is_admin() {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

// Middleware pour exposer AppState aux extracteurs
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(state);
    next.run(request).await
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let app_state = parts.extensions.get::<AppState>().cloned().ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            )
                .into_response()
        })?;

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Missing authorization header"})),
                )
                    .into_response()
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid authorization header format"})),
            )
                .into_response()
        })?;

        let auth_service = AuthService::new(app_state.config.clone());
        let claims = auth_service.verify_token(token).map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid or expired token"})),
            )
                .into_response()
        })?;

        if claims.token_type != "access" {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid token type"})),
            )
                .into_response());
        }

        let account_id = Uuid::parse_str(&claims.sub).map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid account ID in token"})),
            )
                .into_response()
        })?;

        // Résolution principal -> compte applicatif + organisation liée
        resolve_acting_account(&app_state.pool, account_id)
            .await
            .map_err(|_| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Unknown account"})),
                )
                    .into_response()
            })
    }
}

/// Résout un principal authentifié vers son compte applicatif et, pour un
/// gestionnaire, son organisation.
pub async fn resolve_acting_account(pool: &PgPool, account_id: Uuid) -> AppResult<AuthUser> {
    let row: Option<(AccountRole,)> =
        sqlx::query_as("SELECT role FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(pool)
            .await?;

    let role = row
        .map(|(role,)| role)
        .ok_or_else(|| AppError::NotFound("Compte introuvable".to_string()))?;

    let organization_id = if role == AccountRole::Manager {
        sqlx::query_as::<_, (Uuid,)>("SELECT id FROM organizations WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(pool)
            .await?
            .map(|(id,)| id)
    } else {
        None
    };

    Ok(AuthUser {
        account_id,
        role,
        organization_id,
    })
}
