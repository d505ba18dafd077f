use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{AuthResponse, LoginRequest, Organization, RefreshTokenRequest, TokenResponse};
use crate::services::AuthService;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
        .route("/me", get(get_me))
}

/// Connexion par courriel et mot de passe
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session ouverte", body = AuthResponse),
        (status = 401, description = "Identifiants invalides")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let account = AuthService::get_account_by_email(&state.pool, payload.email.trim())
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !AuthService::verify_password(&payload.password, &account.password_hash) {
        return Err(AppError::Unauthorized);
    }

    let auth_service = AuthService::new(state.config.clone());
    let access_token = auth_service.generate_access_token(&account)?;
    let refresh_token = auth_service.generate_refresh_token(&account)?;

    tracing::info!(account_id = %account.id, "Connexion réussie");

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        account: account.into(),
    }))
}

/// Renouvellement du jeton d'accès
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Jetons renouvelés", body = TokenResponse),
        (status = 401, description = "Jeton invalide ou expiré")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let auth_service = AuthService::new(state.config.clone());
    let claims = auth_service.verify_token(&payload.refresh_token)?;

    if claims.token_type != "refresh" {
        return Err(AppError::Unauthorized);
    }

    let account_id = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized)?;
    let account = AuthService::get_account_by_id(&state.pool, account_id).await?;

    Ok(Json(TokenResponse {
        access_token: auth_service.generate_access_token(&account)?,
        refresh_token: auth_service.generate_refresh_token(&account)?,
    }))
}

/// Profil du compte courant, avec son organisation pour un gestionnaire
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profil du compte"),
        (status = 401, description = "Non authentifié")
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Value>> {
    let account = AuthService::get_account_by_id(&state.pool, auth_user.account_id).await?;

    let organization = if let Some(organization_id) = auth_user.organization_id {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(organization_id)
            .fetch_optional(&state.pool)
            .await?
    } else {
        None
    };

    let public: crate::models::AccountPublic = account.into();
    Ok(Json(json!({
        "account": public,
        "organization": organization
    })))
}
