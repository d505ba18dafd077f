use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::Account;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account_id
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String,
}

pub struct AuthService {
    config: Config,
}

impl AuthService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn generate_access_token(&self, account: &Account) -> AppResult<String> {
        self.generate_token(account, "access", self.config.jwt_access_expiry)
    }

    pub fn generate_refresh_token(&self, account: &Account) -> AppResult<String> {
        self.generate_token(account, "refresh", self.config.jwt_refresh_expiry)
    }

    fn generate_token(&self, account: &Account, token_type: &str, expiry: i64) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(expiry);

        let claims = Claims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            role: format!("{:?}", account.role).to_lowercase(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            token_type: token_type.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(AppError::from)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }

    pub fn hash_password(password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("hash error: {}", e)))
    }

    pub fn verify_password(password: &str, password_hash: &str) -> bool {
        PasswordHash::new(password_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub async fn get_account_by_id(pool: &PgPool, account_id: Uuid) -> AppResult<Account> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Compte introuvable".to_string()))
    }

    pub async fn get_account_by_email(pool: &PgPool, email: &str) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let hash = AuthService::hash_password("s3cret!").unwrap();
        assert!(AuthService::verify_password("s3cret!", &hash));
        assert!(!AuthService::verify_password("wrong", &hash));
    }

    #[test]
    fn test_verify_password_rejects_garbage_hash() {
        assert!(!AuthService::verify_password("s3cret!", "not-a-phc-string"));
    }
}
