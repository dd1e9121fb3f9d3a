//! JWT authentication for the lecturer API
//!
//! A single lecturer credential (salted SHA-256) unlocks roster and course
//! management. Access tokens carry the role and can be revoked on logout.
//! Repeated failures lock the login out for a while.

use anyhow::{Context, Result, bail};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::server::error::ApiError;
use crate::types::UserRole;

const MAX_LOGIN_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 30;

/// Owner id recorded on courses created by the lecturer
pub const LECTURER_ID: &str = "l1";

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (lecturer id)
    pub sub: String,
    pub role: UserRole,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    /// Token id for revocation
    pub jti: String,
}

/// Settings the auth state is built from
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub access_token_expiry_minutes: i64,
    /// `salt$hash` as produced by [`hash_password`]; `None` disables login
    pub lecturer_password_hash: Option<String>,
    /// Id recorded as the owner of courses created through the API
    pub lecturer_id: String,
}

impl AuthSettings {
    pub fn from_config(config: &crate::config::AuthConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone().unwrap_or_else(generate_jwt_secret),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            lecturer_password_hash: config.lecturer_password_hash.clone(),
            lecturer_id: LECTURER_ID.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub token: String,
}

/// Authentication state
pub struct AuthState {
    settings: AuthSettings,
    /// Revoked token IDs (for logout)
    revoked_tokens: RwLock<HashMap<String, DateTime<Utc>>>,
    /// Consecutive failures and when the last one happened
    failed_logins: RwLock<(u32, Option<DateTime<Utc>>)>,
}

impl AuthState {
    pub fn new(settings: AuthSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            revoked_tokens: RwLock::new(HashMap::new()),
            failed_logins: RwLock::new((0, None)),
        })
    }

    pub fn login_enabled(&self) -> bool {
        self.settings.lecturer_password_hash.is_some()
    }

    pub fn token_lifetime_secs(&self) -> i64 {
        self.settings.access_token_expiry_minutes * 60
    }

    /// Time left on a lockout, if one is active
    pub fn locked_for(&self) -> Option<Duration> {
        let failures = self.failed_logins.read().unwrap_or_else(PoisonError::into_inner);
        match *failures {
            (count, Some(last)) if count >= MAX_LOGIN_ATTEMPTS => {
                let until = last + Duration::minutes(LOCKOUT_MINUTES);
                let now = Utc::now();
                if now < until { Some(until - now) } else { None }
            }
            _ => None,
        }
    }

    /// Check the lecturer password, tracking failures
    pub fn login(&self, password: &str) -> Result<String, ApiError> {
        let stored = self.settings.lecturer_password_hash.as_deref().ok_or_else(|| {
            ApiError::ServiceUnavailable(
                "Lecturer login is disabled. Run 'attendify config --set-password' first.".to_string(),
            )
        })?;

        if let Some(remaining) = self.locked_for() {
            return Err(ApiError::Unauthorized(format!(
                "Too many failed attempts, try again in {} minutes",
                remaining.num_minutes() + 1
            )));
        }

        if !verify_password(password, stored) {
            let mut failures = self.failed_logins.write().unwrap_or_else(PoisonError::into_inner);
            failures.0 += 1;
            failures.1 = Some(Utc::now());
            return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
        }

        *self.failed_logins.write().unwrap_or_else(PoisonError::into_inner) = (0, None);
        self.generate_access_token(&self.settings.lecturer_id, UserRole::Lecturer)
            .map_err(ApiError::from)
    }

    /// Generate access token for a user
    pub fn generate_access_token(&self, user_id: &str, role: UserRole) -> Result<String> {
        let now = Utc::now();
        let expiry = now + Duration::minutes(self.settings.access_token_expiry_minutes);

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: expiry.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
        )
        .context("Failed to encode JWT")
    }

    /// Validate and decode token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
            &validation,
        )
        .context("Invalid token")?;

        if self.is_token_revoked(&token_data.claims.jti) {
            bail!("Token has been revoked");
        }

        Ok(token_data.claims)
    }

    /// Extract JTI from token without checking expiry
    pub fn extract_jti(&self, token: &str) -> Result<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
            &validation,
        )
        .context("Failed to decode token")?;

        Ok(token_data.claims.jti)
    }

    /// Revoke a token (logout)
    pub fn revoke_token(&self, jti: &str) {
        let mut revoked = self.revoked_tokens.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        // Old entries outlive any token they could match
        let horizon = Duration::minutes(self.settings.access_token_expiry_minutes);
        revoked.retain(|_, at| now - *at <= horizon);
        revoked.insert(jti.to_string(), now);
    }

    fn is_token_revoked(&self, jti: &str) -> bool {
        self.revoked_tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }
}

/// Require a valid lecturer Bearer token
pub async fn require_lecturer(
    State(auth): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = auth
        .validate_token(token)
        .map_err(|e| ApiError::Unauthorized(format!("{:#}", e)))?;

    if claims.role != UserRole::Lecturer {
        return Err(ApiError::Forbidden("Lecturer access required".to_string()));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Generate a secure JWT secret
pub fn generate_jwt_secret() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    BASE64.encode(bytes)
}

/// Salted SHA-256 of a password as `salt$hash`, both hex
pub fn hash_password(password: &str) -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let salt: [u8; 16] = rng.random();
    let salt_hex = hex::encode(salt);
    format!("{}${}", salt_hex, hex::encode(digest(&salt_hex, password)))
}

/// Check a password against a `salt$hash` string in constant time
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, hash)) = stored.split_once('$') else {
        return false;
    };
    let Ok(expected) = hex::decode(hash) else {
        return false;
    };
    ring::constant_time::verify_slices_are_equal(&digest(salt, password), &expected).is_ok()
}

fn digest(salt: &str, password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}
