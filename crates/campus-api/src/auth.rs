use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::info;
use uuid::Uuid;

use campus_db::Database;
use campus_types::api::{Claims, LoginRequest, LoginResponse, MeResponse, RegisterRequest, RegisterResponse};
use campus_types::models::Role;

use crate::{blocking, json_body};
use crate::error::ApiError;
use crate::rate_limit::RateLimiter;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub cron_secret: String,
    pub limiter: Arc<RateLimiter>,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: impl Into<String>, cron_secret: impl Into<String>) -> Self {
        Self {
            db,
            jwt_secret: jwt_secret.into(),
            cron_secret: cron_secret.into(),
            limiter: Arc::new(RateLimiter::new()),
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(body)?;

    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 254 {
        return Err(ApiError::validation("A valid email is required"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }
    let name = req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if name.as_ref().is_some_and(|n| n.chars().count() > 100) {
        return Err(ApiError::validation("Name is too long"));
    }

    let (user_id, token) = blocking(move || {
        if state.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("Email is already registered".into()));
        }

        let password_hash = hash_password(&req.password)?;
        let user_id = Uuid::new_v4();
        state.db.create_user(user_id, name.as_deref(), &email, &password_hash, chrono::Utc::now())?;
        info!("Registered user {}", user_id);

        let token = issue_token(&state.jwt_secret, user_id, name, &email, Role::Student)?;
        Ok((user_id, token))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let req = json_body(body)?;
    let email = req.email.trim().to_lowercase();

    blocking(move || {
        let user = state.db.get_user_by_email(&email)?.ok_or(ApiError::Unauthenticated)?;

        if !verify_password(&req.password, &user.password)? {
            return Err(ApiError::Unauthenticated);
        }

        let token = issue_token(&state.jwt_secret, user.id, user.name.clone(), &user.email, user.role)?;
        Ok(Json(LoginResponse {
            user_id: user.id,
            name: user.name,
            role: user.role,
            token,
        }))
    })
    .await
}

/// GET /auth/me: the stored account behind this token. Reflects role changes
/// made since the token was issued.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MeResponse>, ApiError> {
    blocking(move || {
        let user = state.db.get_user_by_id(claims.sub)?.ok_or(ApiError::Unauthenticated)?;
        Ok(Json(MeResponse {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }))
    })
    .await
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC hash string.
pub fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("stored hash is unreadable: {}", e))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    name: Option<String>,
    email: &str,
    role: Role,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name,
        email: email.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
