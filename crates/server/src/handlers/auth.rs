//! Account endpoints: registration and login.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use depot_core::identity::{Identity, Role};
use depot_metadata::models::UserRow;
use depot_metadata::MetadataError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Public view of an account.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub token: String,
    pub expires_in: u64,
    /// Credential for the external read-only API. Shown once at registration.
    pub api_key: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: UserResponse,
}

/// POST /v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username, email and password are required".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest("invalid email address".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = depot_auth::hash_password(&req.password, state.config.auth.bcrypt_cost)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;

    let user = UserRow {
        user_id: Uuid::new_v4(),
        username,
        email,
        password_hash,
        role: Role::User.as_str().to_string(),
        is_active: true,
        api_key: depot_auth::generate_api_key(),
        created_at: OffsetDateTime::now_utc(),
        last_login_at: None,
    };

    state.metadata.create_user(&user).await.map_err(|e| match e {
        MetadataError::AlreadyExists(msg) => ApiError::Conflict(msg),
        other => ApiError::Metadata(other),
    })?;
    tracing::info!(user_id = %user.user_id, username = %user.username, "user registered");

    let identity = Identity {
        user_id: user.user_id,
        username: user.username.clone(),
        role: Role::User,
    };
    let token = state
        .signer
        .sign(&identity)
        .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            token,
            expires_in: state.signer.ttl_secs(),
            api_key: user.api_key.clone(),
            user: user.into(),
        }),
    ))
}

/// POST /v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    // One message for every failure mode, so login does not leak which
    // usernames exist.
    let invalid = || ApiError::Unauthorized("invalid username or password".to_string());

    let user = state
        .metadata
        .get_user_by_username(req.username.trim())
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid)?;

    let verified = depot_auth::verify_password(&req.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("password verification failed: {e}")))?;
    if !verified {
        return Err(invalid());
    }

    let role: Role = user
        .role
        .parse()
        .map_err(|_| ApiError::Internal(format!("invalid stored role '{}'", user.role)))?;
    let identity = Identity {
        user_id: user.user_id,
        username: user.username.clone(),
        role,
    };
    let token = state
        .signer
        .sign(&identity)
        .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))?;

    // Update last login time (fire and forget)
    let metadata = state.metadata.clone();
    let user_id = user.user_id;
    tokio::spawn(async move {
        let _ = metadata
            .touch_last_login(user_id, OffsetDateTime::now_utc())
            .await;
    });

    Ok(Json(LoginResponse {
        token,
        expires_in: state.signer.ttl_secs(),
        user: user.into(),
    }))
}
