use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;
use parley_types::api::{
    LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, StatusMessage,
};

use crate::error::ApiError;
use crate::session::{SessionStore, SessionToken};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub sessions: SessionStore,
    pub dispatcher: Dispatcher,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::Validation("Username must be 3-32 characters."));
    }
    if req.username.contains(['<', '>', '"', '\'', '&']) {
        return Err(ApiError::Validation(
            "Username contains disallowed characters: <, >, \", ', &.",
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters.",
        ));
    }

    // Collision check goes through the column's NOCASE collation, so it is
    // case-insensitive; the UNIQUE constraint backstops the races this
    // check-then-insert cannot see.
    let db = state.clone();
    let username = req.username.clone();
    let existing = tokio::task::spawn_blocking(move || db.db.get_user_by_username(&username))
        .await
        .map_err(anyhow::Error::from)??;
    if existing.is_some() {
        return Err(ApiError::Conflict("Username already exists."));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();

    let user_id = Uuid::new_v4();

    let db = state.clone();
    let username = req.username.clone();
    tokio::task::spawn_blocking(move || {
        db.db
            .create_user(&user_id.to_string(), &username, &password_hash)
    })
    .await
    .map_err(anyhow::Error::from)??;

    let (token, csrf_token) = state.sessions.create(user_id, &req.username);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            token,
            csrf_token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let username = req.username.clone();
    let user = tokio::task::spawn_blocking(move || db.db.get_user_by_username(&username))
        .await
        .map_err(anyhow::Error::from)??
        .ok_or(ApiError::Unauthorized("Invalid username or password."))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored password hash is unreadable: {e}"))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("Invalid username or password."))?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {e}", user.id))?;

    let (token, csrf_token) = state.sessions.create(user_id, &user.username);

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
        csrf_token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(token): Extension<SessionToken>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.revoke(&token.0);

    Ok(Json(StatusMessage {
        message: "Logged out.".to_string(),
    }))
}
