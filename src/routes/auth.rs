use axum::{ extract::{ Json, State }, http::StatusCode, response::IntoResponse, };
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::routes::middleware_auth::JwtUser;
use crate::state::AppState;
use crate::store::{NewUser, StoreError};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub username: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegistrationRequest>
) -> impl IntoResponse {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.len() < MIN_PASSWORD_LEN {
        return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "could not hash password");
            return (StatusCode::INTERNAL_SERVER_ERROR, "could not create user").into_response();
        }
    };

    let res = state
        .users
        .create_user(NewUser { username: username.to_string(), password_hash })
        .await;

    match res {
        Ok(user) => {
            info!(user_id = %user.id, username = %user.username, "registered user");
            (StatusCode::CREATED, Json(RegisterResponse { id: user.id, username: user.username })).into_response()
        }
        Err(StoreError::UsernameTaken(_)) => (StatusCode::CONFLICT, "username already exists").into_response(),
        Err(e) => {
            error!(error = %e, "user insert failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "could not create user").into_response()
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = match state.users.find_user_by_username(payload.username.trim()).await {
        Ok(Some(user)) => user,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response(),
        Err(e) => {
            error!(error = %e, "user lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response();
        }
    };

    if !verify_password(&payload.password, &user.password_hash) {
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    match state.tokens.issue(user.id) {
        Ok(token) => (StatusCode::OK, Json(LoginResponse { token })).into_response(),
        Err(e) => {
            error!(error = %e, "jwt encode error");
            (StatusCode::INTERNAL_SERVER_ERROR, "token error").into_response()
        }
    }
}

/// The signed-in user's account.
pub async fn me(
    State(state): State<AppState>,
    JwtUser(user_id): JwtUser,
) -> impl IntoResponse {
    match state.users.find_user(user_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(RegisterResponse { id: user.id, username: user.username })).into_response(),
        Ok(None) => (StatusCode::UNAUTHORIZED, "no user").into_response(),
        Err(e) => {
            error!(error = %e, "user lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
        }
    }
}
