use axum::{
    Form, Json,
    extract::{Query, State},
};
use serde_json::{Value, json};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::router::AppState;
use crate::service::accounts;
use crate::types::user::{
    LoginForm, ProfileResponse, ProfileUpdate, RegisterRequest, RegisterResponse, TokenResponse,
};

/// POST /auth/register
pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let users = state.db.get_database().await.users();
    Ok(Json(accounts::register(&users, req).await?))
}

/// POST /auth/login (form-encoded)
pub async fn login_handler(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, AppError> {
    let users = state.db.get_database().await.users();
    let token = accounts::login(&users, &state.signer, &form.username, &form.password).await?;
    Ok(Json(token))
}

/// GET /auth/profile
pub async fn get_profile_handler(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let users = state.db.get_database().await.users();
    Ok(Json(accounts::profile(&users, &username).await?))
}

/// PUT /auth/profile?full_name=..&email=..
pub async fn update_profile_handler(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Query(changes): Query<ProfileUpdate>,
) -> Result<Json<Value>, AppError> {
    let users = state.db.get_database().await.users();
    accounts::update_profile(&users, &username, changes).await?;
    Ok(Json(json!({ "message": "Profile updated successfully" })))
}
