use crate::db::{Collection, ID_FIELD, Query, Record, Update};
use crate::error::AppError;
use crate::service::password::{hash_password, verify_password};
use crate::service::token::TokenSigner;
use crate::types::user::{
    ProfileResponse, ProfileUpdate, RegisterRequest, RegisterResponse, TokenResponse,
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

/// Create a user after checking that neither username nor email is taken.
///
/// The existence checks and the insert are separate store calls, so two
/// racing registrations can still both succeed.
pub async fn register(
    users: &Collection,
    req: RegisterRequest,
) -> Result<RegisterResponse, AppError> {
    info!(username = %req.username, "registration attempt");

    if [&req.username, &req.email, &req.full_name, &req.password]
        .iter()
        .any(|s| s.trim().is_empty())
    {
        warn!("registration failed: missing required fields");
        return Err(AppError::Validation(
            "All required fields must be provided".to_string(),
        ));
    }

    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if users.find_one(Query::eq("username", username.as_str())).await?.is_some() {
        warn!(username = %username, "registration failed: username exists");
        return Err(AppError::Conflict(
            "Username already exists. Please choose a different username.".to_string(),
        ));
    }
    if users.find_one(Query::eq("email", email.as_str())).await?.is_some() {
        warn!(email = %email, "registration failed: email exists");
        return Err(AppError::Conflict(
            "Email already registered. Please use a different email or login with existing account."
                .to_string(),
        ));
    }

    let mut record = Record::new();
    record.insert("username".into(), json!(username));
    record.insert("email".into(), json!(email));
    record.insert("full_name".into(), json!(req.full_name.trim()));
    record.insert("user_type".into(), json!(req.user_type));
    record.insert("phone".into(), json!(req.phone));
    record.insert("hashed_password".into(), json!(hash_password(&req.password)?));
    record.insert("created_at".into(), json!(Utc::now().to_rfc3339()));
    record.insert("is_active".into(), json!(true));

    let res = users.insert_one(record).await?;
    info!(username = %username, id = %res.inserted_id, "user created");

    Ok(RegisterResponse {
        message: "Registration successful! You can now login with your credentials.".to_string(),
        user_id: res.inserted_id,
        username,
        success: true,
    })
}

pub async fn login(
    users: &Collection,
    signer: &TokenSigner,
    username: &str,
    password: &str,
) -> Result<TokenResponse, AppError> {
    info!(username, "login attempt");

    let Some(user) = users.find_one(Query::eq("username", username)).await? else {
        warn!(username, "login failed: unknown username");
        return Err(AppError::Unauthorized(
            "Username not found. Please check your username or register a new account."
                .to_string(),
        ));
    };

    let stored = user
        .get("hashed_password")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !verify_password(password, stored) {
        warn!(username, "login failed: incorrect password");
        return Err(AppError::Unauthorized(
            "Incorrect password. Please try again.".to_string(),
        ));
    }

    if !user.get("is_active").and_then(Value::as_bool).unwrap_or(true) {
        warn!(username, "login failed: account deactivated");
        return Err(AppError::Unauthorized(
            "Account is deactivated. Please contact support.".to_string(),
        ));
    }

    info!(username, "login successful");
    Ok(TokenResponse {
        access_token: signer.issue(username)?,
        token_type: "bearer".to_string(),
    })
}

pub async fn profile(users: &Collection, username: &str) -> Result<ProfileResponse, AppError> {
    let user = users
        .find_one(Query::eq("username", username))
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let text = |field: &str| {
        user.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Ok(ProfileResponse {
        id: text(ID_FIELD),
        username: text("username"),
        email: text("email"),
        full_name: text("full_name"),
        user_type: text("user_type"),
        created_at: user.get("created_at").cloned().unwrap_or(Value::Null),
    })
}

/// Apply the non-empty fields of `changes`. A profile that no longer exists
/// is a silent no-op, same as the store's own update semantics.
pub async fn update_profile(
    users: &Collection,
    username: &str,
    changes: ProfileUpdate,
) -> Result<(), AppError> {
    let mut update = Update::default();
    if let Some(full_name) = changes.full_name.filter(|s| !s.trim().is_empty()) {
        update = update.and_set("full_name", full_name.trim());
    }
    if let Some(email) = changes.email.filter(|s| !s.trim().is_empty()) {
        update = update.and_set("email", email.trim().to_lowercase());
    }
    if update.is_empty() {
        return Ok(());
    }

    let res = users.update_one(Query::eq("username", username), update).await?;
    info!(
        username,
        matched = res.matched_count,
        modified = res.modified_count,
        "profile update applied"
    );
    Ok(())
}

/// Every user with secrets stripped.
pub async fn list_users(users: &Collection) -> Result<Vec<Record>, AppError> {
    let mut all = users.find(Query::all()).await?;
    for user in &mut all {
        user.remove("hashed_password");
    }
    Ok(all)
}
