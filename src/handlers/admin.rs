use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::router::AppState;
use crate::service::accounts;

/// GET /api/admin/users. Any signed-in user may call it; there are no roles yet.
pub async fn list_users_handler(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Value>, AppError> {
    tracing::info!(caller = %caller, "admin user listing");
    let db = state.db.get_database().await;
    let users = accounts::list_users(&db.users()).await?;
    Ok(Json(json!({
        "backend": db.mode(),
        "count": users.len(),
        "users": users,
    })))
}

/// GET /api/admin/stats. `by_user_type` is null in degraded mode.
pub async fn stats_handler(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
) -> Result<Json<Value>, AppError> {
    let db = state.db.get_database().await;
    let by_user_type = db.users().count_by("user_type").await?;
    Ok(Json(json!({
        "backend": db.mode(),
        "by_user_type": by_user_type,
    })))
}
