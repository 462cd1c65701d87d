pub mod admin;
pub mod auth;

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::router::AppState;

/// GET /
pub async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    let backend = state.db.get_database().await.mode();
    Json(json!({
        "message": "Kisan Setu API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "backend": backend,
        "endpoints": {
            "auth": "/auth",
            "admin": "/api/admin",
        },
    }))
}

/// GET /health
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "Kisan Setu API" }))
}
