use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::db::DatabaseManager;
use crate::handlers::{admin, auth, health_handler, root_handler};
use crate::service::token::TokenSigner;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseManager>,
    pub signer: TokenSigner,
}

impl AppState {
    pub fn new(db: Arc<DatabaseManager>, signer: TokenSigner) -> Self {
        Self { db, signer }
    }
}

pub fn app_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register_handler))
        .route("/login", post(auth::login_handler))
        .route(
            "/profile",
            get(auth::get_profile_handler).put(auth::update_profile_handler),
        );

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users_handler))
        .route("/stats", get(admin::stats_handler));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest("/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .with_state(state)
}
