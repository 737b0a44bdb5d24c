//! Stockroom server library logic.

pub mod api;
pub mod api_categories;
pub mod api_products;
pub mod api_ws;
pub mod config;
pub mod hub;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Extension, Router,
};
use hub::Hub;
use std::collections::HashSet;
use std::sync::Arc;
use stockroom_db::DbPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Live-update hub for WebSocket subscribers.
    pub hub: Hub,
    /// Accepted bearer tokens.
    pub api_tokens: Arc<HashSet<String>>,
}

impl AppState {
    pub fn new(pool: DbPool, hub: Hub, api_tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            pool,
            hub,
            api_tokens: Arc::new(api_tokens.into_iter().collect()),
        }
    }

    pub fn accepts_token(&self, token: &str) -> bool {
        !token.is_empty() && self.api_tokens.contains(token)
    }
}

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/products",
            get(api_products::list_products_handler).post(api_products::create_product_handler),
        )
        .route(
            "/api/products/{id}",
            get(api_products::get_product_handler)
                .patch(api_products::update_product_handler)
                .put(api_products::update_product_handler)
                .delete(api_products::delete_product_handler),
        )
        .route(
            "/api/products/{id}/history",
            get(api_products::product_history_handler),
        )
        .route("/api/search", get(api_products::search_handler))
        .route(
            "/api/categories",
            get(api_categories::list_categories_handler)
                .post(api_categories::create_category_handler),
        )
        .route(
            "/api/categories/{id}",
            get(api_categories::get_category_handler)
                .patch(api_categories::update_category_handler)
                .put(api_categories::update_category_handler)
                .delete(api_categories::delete_category_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    let feed_routes = Router::new()
        .route("/ws", get(api_ws::ws_handler))
        .layer(axum::middleware::from_fn(middleware::ws_auth_middleware));

    Router::new()
        .route("/health", get(api::health))
        .merge(protected_routes)
        .merge(feed_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
