use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Every knowledge route is reachable without authentication. Access is
/// decided per request by the knowledge controller from the caller's identity
/// and the `k_article_token` cookie.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /knowledge/article/{article_id}
        // Token-aware article view resolution (portal page, backend redirect or login).
        .route(
            "/knowledge/article/{article_id}",
            get(handlers::redirect_to_article),
        )
        // GET /knowledge/article/{article_id}/{access_token}
        // Token validation, cookie issuance and role-based redirect.
        .route(
            "/knowledge/article/{article_id}/{access_token}",
            get(handlers::redirect_to_article_with_token),
        )
        // POST /knowledge/tree_panel
        // Initial tree-panel payload (JSON-RPC).
        .route("/knowledge/tree_panel", post(handlers::get_tree_panel))
        // POST /knowledge/tree_panel/children
        // Lazy expansion of one tree node (JSON-RPC, HTML fragment result).
        .route(
            "/knowledge/tree_panel/children",
            post(handlers::get_tree_panel_children),
        )
}
