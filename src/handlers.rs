use crate::{
    AppState,
    auth::CurrentUser,
    controller::{ArticleResponse, RequestContext},
    cookies::ArticleTokenCookie,
    error::KnowledgeError,
    models::{JsonRpcRequest, JsonRpcResponse, TreePanelChildrenParams, TreePanelParams, TreePanelValues},
};
use axum::{
    Json,
    extract::{Path, State},
};

// --- Handlers ---

/// redirect_to_article
///
/// [Public Route] Resolves which view of an article the caller gets. An
/// anonymous caller whose `k_article_token` cookie reaches the article gets the
/// portal page; everyone else gets the default resolution.
#[utoipa::path(
    get,
    path = "/knowledge/article/{article_id}",
    params(("article_id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Portal view", content_type = "text/html"),
        (status = 303, description = "Backend view or login page"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn redirect_to_article(
    State(state): State<AppState>,
    user: CurrentUser,
    ArticleTokenCookie(article_token): ArticleTokenCookie,
    Path(article_id): Path<i64>,
) -> Result<ArticleResponse, KnowledgeError> {
    let ctx = RequestContext::new(user, article_token);
    state.knowledge.redirect_to_article(&ctx, article_id).await
}

/// redirect_to_article_with_token
///
/// [Public Route] Validates an access token against the article. On success
/// the token is cached in the `k_article_token` cookie for 24 hours; internal
/// users are redirected to the backend, everyone else gets the portal page.
#[utoipa::path(
    get,
    path = "/knowledge/article/{article_id}/{access_token}",
    params(
        ("article_id" = i64, Path, description = "Article ID"),
        ("access_token" = String, Path, description = "Article access token")
    ),
    responses(
        (status = 200, description = "Portal view, cookie set", content_type = "text/html"),
        (status = 303, description = "Backend view, cookie set"),
        (status = 403, description = "Sharing unavailable for this article"),
        (status = 404, description = "Token rejected")
    )
)]
pub async fn redirect_to_article_with_token(
    State(state): State<AppState>,
    user: CurrentUser,
    ArticleTokenCookie(article_token): ArticleTokenCookie,
    Path((article_id, access_token)): Path<(i64, String)>,
) -> Result<ArticleResponse, KnowledgeError> {
    let ctx = RequestContext::new(user, article_token);
    state
        .knowledge
        .redirect_to_article_with_token(&ctx, article_id, &access_token)
        .await
}

/// get_tree_panel_children
///
/// [Public Route, JSON-RPC] Renders the children of one tree-panel node as an
/// HTML fragment in `result`.
#[utoipa::path(
    post,
    path = "/knowledge/tree_panel/children",
    request_body = TreePanelChildrenParams,
    responses(
        (status = 200, description = "JSON-RPC envelope whose result is the HTML fragment"),
        (status = 404, description = "Parent not visible")
    )
)]
pub async fn get_tree_panel_children(
    State(state): State<AppState>,
    user: CurrentUser,
    ArticleTokenCookie(article_token): ArticleTokenCookie,
    Json(request): Json<JsonRpcRequest<TreePanelChildrenParams>>,
) -> Result<Json<JsonRpcResponse<String>>, KnowledgeError> {
    let ctx = RequestContext::new(user, article_token);
    let html = state
        .knowledge
        .get_tree_panel_children(&ctx, request.params.parent_id)
        .await?;
    Ok(Json(JsonRpcResponse::reply(&request, html)))
}

/// get_tree_panel
///
/// [Public Route, JSON-RPC] Initial tree-panel payload, including the
/// articles unlocked by the cookie token.
#[utoipa::path(
    post,
    path = "/knowledge/tree_panel",
    request_body = TreePanelParams,
    responses((status = 200, description = "JSON-RPC envelope whose result is the tree payload", body = TreePanelValues))
)]
pub async fn get_tree_panel(
    State(state): State<AppState>,
    user: CurrentUser,
    ArticleTokenCookie(article_token): ArticleTokenCookie,
    Json(request): Json<JsonRpcRequest<TreePanelParams>>,
) -> Result<Json<JsonRpcResponse<TreePanelValues>>, KnowledgeError> {
    let ctx = RequestContext::new(user, article_token);
    let values = state
        .knowledge
        .prepare_articles_tree_html_values(&ctx, &request.params)
        .await?;
    Ok(Json(JsonRpcResponse::reply(&request, values)))
}
