//! Article routing policy.
//!
//! `BaseKnowledgeController` holds the default behaviour of the knowledge
//! routes. `TokenShareController` wraps any `KnowledgeController` and layers
//! token-based public sharing on top, calling the wrapped controller whenever
//! the token does not apply.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    http::{HeaderValue, header},
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::{
    auth::CurrentUser,
    config::AppConfig,
    cookies::article_token_set_cookie,
    error::KnowledgeError,
    models::{Article, TreePanelParams, TreePanelValues, VisibleArticleSet},
    repository::RepositoryState,
    sharing::{display_article_data_from_token, union_articles},
    templates::{self, ArticlesTemplateContext},
};

/// RequestContext
///
/// Per-request inputs threaded explicitly through every controller operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub user: CurrentUser,
    /// Value of the `k_article_token` cookie, if any.
    pub article_token: Option<String>,
    /// What `article_token` unlocks, once computed for this request.
    pub token_articles: Option<Arc<VisibleArticleSet>>,
}

impl RequestContext {
    pub fn new(user: CurrentUser, article_token: Option<String>) -> Self {
        Self {
            user,
            article_token,
            token_articles: None,
        }
    }

    pub fn with_article_token(&self, token: &str) -> Self {
        Self {
            user: self.user.clone(),
            article_token: Some(token.to_string()),
            token_articles: None,
        }
    }

    pub fn with_token_articles(&self, visible: Arc<VisibleArticleSet>) -> Self {
        Self {
            token_articles: Some(visible),
            ..self.clone()
        }
    }
}

/// Where an article request ends up.
#[derive(Debug, Clone, PartialEq)]
pub enum ArticleView {
    /// Redirect to the authenticated, editable view.
    Backend { article_id: i64 },
    /// Rendered public, read-only page.
    Portal { html: String },
    /// Redirect to the login page, coming back to `redirect` afterwards.
    Login { redirect: String },
}

pub fn backend_url(article_id: i64) -> String {
    format!("/web#id={article_id}&model=knowledge.article&view_type=form")
}

/// ArticleResponse
///
/// An `ArticleView` plus an optional `Set-Cookie` value.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleResponse {
    pub view: ArticleView,
    pub set_cookie: Option<String>,
}

impl ArticleResponse {
    pub fn view(view: ArticleView) -> Self {
        Self {
            view,
            set_cookie: None,
        }
    }
}

impl IntoResponse for ArticleResponse {
    fn into_response(self) -> Response {
        let mut response = match self.view {
            ArticleView::Backend { article_id } => Redirect::to(&backend_url(article_id)).into_response(),
            ArticleView::Portal { html } => Html(html).into_response(),
            ArticleView::Login { redirect } => Redirect::to(&format!(
                "/web/login?redirect={}",
                urlencoding::encode(&redirect)
            ))
            .into_response(),
        };
        if let Some(value) = self.set_cookie.and_then(|c| HeaderValue::from_str(&c).ok()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        response
    }
}

/// KnowledgeController
///
/// Behaviour of the knowledge routes. Implementations are composed: an
/// overriding controller owns the default one and delegates to it.
#[async_trait]
pub trait KnowledgeController: Send + Sync {
    /// Number of rows rendered per tree-panel level.
    fn articles_displayed_limit(&self) -> usize;

    /// GET /knowledge/article/{article_id}
    ///
    /// Implementations resolve with themselves as the tree source:
    /// `self.resolve_article(ctx, article_id, self)`.
    async fn redirect_to_article(
        &self,
        ctx: &RequestContext,
        article_id: i64,
    ) -> Result<ArticleResponse, KnowledgeError>;

    /// Article resolution proper. Portal pages are rendered through
    /// `tree.portal_view`, the outermost controller of the stack, so wrapped
    /// controllers still show the tree panel their wrapper computes.
    async fn resolve_article(
        &self,
        ctx: &RequestContext,
        article_id: i64,
        tree: &dyn KnowledgeController,
    ) -> Result<ArticleResponse, KnowledgeError>;

    /// GET /knowledge/article/{article_id}/{access_token}
    ///
    /// Controllers without token sharing refuse every token.
    async fn redirect_to_article_with_token(
        &self,
        _ctx: &RequestContext,
        article_id: i64,
        _access_token: &str,
    ) -> Result<ArticleResponse, KnowledgeError> {
        tracing::debug!(article_id, "token sharing disabled");
        Err(KnowledgeError::Forbidden)
    }

    /// One level of the tree panel, rendered as an HTML fragment.
    async fn get_tree_panel_children(
        &self,
        ctx: &RequestContext,
        parent_id: i64,
    ) -> Result<String, KnowledgeError>;

    /// Initial tree-panel payload.
    async fn prepare_articles_tree_html_values(
        &self,
        ctx: &RequestContext,
        params: &TreePanelParams,
    ) -> Result<TreePanelValues, KnowledgeError>;

    /// Read-only page of `article`, with the tree panel as this controller computes it.
    async fn portal_view(
        &self,
        ctx: &RequestContext,
        article: Article,
    ) -> Result<ArticleView, KnowledgeError> {
        let params = TreePanelParams {
            active_article_id: Some(article.id),
            ..TreePanelParams::default()
        };
        let tree = self.prepare_articles_tree_html_values(ctx, &params).await?;
        Ok(ArticleView::Portal {
            html: templates::portal_article_page(&article, &tree, self.articles_displayed_limit()),
        })
    }
}

/// KnowledgeState
///
/// The controller stack shared through the application state.
pub type KnowledgeState = Arc<dyn KnowledgeController>;

/// Builds the controller stack: the token layer wraps the default controller
/// unless `share_with_token` is disabled.
pub fn knowledge_controller(repo: RepositoryState, config: &AppConfig) -> KnowledgeState {
    let base = BaseKnowledgeController::new(repo.clone(), config.clone());
    if config.share_with_token {
        Arc::new(TokenShareController::new(base, repo, config.clone()))
    } else {
        Arc::new(base)
    }
}

fn article_not_found(article_id: i64) -> KnowledgeError {
    KnowledgeError::NotFound(format!("article {article_id}"))
}

/// Children of `parent` worth showing in the tree: no items, ordered by sequence.
fn displayable_children(parent: &Article, candidates: Vec<Article>) -> Vec<Article> {
    if !parent.has_article_children {
        return vec![];
    }
    let mut children: Vec<Article> = candidates
        .into_iter()
        .filter(|a| a.parent_id == Some(parent.id) && !a.is_article_item)
        .collect();
    children.sort_by_key(|a| (a.sequence, a.id));
    children
}

fn render_tree_children(children: &[Article], user: &CurrentUser, limit: usize) -> String {
    let user_write_access_by_article: BTreeMap<i64, bool> = children
        .iter()
        .map(|a| (a.id, a.user_can_write(user)))
        .collect();
    templates::articles_template(&ArticlesTemplateContext {
        articles: children,
        articles_displayed_limit: limit,
        articles_displayed_offset: 0,
        portal_readonly_mode: !user.is_internal(),
        user_write_access_by_article: &user_write_access_by_article,
        has_parent: true,
    })
}

// --- Default behaviour ---

/// BaseKnowledgeController
///
/// Permission-based behaviour: internal users follow `internal_permission`,
/// everyone else sees published articles only.
pub struct BaseKnowledgeController {
    repo: RepositoryState,
    config: AppConfig,
}

impl BaseKnowledgeController {
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self { repo, config }
    }
}

#[async_trait]
impl KnowledgeController for BaseKnowledgeController {
    fn articles_displayed_limit(&self) -> usize {
        self.config.tree_articles_limit
    }

    async fn redirect_to_article(
        &self,
        ctx: &RequestContext,
        article_id: i64,
    ) -> Result<ArticleResponse, KnowledgeError> {
        self.resolve_article(ctx, article_id, self).await
    }

    /// Anonymous callers get published articles or the login page, internal
    /// users the backend, portal users whatever they can read.
    async fn resolve_article(
        &self,
        ctx: &RequestContext,
        article_id: i64,
        tree: &dyn KnowledgeController,
    ) -> Result<ArticleResponse, KnowledgeError> {
        let article = self
            .repo
            .find_by_id(article_id)
            .await?
            .ok_or_else(|| article_not_found(article_id))?;

        let view = match &ctx.user {
            CurrentUser::Public if !article.is_published => ArticleView::Login {
                redirect: format!("/knowledge/article/{article_id}"),
            },
            user if user.is_internal() => ArticleView::Backend { article_id },
            user if article.user_can_read(user) => tree.portal_view(ctx, article).await?,
            _ => return Err(article_not_found(article_id)),
        };
        Ok(ArticleResponse::view(view))
    }

    async fn get_tree_panel_children(
        &self,
        ctx: &RequestContext,
        parent_id: i64,
    ) -> Result<String, KnowledgeError> {
        let parent = self
            .repo
            .find_by_id(parent_id)
            .await?
            .filter(|parent| parent.user_can_read(&ctx.user))
            .ok_or_else(|| article_not_found(parent_id))?;

        let candidates = if parent.has_article_children {
            self.repo
                .find_by_parent_in(&[parent.id], &[])
                .await?
                .into_iter()
                .filter(|a| a.user_can_read(&ctx.user))
                .collect()
        } else {
            vec![]
        };
        let children = displayable_children(&parent, candidates);
        Ok(render_tree_children(&children, &ctx.user, self.config.tree_articles_limit))
    }

    /// Roots readable by the caller, plus the readable articles whose parent is
    /// hidden from them (`shared_articles`), which the tree could not reach otherwise.
    async fn prepare_articles_tree_html_values(
        &self,
        ctx: &RequestContext,
        params: &TreePanelParams,
    ) -> Result<TreePanelValues, KnowledgeError> {
        let user = &ctx.user;
        let all_visible_articles: Vec<Article> = self
            .repo
            .scan_all()
            .await?
            .into_iter()
            .filter(|a| a.user_can_read(user))
            .collect();

        let visible_ids: std::collections::BTreeSet<i64> =
            all_visible_articles.iter().map(|a| a.id).collect();

        let root_articles: Vec<Article> = self
            .repo
            .find_roots()
            .await?
            .into_iter()
            .filter(|a| !a.is_article_item && visible_ids.contains(&a.id))
            .collect();

        let shared_articles: Vec<Article> = all_visible_articles
            .iter()
            .filter(|a| a.parent_id.is_some_and(|p| !visible_ids.contains(&p)))
            .cloned()
            .collect();

        let user_write_access_by_article = all_visible_articles
            .iter()
            .map(|a| (a.id, a.user_can_write(user)))
            .collect();

        Ok(TreePanelValues {
            active_article_id: params.active_article_id,
            unfolded_articles_ids: params.unfolded_articles_ids.clone(),
            unfolded_favorite_articles_ids: params.unfolded_favorite_articles_ids.clone(),
            root_articles,
            shared_articles,
            all_visible_articles,
            portal_readonly_mode: !user.is_internal(),
            user_write_access_by_article,
        })
    }
}

// --- Token sharing ---

/// TokenShareController
///
/// Lets holders of an article access token read the shared articles and their
/// descendants without an account. The token reaches the server once through
/// the token route, is cached in the `k_article_token` cookie, and is then
/// honoured by the article, tree-panel and tree-children operations.
pub struct TokenShareController<B> {
    inner: B,
    repo: RepositoryState,
    config: AppConfig,
}

impl<B: KnowledgeController> TokenShareController<B> {
    pub fn new(inner: B, repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            inner,
            repo,
            config,
        }
    }

    /// The visible set of the cookie token, when a non-empty one is present.
    /// Reuses the set already attached to `ctx`.
    async fn visible_from_cookie(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<VisibleArticleSet>>, KnowledgeError> {
        if let Some(visible) = &ctx.token_articles {
            return Ok(Some(visible.clone()));
        }
        match ctx.article_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(Some(Arc::new(
                display_article_data_from_token(self.repo.as_ref(), token).await?,
            ))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl<B: KnowledgeController> KnowledgeController for TokenShareController<B> {
    fn articles_displayed_limit(&self) -> usize {
        self.config.tree_articles_limit
    }

    async fn redirect_to_article(
        &self,
        ctx: &RequestContext,
        article_id: i64,
    ) -> Result<ArticleResponse, KnowledgeError> {
        self.resolve_article(ctx, article_id, self).await
    }

    /// Anonymous callers whose cookie token reaches the article get the portal
    /// view. Everything else goes to the wrapped controller, which still
    /// renders portal pages through `tree`.
    async fn resolve_article(
        &self,
        ctx: &RequestContext,
        article_id: i64,
        tree: &dyn KnowledgeController,
    ) -> Result<ArticleResponse, KnowledgeError> {
        if !ctx.user.is_public() {
            return self.inner.resolve_article(ctx, article_id, tree).await;
        }

        let article = self
            .repo
            .find_by_id(article_id)
            .await?
            .ok_or_else(|| article_not_found(article_id))?;

        let Some(visible) = self.visible_from_cookie(ctx).await? else {
            return self.inner.resolve_article(ctx, article_id, tree).await;
        };
        let ctx = ctx.with_token_articles(visible.clone());

        if visible.contains(article.id) {
            tracing::info!(article_id, "cookie token grants portal access");
            let view = tree.portal_view(&ctx, article).await?;
            return Ok(ArticleResponse::view(view));
        }
        tracing::debug!(article_id, "cookie token does not reach article");
        self.inner.resolve_article(&ctx, article_id, tree).await
    }

    /// Checks `access_token` against the article itself. On success the token
    /// is cached in the cookie; internal users go to the backend, everyone else
    /// to the portal page.
    async fn redirect_to_article_with_token(
        &self,
        ctx: &RequestContext,
        article_id: i64,
        access_token: &str,
    ) -> Result<ArticleResponse, KnowledgeError> {
        let article = match self.repo.find_by_id(article_id).await? {
            Some(article) if !access_token.is_empty() && article.share_with_token => article,
            _ => {
                tracing::warn!(article_id, "article token request refused");
                return Err(KnowledgeError::Forbidden);
            }
        };

        if !article.check_access_token(access_token) {
            tracing::warn!(article_id, "article token rejected");
            return Err(article_not_found(article_id));
        }

        let set_cookie = article_token_set_cookie(
            access_token,
            self.config.article_token_max_age_secs,
            self.config.cookie_secure,
        );

        let view = if ctx.user.is_internal() {
            ArticleView::Backend { article_id }
        } else {
            // The cookie only arrives with the next request; render with the token now.
            let ctx = ctx.with_article_token(access_token);
            self.portal_view(&ctx, article).await?
        };

        tracing::info!(article_id, internal = ctx.user.is_internal(), "article token accepted");
        Ok(ArticleResponse {
            view,
            set_cookie: Some(set_cookie),
        })
    }

    async fn get_tree_panel_children(
        &self,
        ctx: &RequestContext,
        parent_id: i64,
    ) -> Result<String, KnowledgeError> {
        if let Some(visible) = self.visible_from_cookie(ctx).await? {
            if visible.contains(parent_id) {
                if let Some(parent) = self.repo.find_by_id(parent_id).await? {
                    let candidates = if parent.has_article_children {
                        self.repo.find_by_parent_in(&[parent.id], &[]).await?
                    } else {
                        vec![]
                    };
                    let children = displayable_children(&parent, candidates);
                    return Ok(render_tree_children(
                        &children,
                        &ctx.user,
                        self.config.tree_articles_limit,
                    ));
                }
            }
        }
        self.inner.get_tree_panel_children(ctx, parent_id).await
    }

    /// Adds the token's articles to the default payload so token-granted
    /// articles appear in the first render.
    async fn prepare_articles_tree_html_values(
        &self,
        ctx: &RequestContext,
        params: &TreePanelParams,
    ) -> Result<TreePanelValues, KnowledgeError> {
        let mut values = self.inner.prepare_articles_tree_html_values(ctx, params).await?;

        if let Some(visible) = self.visible_from_cookie(ctx).await? {
            values.shared_articles = union_articles(
                std::mem::take(&mut values.shared_articles),
                visible.shared_articles.clone(),
            );
            values.all_visible_articles = union_articles(
                std::mem::take(&mut values.all_visible_articles),
                visible.all_visible_articles.clone(),
            );
            for article in &values.all_visible_articles {
                values
                    .user_write_access_by_article
                    .entry(article.id)
                    .or_insert_with(|| article.user_can_write(&ctx.user));
            }
        }
        Ok(values)
    }
}
