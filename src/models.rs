use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use subtle::ConstantTimeEq;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentUser;

// --- Core Application Schemas (Mapped to Database) ---

/// ArticlePermission
///
/// Access granted to internal users on an article (`knowledge_articles.internal_permission`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[sqlx(type_name = "article_permission", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ArticlePermission {
    #[default]
    Write,
    Read,
    None,
}

/// Article
///
/// A node of the knowledge-base forest, read from `knowledge_articles`.
/// `has_article_children` is computed by the repository: it is set when at least
/// one child is not an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Article {
    pub id: i64,
    pub name: String,
    // Stored HTML body, authored by internal users.
    pub body: String,
    pub parent_id: Option<i64>,
    // Explicit ordering among siblings.
    pub sequence: i32,
    pub is_article_item: bool,
    pub has_article_children: bool,
    pub share_with_token: bool,

    /// The secret bound to this article. Never serialized.
    #[serde(skip)]
    pub access_token: Option<String>,

    pub is_published: bool,
    pub internal_permission: ArticlePermission,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Access-check predicate for an externally issued token.
    ///
    /// Passes only when the article carries a token equal to `token`. Empty
    /// tokens never pass. The comparison runs in constant time.
    pub fn check_access_token(&self, token: &str) -> bool {
        match self.access_token.as_deref() {
            Some(expected) if !expected.is_empty() && !token.is_empty() => {
                expected.as_bytes().ct_eq(token.as_bytes()).into()
            }
            _ => false,
        }
    }

    pub fn user_can_read(&self, user: &CurrentUser) -> bool {
        if user.is_internal() {
            self.internal_permission != ArticlePermission::None
        } else {
            self.is_published
        }
    }

    pub fn user_can_write(&self, user: &CurrentUser) -> bool {
        user.is_internal() && self.internal_permission == ArticlePermission::Write
    }
}

/// User
///
/// A profile row. Role `internal` is the base user group (backend access);
/// any other role is a portal/share user.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

// --- Derived, request-scoped values ---

/// VisibleArticleSet
///
/// What a token unlocks. `shared_articles` passed the token predicate directly;
/// `all_visible_articles` adds every descendant of those. Both are sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct VisibleArticleSet {
    pub shared_articles: Vec<Article>,
    pub all_visible_articles: Vec<Article>,
}

impl VisibleArticleSet {
    pub fn contains(&self, article_id: i64) -> bool {
        self.all_visible_articles
            .binary_search_by_key(&article_id, |a| a.id)
            .is_ok()
    }

    pub fn is_shared(&self, article_id: i64) -> bool {
        self.shared_articles
            .binary_search_by_key(&article_id, |a| a.id)
            .is_ok()
    }
}

/// TreePanelValues
///
/// Payload of the initial tree-panel render (POST /knowledge/tree_panel).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TreePanelValues {
    pub active_article_id: Option<i64>,
    pub unfolded_articles_ids: Vec<i64>,
    pub unfolded_favorite_articles_ids: Vec<i64>,
    pub root_articles: Vec<Article>,
    pub shared_articles: Vec<Article>,
    pub all_visible_articles: Vec<Article>,
    pub portal_readonly_mode: bool,
    // Computed eagerly so rendering never re-checks permissions row by row.
    #[ts(type = "Record<number, boolean>")]
    pub user_write_access_by_article: BTreeMap<i64, bool>,
}

// --- Request Payloads (Input Schemas) ---

/// TreePanelParams
///
/// Parameters of the initial tree-panel request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TreePanelParams {
    #[serde(default)]
    pub active_article_id: Option<i64>,
    #[serde(default)]
    pub unfolded_articles_ids: Vec<i64>,
    #[serde(default)]
    pub unfolded_favorite_articles_ids: Vec<i64>,
}

/// TreePanelChildrenParams
///
/// Parameters of the lazy child expansion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TreePanelChildrenParams {
    pub parent_id: i64,
}

/// JsonRpcRequest
///
/// JSON-RPC 2.0 envelope used by the tree-panel endpoints:
/// `{"jsonrpc": "2.0", "method": "call", "id": 1, "params": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest<P> {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub params: P,
}

impl<P> JsonRpcRequest<P> {
    pub fn call(params: P) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: Some("call".to_string()),
            id: None,
            params,
        }
    }
}

/// JsonRpcResponse
///
/// Echoes the request id back alongside the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse<R> {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub result: R,
}

impl<R> JsonRpcResponse<R> {
    pub fn reply<P>(request: &JsonRpcRequest<P>, result: R) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: request.id.clone(),
            result,
        }
    }
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, INTERNAL_ROLE};

    fn shared(token: Option<&str>) -> Article {
        Article {
            id: 1,
            access_token: token.map(str::to_string),
            ..Article::default()
        }
    }

    #[test]
    fn token_predicate_requires_exact_match() {
        let article = shared(Some("tok1"));
        assert!(article.check_access_token("tok1"));
        assert!(!article.check_access_token("tok2"));
        assert!(!article.check_access_token("tok"));
        assert!(!article.check_access_token(""));
    }

    #[test]
    fn token_predicate_rejects_articles_without_token() {
        assert!(!shared(None).check_access_token("tok1"));
        assert!(!shared(Some("")).check_access_token(""));
    }

    #[test]
    fn permissions_follow_user_kind() {
        let internal = CurrentUser::Authenticated(AuthUser {
            id: Uuid::from_u128(1),
            role: INTERNAL_ROLE.to_string(),
        });
        let portal = CurrentUser::Authenticated(AuthUser {
            id: Uuid::from_u128(2),
            role: "portal".to_string(),
        });

        let private = Article {
            internal_permission: ArticlePermission::Read,
            ..Article::default()
        };
        assert!(private.user_can_read(&internal));
        assert!(!private.user_can_write(&internal));
        assert!(!private.user_can_read(&portal));
        assert!(!private.user_can_read(&CurrentUser::Public));

        let published = Article {
            is_published: true,
            ..Article::default()
        };
        assert!(published.user_can_read(&CurrentUser::Public));
        assert!(published.user_can_write(&internal));
        assert!(!published.user_can_write(&portal));
    }

    #[test]
    fn jsonrpc_reply_echoes_id() {
        let mut request = JsonRpcRequest::call(TreePanelChildrenParams { parent_id: 3 });
        request.id = Some(serde_json::json!(7));
        let response = JsonRpcResponse::reply(&request, "ok");
        assert_eq!(response.id, Some(serde_json::json!(7)));
        assert_eq!(response.jsonrpc, "2.0");
    }
}
