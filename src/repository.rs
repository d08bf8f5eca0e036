use crate::error::KnowledgeError;
use crate::models::{Article, User};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Repository Trait
///
/// Read-only persistence contract consumed by the controllers. Handlers never
/// see the concrete store: Postgres in production, `MemoryRepository` in tests
/// and local demos.
///
/// Every article-returning method yields fully hydrated records
/// (`has_article_children` computed).
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Article>, KnowledgeError>;

    /// Articles whose parent is in `parent_ids` and whose id is not in
    /// `exclude_ids`, ordered by sequence then id.
    async fn find_by_parent_in(
        &self,
        parent_ids: &[i64],
        exclude_ids: &[i64],
    ) -> Result<Vec<Article>, KnowledgeError>;

    /// Top-level articles, ordered by sequence then id.
    async fn find_roots(&self) -> Result<Vec<Article>, KnowledgeError>;

    /// Every article, ordered by id.
    async fn scan_all(&self) -> Result<Vec<Article>, KnowledgeError>;

    /// `seeds` plus all of their descendants, ordered by id.
    ///
    /// The default walks the tree one level per `find_by_parent_in` call until
    /// a round adds nothing. Stores able to answer in a single recursive query
    /// override it.
    async fn expand_descendants(&self, seeds: Vec<Article>) -> Result<Vec<Article>, KnowledgeError> {
        let mut visible: BTreeMap<i64, Article> = seeds.into_iter().map(|a| (a.id, a)).collect();
        let mut frontier: Vec<i64> = visible.keys().copied().collect();

        while !frontier.is_empty() {
            let members: Vec<i64> = visible.keys().copied().collect();
            let found = self.find_by_parent_in(&frontier, &members).await?;
            frontier.clear();
            for article in found {
                // Membership is re-checked so a store ignoring `exclude_ids` still terminates.
                if !visible.contains_key(&article.id) {
                    frontier.push(article.id);
                    visible.insert(article.id, article);
                }
            }
        }

        Ok(visible.into_values().collect())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, KnowledgeError>;
}

/// RepositoryState
///
/// The shared handle stored in the application state.
pub type RepositoryState = Arc<dyn Repository>;

const ARTICLE_COLUMNS: &str = r#"
    a.id, a.name, a.body, a.parent_id, a.sequence, a.is_article_item,
    EXISTS (
        SELECT 1 FROM knowledge_articles c
        WHERE c.parent_id = a.id AND NOT c.is_article_item
    ) AS has_article_children,
    a.share_with_token, a.access_token, a.is_published, a.internal_permission,
    a.created_at, a.updated_at
"#;

/// PostgresRepository
///
/// `Repository` backed by the `knowledge_articles` and `profiles` tables.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn log_db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> KnowledgeError {
    move |e| {
        tracing::error!("{} error: {:?}", context, e);
        KnowledgeError::from(e)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Article>, KnowledgeError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM knowledge_articles a WHERE a.id = $1");
        sqlx::query_as::<_, Article>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(log_db_error("find_by_id"))
    }

    async fn find_by_parent_in(
        &self,
        parent_ids: &[i64],
        exclude_ids: &[i64],
    ) -> Result<Vec<Article>, KnowledgeError> {
        if parent_ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM knowledge_articles a \
             WHERE a.parent_id = ANY($1) AND NOT (a.id = ANY($2)) \
             ORDER BY a.sequence, a.id"
        );
        sqlx::query_as::<_, Article>(&sql)
            .bind(parent_ids.to_vec())
            .bind(exclude_ids.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(log_db_error("find_by_parent_in"))
    }

    async fn find_roots(&self) -> Result<Vec<Article>, KnowledgeError> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM knowledge_articles a \
             WHERE a.parent_id IS NULL ORDER BY a.sequence, a.id"
        );
        sqlx::query_as::<_, Article>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(log_db_error("find_roots"))
    }

    async fn scan_all(&self) -> Result<Vec<Article>, KnowledgeError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM knowledge_articles a ORDER BY a.id");
        sqlx::query_as::<_, Article>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(log_db_error("scan_all"))
    }

    /// expand_descendants
    ///
    /// One recursive CTE instead of one query per tree level. `UNION` (not
    /// `UNION ALL`) deduplicates, so a corrupted cyclic parent chain still terminates.
    async fn expand_descendants(&self, seeds: Vec<Article>) -> Result<Vec<Article>, KnowledgeError> {
        if seeds.is_empty() {
            return Ok(vec![]);
        }
        let seed_ids: Vec<i64> = seeds.iter().map(|a| a.id).collect();
        let sql = format!(
            r#"
            WITH RECURSIVE visible(id) AS (
                SELECT id FROM knowledge_articles WHERE id = ANY($1)
                UNION
                SELECT k.id FROM knowledge_articles k JOIN visible v ON k.parent_id = v.id
            )
            SELECT {ARTICLE_COLUMNS} FROM knowledge_articles a
            WHERE a.id IN (SELECT id FROM visible)
            ORDER BY a.id
            "#
        );
        sqlx::query_as::<_, Article>(&sql)
            .bind(seed_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(log_db_error("expand_descendants"))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, KnowledgeError> {
        sqlx::query_as::<_, User>("SELECT id, email, role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(log_db_error("get_user"))
    }
}

/// MemoryRepository
///
/// In-process `Repository` used by the test suites and for running the service
/// without a database. Uses the generic level-by-level `expand_descendants`.
#[derive(Default)]
pub struct MemoryRepository {
    articles: RwLock<BTreeMap<i64, Article>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(articles: Vec<Article>, users: Vec<User>) -> Self {
        Self {
            articles: RwLock::new(articles.into_iter().map(|a| (a.id, a)).collect()),
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }

    pub async fn insert_article(&self, article: Article) {
        self.articles.write().await.insert(article.id, article);
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    /// Ids of the articles with at least one non-item child, in one pass.
    fn parents_with_children(all: &BTreeMap<i64, Article>) -> HashSet<i64> {
        all.values()
            .filter(|child| !child.is_article_item)
            .filter_map(|child| child.parent_id)
            .collect()
    }

    fn hydrate(parents: &HashSet<i64>, article: &Article) -> Article {
        Article {
            has_article_children: parents.contains(&article.id),
            ..article.clone()
        }
    }

    fn sorted_by_sequence(mut articles: Vec<Article>) -> Vec<Article> {
        articles.sort_by_key(|a| (a.sequence, a.id));
        articles
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Article>, KnowledgeError> {
        let articles = self.articles.read().await;
        let parents = Self::parents_with_children(&articles);
        Ok(articles.get(&id).map(|a| Self::hydrate(&parents, a)))
    }

    async fn find_by_parent_in(
        &self,
        parent_ids: &[i64],
        exclude_ids: &[i64],
    ) -> Result<Vec<Article>, KnowledgeError> {
        let articles = self.articles.read().await;
        let parents = Self::parents_with_children(&articles);
        let found = articles
            .values()
            .filter(|a| a.parent_id.is_some_and(|p| parent_ids.contains(&p)))
            .filter(|a| !exclude_ids.contains(&a.id))
            .map(|a| Self::hydrate(&parents, a))
            .collect();
        Ok(Self::sorted_by_sequence(found))
    }

    async fn find_roots(&self) -> Result<Vec<Article>, KnowledgeError> {
        let articles = self.articles.read().await;
        let parents = Self::parents_with_children(&articles);
        let roots = articles
            .values()
            .filter(|a| a.parent_id.is_none())
            .map(|a| Self::hydrate(&parents, a))
            .collect();
        Ok(Self::sorted_by_sequence(roots))
    }

    async fn scan_all(&self) -> Result<Vec<Article>, KnowledgeError> {
        let articles = self.articles.read().await;
        let parents = Self::parents_with_children(&articles);
        Ok(articles.values().map(|a| Self::hydrate(&parents, a)).collect())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, KnowledgeError> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}
