//! What an article access token unlocks.

use std::collections::BTreeMap;

use crate::error::KnowledgeError;
use crate::models::{Article, VisibleArticleSet};
use crate::repository::Repository;

/// display_article_data_from_token
///
/// Computes the `VisibleArticleSet` of `token`:
/// 1. `shared_articles`: every article whose token predicate passes and whose
///    `share_with_token` flag is set.
/// 2. `all_visible_articles`: those plus every descendant, closed downward
///    through parent -> child links until a fixed point.
///
/// No side effects; recomputing without intervening writes yields the same sets.
pub async fn display_article_data_from_token(
    repo: &dyn Repository,
    token: &str,
) -> Result<VisibleArticleSet, KnowledgeError> {
    if token.is_empty() {
        return Ok(VisibleArticleSet::default());
    }

    let shared_articles: Vec<Article> = repo
        .scan_all()
        .await?
        .into_iter()
        .filter(|article| article.share_with_token && article.check_access_token(token))
        .collect();

    let all_visible_articles = if shared_articles.is_empty() {
        vec![]
    } else {
        repo.expand_descendants(shared_articles.clone()).await?
    };

    tracing::debug!(
        shared = shared_articles.len(),
        visible = all_visible_articles.len(),
        "resolved article token"
    );

    Ok(VisibleArticleSet {
        shared_articles: sorted_by_id(shared_articles),
        all_visible_articles: sorted_by_id(all_visible_articles),
    })
}

/// Union of two article lists keyed by id, sorted by id. On duplicates the
/// record from `left` wins.
pub fn union_articles(left: Vec<Article>, right: Vec<Article>) -> Vec<Article> {
    let mut merged: BTreeMap<i64, Article> = BTreeMap::new();
    for article in right.into_iter().chain(left) {
        merged.insert(article.id, article);
    }
    merged.into_values().collect()
}

fn sorted_by_id(articles: Vec<Article>) -> Vec<Article> {
    union_articles(articles, vec![])
}
