//! HTML rendering for the tree panel and the portal article page.

use std::collections::BTreeMap;

use crate::models::{Article, TreePanelValues};

/// Named values available to `articles_template`.
pub struct ArticlesTemplateContext<'a> {
    pub articles: &'a [Article],
    pub articles_displayed_limit: usize,
    pub articles_displayed_offset: usize,
    pub portal_readonly_mode: bool,
    pub user_write_access_by_article: &'a BTreeMap<i64, bool>,
    pub has_parent: bool,
}

/// One level of the article tree.
///
/// Renders at most `articles_displayed_limit` rows starting at
/// `articles_displayed_offset`, followed by a "load more" row when truncated.
pub fn articles_template(ctx: &ArticlesTemplateContext<'_>) -> String {
    let nested = if ctx.has_parent { " o_tree_nested" } else { "" };
    let mut html = format!(
        r#"<ul class="o_knowledge_articles{nested}" data-readonly="{}">"#,
        ctx.portal_readonly_mode
    );

    let rows = ctx
        .articles
        .iter()
        .skip(ctx.articles_displayed_offset)
        .take(ctx.articles_displayed_limit);
    for article in rows {
        let can_write = ctx
            .user_write_access_by_article
            .get(&article.id)
            .copied()
            .unwrap_or(false);
        let has_children = if article.has_article_children {
            " o_article_has_children"
        } else {
            ""
        };
        html.push_str(&format!(
            r#"<li class="o_article{has_children}" data-article-id="{id}" data-can-write="{can_write}"><a href="/knowledge/article/{id}">{name}</a></li>"#,
            id = article.id,
            name = html_escape(&article.name),
        ));
    }

    let displayed_end = ctx
        .articles_displayed_offset
        .saturating_add(ctx.articles_displayed_limit);
    if ctx.articles.len() > displayed_end {
        html.push_str(&format!(
            r#"<li class="o_knowledge_article_load_more" data-offset="{displayed_end}" data-remaining="{}">Load more</li>"#,
            ctx.articles.len() - displayed_end
        ));
    }

    html.push_str("</ul>");
    html
}

/// Full read-only page of an article with its tree panel.
///
/// The body is stored HTML authored by internal users and is inserted as is.
pub fn portal_article_page(article: &Article, tree: &TreePanelValues, limit: usize) -> String {
    let shared = articles_template(&ArticlesTemplateContext {
        articles: &tree.shared_articles,
        articles_displayed_limit: limit,
        articles_displayed_offset: 0,
        portal_readonly_mode: tree.portal_readonly_mode,
        user_write_access_by_article: &tree.user_write_access_by_article,
        has_parent: false,
    });
    let workspace = articles_template(&ArticlesTemplateContext {
        articles: &tree.root_articles,
        articles_displayed_limit: limit,
        articles_displayed_offset: 0,
        portal_readonly_mode: tree.portal_readonly_mode,
        user_write_access_by_article: &tree.user_write_access_by_article,
        has_parent: false,
    });
    let name = html_escape(&article.name);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{name} - Knowledge</title>
</head>
<body class="o_knowledge_portal">
    <aside class="o_knowledge_tree" data-active-article-id="{id}">
        <section class="o_knowledge_tree_shared">{shared}</section>
        <section class="o_knowledge_tree_workspace">{workspace}</section>
    </aside>
    <main class="o_knowledge_article" data-article-id="{id}" data-readonly="{readonly}">
        <h1>{name}</h1>
        <div class="o_knowledge_body">{body}</div>
    </main>
</body>
</html>"#,
        id = article.id,
        readonly = tree.portal_readonly_mode,
        body = article.body,
    )
}

/// Simple HTML escape function
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(id: i64, name: &str) -> Article {
        Article {
            id,
            name: name.to_string(),
            ..Article::default()
        }
    }

    #[test]
    fn escapes_article_names() {
        let articles = vec![named(1, "<script>alert('x')</script>")];
        let html = articles_template(&ArticlesTemplateContext {
            articles: &articles,
            articles_displayed_limit: 10,
            articles_displayed_offset: 0,
            portal_readonly_mode: true,
            user_write_access_by_article: &BTreeMap::new(),
            has_parent: true,
        });
        assert!(html.contains("&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"));
        assert!(html.contains(r#"class="o_knowledge_articles o_tree_nested" data-readonly="true""#));
    }

    #[test]
    fn truncates_to_limit_with_load_more() {
        let articles: Vec<Article> = (1..=5).map(|i| named(i, &format!("A{i}"))).collect();
        let html = articles_template(&ArticlesTemplateContext {
            articles: &articles,
            articles_displayed_limit: 2,
            articles_displayed_offset: 1,
            portal_readonly_mode: false,
            user_write_access_by_article: &BTreeMap::from([(2, true)]),
            has_parent: false,
        });
        assert!(!html.contains(r#"data-article-id="1""#));
        assert!(html.contains(r#"data-article-id="2" data-can-write="true""#));
        assert!(html.contains(r#"data-article-id="3" data-can-write="false""#));
        assert!(!html.contains(r#"data-article-id="4""#));
        assert!(html.contains(r#"data-offset="3" data-remaining="2""#));
    }

    #[test]
    fn empty_level_renders_empty_list() {
        let html = articles_template(&ArticlesTemplateContext {
            articles: &[],
            articles_displayed_limit: 50,
            articles_displayed_offset: 0,
            portal_readonly_mode: true,
            user_write_access_by_article: &BTreeMap::new(),
            has_parent: true,
        });
        assert_eq!(
            html,
            r#"<ul class="o_knowledge_articles o_tree_nested" data-readonly="true"></ul>"#
        );
    }
}
