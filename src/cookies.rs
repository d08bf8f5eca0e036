//! The `k_article_token` cookie: where a validated article token is cached
//! between requests.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

/// Cookie name
pub const ARTICLE_TOKEN_COOKIE: &str = "k_article_token";

/// Extract the article token from the request's `Cookie` headers.
///
/// The value is percent-decoded; an empty value counts as absent.
pub fn article_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| {
            cookie
                .trim()
                .strip_prefix(ARTICLE_TOKEN_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .filter_map(|raw| urlencoding::decode(raw).ok().map(|v| v.into_owned()))
        .find(|token| !token.is_empty())
}

/// Build the `Set-Cookie` value caching `token` for `max_age_secs`.
pub fn article_token_set_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ARTICLE_TOKEN_COOKIE,
        urlencoding::encode(token),
        max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// ArticleTokenCookie
///
/// Extractor yielding the cached token, if any. Never rejects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleTokenCookie(pub Option<String>);

impl<S> FromRequestParts<S> for ArticleTokenCookie
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ArticleTokenCookie(article_token_from_headers(&parts.headers)))
    }
}
