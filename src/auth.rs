use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::KnowledgeError,
    repository::RepositoryState,
};

/// Role of the base user group: users allowed into the backend.
pub const INTERNAL_ROLE: &str = "internal";

/// Claims
///
/// Payload expected inside a bearer JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the UUID of the user's profile.
    pub sub: Uuid,
    /// Expiration time; always validated.
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    /// `internal` for backend users, anything else for portal/share users.
    pub role: String,
}

/// CurrentUser
///
/// Who is calling. Every knowledge route is public, so a missing identity is
/// not an error: it yields `CurrentUser::Public`.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentUser {
    Public,
    Authenticated(AuthUser),
}

impl CurrentUser {
    pub fn is_public(&self) -> bool {
        matches!(self, CurrentUser::Public)
    }

    /// Membership of the base user group.
    pub fn is_internal(&self) -> bool {
        matches!(self, CurrentUser::Authenticated(user) if user.role == INTERNAL_ROLE)
    }
}

/// CurrentUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing
///    profile authenticates the request.
/// 2. No `Authorization` header: the caller is anonymous.
/// 3. Otherwise the bearer JWT must decode, be unexpired, and name an existing
///    profile; any failure rejects with 401.
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = KnowledgeError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id_str| Uuid::parse_str(id_str).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(CurrentUser::Authenticated(AuthUser {
                        id: user.id,
                        role: user.role,
                    }));
                }
            }
        }

        let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(CurrentUser::Public);
        };

        let token = auth_header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(KnowledgeError::Unauthorized)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!("bearer token rejected: {:?}", e.kind());
            KnowledgeError::Unauthorized
        })?;

        // A deleted profile invalidates otherwise valid tokens.
        let user = repo
            .get_user(token_data.claims.sub)
            .await?
            .ok_or(KnowledgeError::Unauthorized)?;

        Ok(CurrentUser::Authenticated(AuthUser {
            id: user.id,
            role: user.role,
        }))
    }
}
