use axum::{
    extract::FromRequestParts,
    http::{Method, Request, Uri, header, request::Parts},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use knowledge_share::{
    AppState, KnowledgeError, MemoryRepository,
    auth::{AuthUser, Claims, CurrentUser, INTERNAL_ROLE},
    config::{AppConfig, Env},
    models::User,
};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn create_token(user_id: Uuid, secret: &str, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn create_app_state(env: Env, users: Vec<User>) -> AppState {
    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState::new(Arc::new(MemoryRepository::with_data(vec![], users)), config)
}

fn internal_user() -> User {
    User {
        id: TEST_USER_ID,
        email: "staff@example.com".to_string(),
        role: INTERNAL_ROLE.to_string(),
    }
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_missing_header_is_anonymous() {
    let app_state = create_app_state(Env::Production, vec![]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let user = CurrentUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(user, Ok(CurrentUser::Public));
}

#[tokio::test]
async fn test_valid_jwt_resolves_internal_user() {
    let app_state = create_app_state(Env::Production, vec![internal_user()]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, TEST_JWT_SECRET, 3600));

    let user = CurrentUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(
        user,
        CurrentUser::Authenticated(AuthUser {
            id: TEST_USER_ID,
            role: INTERNAL_ROLE.to_string(),
        })
    );
    assert!(user.is_internal());
    assert!(!user.is_public());
}

#[tokio::test]
async fn test_portal_role_is_not_internal() {
    let portal = User {
        role: "portal".to_string(),
        ..internal_user()
    };
    let app_state = create_app_state(Env::Production, vec![portal]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, TEST_JWT_SECRET, 3600));

    let user = CurrentUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert!(!user.is_internal());
    assert!(!user.is_public());
}

#[tokio::test]
async fn test_wrong_signature_is_rejected() {
    let app_state = create_app_state(Env::Production, vec![internal_user()]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, "another-secret", 3600));

    let user = CurrentUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(user, Err(KnowledgeError::Unauthorized));
}

#[tokio::test]
async fn test_expired_jwt_is_rejected() {
    let app_state = create_app_state(Env::Production, vec![internal_user()]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Well past the default 60 second leeway.
    with_bearer(&mut parts, &create_token(TEST_USER_ID, TEST_JWT_SECRET, -3600));

    let user = CurrentUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(user, Err(KnowledgeError::Unauthorized));
}

#[tokio::test]
async fn test_non_bearer_scheme_is_rejected() {
    let app_state = create_app_state(Env::Production, vec![internal_user()]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_static("Basic dXNlcjpwYXNz"),
    );

    let user = CurrentUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(user, Err(KnowledgeError::Unauthorized));
}

#[tokio::test]
async fn test_deleted_profile_is_rejected() {
    let app_state = create_app_state(Env::Production, vec![]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, TEST_JWT_SECRET, 3600));

    let user = CurrentUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(user, Err(KnowledgeError::Unauthorized));
}

#[tokio::test]
async fn test_local_bypass_success() {
    let app_state = create_app_state(Env::Local, vec![internal_user()]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&TEST_USER_ID.to_string()).unwrap(),
    );

    let user = CurrentUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert!(user.is_internal());
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let app_state = create_app_state(Env::Production, vec![internal_user()]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Provide ONLY the local bypass header
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&TEST_USER_ID.to_string()).unwrap(),
    );

    let user = CurrentUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(user, Ok(CurrentUser::Public));
}
