//! Resilience tests for Chirpy
//!
//! These tests verify behavior under contention and hostile input:
//! - Concurrent revocation of the same refresh token
//! - Concurrent exchanges racing a revocation
//! - Tampered and re-signed access tokens
//! - Storage outliving its users

use chirpy::auth::{
    hash_password, AccessClaims, AccessToken, ApiKey, AuthConfig, AuthError, ErrorKind, TokenError,
};
use chirpy::storage::{MemoryStore, RevokeOutcome, UserStore};
use chirpy::AuthGuard;
use axum::http::{header, HeaderMap, HeaderValue};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use std::sync::Arc;

const SECRET: &[u8] = b"resilience-secret";

async fn guard_with_user() -> (Arc<AuthGuard>, Arc<MemoryStore>, String) {
    let store = Arc::new(MemoryStore::new());
    let hashed = hash_password("hunter2").unwrap();
    store.create_user("racer@example.com", &hashed).await.unwrap();

    let guard = Arc::new(AuthGuard::new(
        AuthConfig::new(SECRET, ApiKey::new("key".to_string())),
        store.clone(),
    ));
    let session = guard.login("racer@example.com", "hunter2").await.unwrap();
    (guard, store, session.refresh_token.token)
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

/// Exactly one of many concurrent revocations wins
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_revoke_single_winner() {
    let (guard, _store, refresh) = guard_with_user().await;

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let guard = guard.clone();
            let refresh = refresh.clone();
            tokio::spawn(async move { guard.revoke(&refresh).await })
        })
        .collect();

    let mut revoked = 0;
    let mut already = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RevokeOutcome::Revoked => revoked += 1,
            RevokeOutcome::AlreadyRevoked => already += 1,
        }
    }

    assert_eq!(revoked, 1);
    assert_eq!(already, 31);
    assert!(matches!(guard.exchange(&refresh).await, Err(AuthError::Revoked)));
}

/// Exchanges do not consume the refresh token
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchanges_all_succeed() {
    let (guard, store, refresh) = guard_with_user().await;
    let before = store.refresh_token_count();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let guard = guard.clone();
            let refresh = refresh.clone();
            tokio::spawn(async move { guard.exchange(&refresh).await })
        })
        .collect();

    let user = store.get_user_by_email("racer@example.com").await.unwrap();
    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(AccessToken::validate(&token, SECRET).unwrap(), user.id);
    }

    assert_eq!(store.refresh_token_count(), before);
}

/// An exchange racing a revoke either succeeds or sees Revoked, never anything else
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exchange_racing_revoke() {
    let (guard, _store, refresh) = guard_with_user().await;

    let exchangers: Vec<_> = (0..16)
        .map(|_| {
            let guard = guard.clone();
            let refresh = refresh.clone();
            tokio::spawn(async move { guard.exchange(&refresh).await })
        })
        .collect();
    let revoker = {
        let guard = guard.clone();
        let refresh = refresh.clone();
        tokio::spawn(async move { guard.revoke(&refresh).await })
    };

    for handle in exchangers {
        match handle.await.unwrap() {
            Ok(_) | Err(AuthError::Revoked) => {}
            Err(other) => panic!("unexpected exchange error: {other}"),
        }
    }
    assert_eq!(revoker.await.unwrap().unwrap(), RevokeOutcome::Revoked);
    assert!(matches!(guard.exchange(&refresh).await, Err(AuthError::Revoked)));
}

/// Revoked wins over expired
#[tokio::test]
async fn test_revoked_and_expired_reports_revoked() {
    let (guard, _store, refresh) = guard_with_user().await;
    guard.revoke(&refresh).await.unwrap();

    let far_future = Utc::now() + Duration::days(365);
    assert!(matches!(
        guard.exchange_at(&refresh, far_future).await,
        Err(AuthError::Revoked)
    ));
}

/// Flipping any character of an access token gets it rejected
#[tokio::test]
async fn test_tampered_access_tokens_rejected() {
    let (guard, store, _) = guard_with_user().await;
    let user = store.get_user_by_email("racer@example.com").await.unwrap();
    let token = guard.issue_access_token(user.id);

    assert_eq!(guard.authenticate_session(&bearer(&token)).unwrap(), user.id);

    for i in 0..token.len() {
        let mut bytes = token.clone().into_bytes();
        if bytes[i] == b'.' {
            continue;
        }
        bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        if tampered == token {
            continue;
        }

        let err = guard.authenticate_session(&bearer(&tampered)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated, "position {i} accepted");
    }
}

/// Claims re-signed with another secret, or swapped under a valid signature
#[tokio::test]
async fn test_forged_claims_rejected() {
    let (guard, store, _) = guard_with_user().await;
    let user = store.get_user_by_email("racer@example.com").await.unwrap();
    let now = Utc::now();

    let claims = AccessClaims {
        iss: "chirpy".to_string(),
        sub: user.id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(1)).timestamp(),
    };
    let forged = AccessToken::sign(&claims, b"not-the-secret");
    assert!(guard.authenticate_session(&bearer(&forged)).is_err());

    // Keep a valid signature, swap in another subject
    let genuine = guard.issue_access_token(user.id);
    let parts: Vec<&str> = genuine.split('.').collect();
    let other = AccessClaims {
        sub: uuid::Uuid::new_v4().to_string(),
        ..claims
    };
    let swapped_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&other).unwrap());
    let swapped = format!("{}.{}.{}", parts[0], swapped_payload, parts[2]);
    assert!(guard.authenticate_session(&bearer(&swapped)).is_err());
}

/// Deleting users takes their refresh tokens with them
#[tokio::test]
async fn test_refresh_tokens_do_not_outlive_users() {
    let (guard, store, refresh) = guard_with_user().await;
    assert!(guard.exchange(&refresh).await.is_ok());

    store.delete_all_users().await.unwrap();

    assert_eq!(store.refresh_token_count(), 0);
    assert!(matches!(guard.exchange(&refresh).await, Err(AuthError::NotFound)));
    assert!(matches!(guard.revoke(&refresh).await, Err(AuthError::NotFound)));
}

/// Tokens issued with a zero lifetime never authenticate
#[tokio::test]
async fn test_zero_ttl_token_never_valid() {
    let store = Arc::new(MemoryStore::new());
    let guard = AuthGuard::new(
        AuthConfig::new(SECRET, ApiKey::new("key".to_string())).with_access_ttl(Duration::zero()),
        store,
    );

    let token = guard.issue_access_token(uuid::Uuid::new_v4());
    assert!(matches!(
        guard.authenticate_session(&bearer(&token)),
        Err(AuthError::Token(TokenError::Expired))
    ));
}
