//! Stress tests for pathological cases
//!
//! These tests verify we don't have accidentally quadratic behavior.

use chirpy::auth::{AccessToken, ApiKey, AuthConfig};
use chirpy::storage::{MemoryStore, PostStore, RefreshTokenStore, UserStore};
use chirpy::{AuthGuard, RefreshToken};
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const SECRET: &[u8] = b"stress-secret";

/// Test that refresh token exchange doesn't degrade with many stored tokens
#[tokio::test]
async fn test_exchange_not_quadratic() {
    let token_counts = [100, 1_000, 10_000, 50_000];
    let mut times = vec![];

    for &count in &token_counts {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("load@example.com", "hash").await.unwrap();
        let expires_at = Utc::now() + Duration::days(1);

        let mut tokens = Vec::with_capacity(count);
        for _ in 0..count {
            let token = RefreshToken::generate().into_string();
            store
                .create_refresh_token(&token, user.id, expires_at)
                .await
                .unwrap();
            tokens.push(token);
        }

        let guard = AuthGuard::new(
            AuthConfig::new(SECRET, ApiKey::new("key".to_string())),
            store.clone(),
        );

        let iterations = 5_000;
        let start = Instant::now();

        for i in 0..iterations {
            let _ = guard.exchange(&tokens[i % count]).await.unwrap();
        }

        let elapsed = start.elapsed();
        let per_exchange_ns = elapsed.as_nanos() / iterations as u128;
        times.push((count, per_exchange_ns));

        println!(
            "Tokens: {:>6}, Exchanges: {}, Time: {:?}, Per exchange: {}ns",
            count, iterations, elapsed, per_exchange_ns
        );
    }

    let (small_count, small_time) = times[0];
    let (large_count, large_time) = times[times.len() - 1];

    let count_ratio = large_count as f64 / small_count as f64;
    let time_ratio = large_time as f64 / small_time.max(1) as f64;

    println!(
        "\nToken count ratio: {:.0}x, Time ratio: {:.1}x",
        count_ratio, time_ratio
    );

    // Lookup is keyed; signing dominates and should stay flat
    assert!(
        time_ratio < count_ratio,
        "Exchange appears to scan stored tokens! Time grew {:.1}x for {:.0}x more tokens",
        time_ratio,
        count_ratio
    );
}

/// Test that validating oversized garbage tokens stays cheap
#[test]
fn test_validate_oversized_tokens() {
    let sizes = [1_000, 10_000, 100_000];
    let mut times = vec![];

    for &size in &sizes {
        let junk = format!("{}.{}.{}", "a".repeat(size), "b".repeat(size), "c".repeat(size));

        let iterations = 200;
        let start = Instant::now();

        for _ in 0..iterations {
            assert!(AccessToken::validate(&junk, SECRET).is_err());
        }

        let elapsed = start.elapsed();
        let per_check_ns = elapsed.as_nanos() / iterations as u128;
        times.push((size, per_check_ns));

        println!(
            "Segment size: {:>6}, Checks: {}, Time: {:?}, Per check: {}ns",
            size, iterations, elapsed, per_check_ns
        );
    }

    let (small_size, small_time) = times[0];
    let (large_size, large_time) = times[times.len() - 1];

    let size_ratio = large_size as f64 / small_size as f64;
    let time_ratio = large_time as f64 / small_time.max(1) as f64;

    // Linear in input size at worst; allow slack for allocation effects
    assert!(
        time_ratio < size_ratio * 10.0,
        "Token validation appears to be quadratic! Time grew {:.1}x for {:.0}x larger input",
        time_ratio,
        size_ratio
    );
}

/// Simulate realistic workload: many users, each with posts and sessions
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_realistic_workload() {
    let store = Arc::new(MemoryStore::new());
    let guard = Arc::new(AuthGuard::new(
        AuthConfig::new(SECRET, ApiKey::new("key".to_string())),
        store.clone(),
    ));

    let start = Instant::now();

    // 500 users, 4 posts and 2 refresh tokens each
    let mut users = Vec::new();
    for i in 0..500 {
        let user = store
            .create_user(&format!("user{}@example.com", i), "hash")
            .await
            .unwrap();
        for j in 0..4 {
            store
                .create_post(user.id, &format!("post {} from {}", j, i))
                .await
                .unwrap();
        }
        let r1 = guard.issue_refresh_token(user.id).await.unwrap();
        let r2 = guard.issue_refresh_token(user.id).await.unwrap();
        users.push((user.id, r1.token, r2.token));
    }

    println!("Setup time: {:?}", start.elapsed());
    assert_eq!(store.refresh_token_count(), 1_000);

    // Every user refreshes on one token and logs out of the other, concurrently
    let start = Instant::now();
    let handles: Vec<_> = users
        .iter()
        .cloned()
        .map(|(user_id, keep, drop)| {
            let guard = guard.clone();
            tokio::spawn(async move {
                let access = guard.exchange(&keep).await.unwrap();
                assert_eq!(AccessToken::validate(&access, SECRET).unwrap(), user_id);
                guard.revoke(&drop).await.unwrap();
                assert!(guard.exchange(&drop).await.is_err());
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    println!("Refresh/revoke time: {:?}", start.elapsed());

    let start = Instant::now();
    for (user_id, _, _) in users.iter().take(100) {
        let posts = store.list_posts(Some(*user_id)).await.unwrap();
        assert_eq!(posts.len(), 4);
    }
    println!("Per-author listing time: {:?}", start.elapsed());

    assert_eq!(store.list_posts(None).await.unwrap().len(), 2_000);
    assert!(store.get_user(Uuid::new_v4()).await.is_err());
}
