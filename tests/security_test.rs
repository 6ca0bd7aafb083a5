// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Security tests for sign-in throttling and session binding.
//!
//! Simulates credential attacks and cookie replay against the
//! authentication service and asserts on how much of each attack gets
//! through.

mod harness;

use harness::attacks::AttackConfig;
use harness::generators::{
    generate_empty_credentials, generate_guesses, generate_ips, generate_unknown_users,
    generate_user_agents,
};
use harness::metrics::{AttackMetrics, Outcome};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use sketchspace_auth::{
    auth::AuthenticationService,
    clock::{Clock, ManualClock},
    config::{Config, PasswordConfig, ThrottleConfig},
    error::AuthError,
    limiter::{Quota, RateLimiter},
    session::{CallerIdentity, SessionId},
    store::MemoryBucketStore,
    users::{MemoryUserDirectory, UserDirectory, UserRecord},
};

const T0: i64 = 1_700_000_000;
const AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) Sketchspace-Test";

/// 10 attempts per address every 10 minutes, one token back per minute.
const SIGN_IN_QUOTA: Quota = Quota::new(10, 600);

struct Target {
    auth: AuthenticationService,
    clock: Arc<ManualClock>,
}

async fn target() -> Target {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(MemoryBucketStore::new(clock.clone()));
    let limiter = Arc::new(RateLimiter::new(store, clock.clone()));
    let users = Arc::new(MemoryUserDirectory::new());

    let config = Config {
        throttle: ThrottleConfig {
            sign_in: SIGN_IN_QUOTA,
            ..ThrottleConfig::default()
        },
        password: PasswordConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        },
        ..Config::default()
    };

    let auth = AuthenticationService::new(&config, limiter, users.clone(), clock.clone()).unwrap();
    let hash = auth.hasher().hash("hunter2-but-longer".to_string()).await.unwrap();
    users
        .insert(UserRecord::new("alice", "alice@example.com", "Alice", hash, T0))
        .unwrap();

    Target { auth, clock }
}

/// Run an attack pattern and collect metrics.
async fn run_attack(target: &Target, config: &AttackConfig) -> AttackMetrics {
    let ips = generate_ips(config.unique_ips);
    let guesses = generate_guesses(config.total_requests);
    let ghosts = generate_unknown_users(config.total_requests);
    let mut metrics = AttackMetrics::new();

    for i in 0..config.total_requests {
        let ip = ips[i % ips.len()];
        let caller = CallerIdentity::new(ip, AGENT);
        let identifier = if config.target_existing {
            "alice"
        } else {
            ghosts[i].as_str()
        };

        let result = target
            .auth
            .sign_in(&caller, None, identifier, &guesses[i])
            .await;
        record(&mut metrics, &ip, result.map(|_| ()));

        target.clock.advance(config.seconds_between);
    }

    metrics
}

fn record(metrics: &mut AttackMetrics, ip: &IpAddr, result: Result<(), AuthError>) {
    let ip = ip.to_string();
    match result {
        Ok(()) => metrics.record(Outcome::SignedIn, &ip, None),
        Err(e @ AuthError::InvalidCredentials) => {
            metrics.record(Outcome::InvalidCredentials, &ip, Some(e.to_string()))
        }
        Err(AuthError::TooManyRequests { retry_after_secs }) => {
            metrics.record_retry(retry_after_secs);
            metrics.record(Outcome::Throttled, &ip, None);
        }
        Err(AuthError::MissingParameters(_)) => metrics.record(Outcome::MissingParams, &ip, None),
        Err(_) => metrics.record(Outcome::Other, &ip, None),
    }
}

// =============================================================================
// Credential Attacks
// =============================================================================

#[tokio::test]
async fn test_brute_force_is_capped_at_capacity() {
    let target = target().await;
    let metrics = run_attack(&target, &AttackConfig::brute_force()).await;

    println!("{metrics}");

    assert_eq!(metrics.count(Outcome::SignedIn), 0);
    assert_eq!(
        metrics.count(Outcome::InvalidCredentials) as u64,
        SIGN_IN_QUOTA.capacity()
    );
    assert_eq!(metrics.count(Outcome::Throttled), 50);
    assert!(metrics.block_rate() > 0.8, "Block rate too low");
    // One token back per minute.
    assert_eq!(metrics.max_retry_after(), 60);
}

#[tokio::test]
async fn test_distributed_attack_is_throttled_per_address() {
    let target = target().await;
    let metrics = run_attack(&target, &AttackConfig::distributed_brute_force()).await;

    println!("{metrics}");

    // 40 addresses, 3 attempts each: every address stays inside its own bucket.
    assert_eq!(metrics.unique_ips(), 40);
    assert_eq!(metrics.count(Outcome::Throttled), 0);
    assert_eq!(metrics.count(Outcome::InvalidCredentials), 120);
    assert_eq!(metrics.count(Outcome::SignedIn), 0);
}

#[tokio::test]
async fn test_account_enumeration_learns_nothing() {
    let target = target().await;
    let mut metrics = run_attack(&target, &AttackConfig::account_enumeration()).await;

    // Add wrong-password attempts from a fresh address to the same report.
    let other = generate_ips(2)[1];
    let caller = CallerIdentity::new(other, AGENT);
    for guess in generate_guesses(3) {
        let result = target.auth.sign_in(&caller, None, "alice", &guess).await;
        record(&mut metrics, &other, result.map(|_| ()));
    }

    println!("{metrics}");

    assert_eq!(metrics.count(Outcome::InvalidCredentials), 13);
    assert_eq!(metrics.count(Outcome::Throttled), 30);
    assert_eq!(
        metrics.distinct_messages(),
        1,
        "Unknown user and wrong password must be indistinguishable"
    );
    // Every admitted attempt paid for one password verification, known
    // account or not, so response time gives nothing away either.
    assert_eq!(target.auth.hasher().verifications(), 13);
}

#[tokio::test]
async fn test_slow_drip_stays_under_refill_rate() {
    let target = target().await;
    let metrics = run_attack(&target, &AttackConfig::slow_drip()).await;

    println!("{metrics}");

    // Guessing no faster than the refill rate is never throttled, but the
    // attacker is limited to one guess a minute.
    assert_eq!(metrics.count(Outcome::Throttled), 0);
    assert_eq!(metrics.count(Outcome::InvalidCredentials), 30);
}

#[tokio::test]
async fn test_empty_credentials_still_cost_a_token() {
    let target = target().await;
    let ip: IpAddr = "198.51.100.7".parse().unwrap();
    let caller = CallerIdentity::new(ip, AGENT);
    let mut metrics = AttackMetrics::new();

    for _ in 0..3 {
        for (user, pass) in generate_empty_credentials() {
            let result = target.auth.sign_in(&caller, None, user, pass).await;
            record(&mut metrics, &ip, result.map(|_| ()));
        }
    }

    println!("{metrics}");

    assert_eq!(metrics.count(Outcome::MissingParams), 10);
    assert_eq!(metrics.count(Outcome::Throttled), 2);

    // Even the right password is refused once the bucket is empty.
    let err = target
        .auth
        .sign_in(&caller, None, "alice", "hunter2-but-longer")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TooManyRequests { .. }));
}

#[tokio::test]
async fn test_throttled_address_recovers_after_retry_after() {
    let target = target().await;
    let ip: IpAddr = "198.51.100.8".parse().unwrap();
    let caller = CallerIdentity::new(ip, AGENT);

    for guess in generate_guesses(10) {
        let _ = target.auth.sign_in(&caller, None, "alice", &guess).await;
    }

    let retry_after = match target.auth.sign_in(&caller, None, "alice", "nope").await {
        Err(AuthError::TooManyRequests { retry_after_secs }) => retry_after_secs,
        other => panic!("expected throttling, got {other:?}"),
    };

    target.clock.advance(retry_after as i64 - 1);
    assert!(matches!(
        target.auth.sign_in(&caller, None, "alice", "nope").await,
        Err(AuthError::TooManyRequests { .. })
    ));

    target.clock.advance(1);
    assert!(target
        .auth
        .sign_in(&caller, None, "alice", "hunter2-but-longer")
        .await
        .is_ok());
}

// =============================================================================
// Session Hijacking
// =============================================================================

#[tokio::test]
async fn test_replayed_cookie_with_other_agent_is_dropped() {
    for agent in generate_user_agents() {
        let target = target().await;
        let victim = CallerIdentity::new("192.0.2.1".parse().unwrap(), AGENT);
        let session = target
            .auth
            .sign_in(&victim, None, "alice", "hunter2-but-longer")
            .await
            .unwrap();

        let attacker = CallerIdentity::new(victim.address, agent);
        assert!(
            !target.auth.is_authenticated(&attacker, Some(&session.id)),
            "Replay with agent {agent:?} accepted"
        );

        // The hijack attempt burns the session for the victim too.
        assert!(!target.auth.is_authenticated(&victim, Some(&session.id)));
    }
}

#[tokio::test]
async fn test_replayed_cookie_from_other_address_is_dropped() {
    let target = target().await;
    let victim = CallerIdentity::new("192.0.2.1".parse().unwrap(), AGENT);
    let session = target
        .auth
        .sign_in(&victim, None, "alice", "hunter2-but-longer")
        .await
        .unwrap();

    for ip in generate_ips(5) {
        let attacker = CallerIdentity::new(ip, AGENT);
        assert!(!target.auth.is_authenticated(&attacker, Some(&session.id)));
    }

    assert!(!target.auth.is_authenticated(&victim, Some(&session.id)));
}

#[tokio::test]
async fn test_session_fixation_is_prevented() {
    let target = target().await;
    let victim = CallerIdentity::new("192.0.2.1".parse().unwrap(), AGENT);

    // An attacker-chosen identifier planted before sign-in.
    let planted = SessionId::from("attacker-chosen-id");
    let session = target
        .auth
        .sign_in(&victim, Some(&planted), "alice", "hunter2-but-longer")
        .await
        .unwrap();

    assert_ne!(session.id, planted);
    assert!(!target.auth.is_authenticated(&victim, Some(&planted)));
    assert!(target.auth.is_authenticated(&victim, Some(&session.id)));
}

// =============================================================================
// Performance
// =============================================================================

#[test]
fn test_limiter_latency() {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(MemoryBucketStore::new(clock.clone()));
    let limiter = RateLimiter::new(store, clock.clone());
    let ips = generate_ips(1000);
    let quota = Quota::new(500, 86_400).with_burst(75);

    let mut latencies = Vec::with_capacity(ips.len());
    for ip in &ips {
        let address = ip.to_string();
        let start = Instant::now();
        limiter.consume(&["Sign in", &address], quota).unwrap();
        latencies.push(start.elapsed().as_micros() as u64);
    }

    latencies.sort_unstable();
    let median = latencies[latencies.len() / 2];
    let p99 = latencies[(latencies.len() * 99) / 100];
    println!("Limiter latency: median {median} us, p99 {p99} us, buckets {}", ips.len());

    // Generous bound for debug builds on shared CI runners.
    assert!(median < 10_000, "Median limiter latency too high: {median} us");
    assert_eq!(clock.now(), T0);
}
