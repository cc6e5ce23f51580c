mod common;

use common::{init_tracing, FlakyStore, Op};
use flashdeck::clock::ManualClock;
use flashdeck::kv::{keys, InMemoryStore};
use flashdeck::rate_limit::{
    Decision, LimitType, RateLimitConfig, RateLimiter, TierLimit, TieredRateLimiter,
};
use std::time::Duration;

const T0: i64 = 1_700_000_000_000;
const SEC: i64 = 1_000;
const DAY: i64 = 86_400_000;

fn limiter() -> (TieredRateLimiter<InMemoryStore>, ManualClock) {
    let clock = ManualClock::new(T0);
    (TieredRateLimiter::new(InMemoryStore::new()).with_clock(clock.clone()), clock)
}

async fn admit<L: RateLimiter>(limiter: &L) {
    match limiter.acquire("/chat").await.unwrap() {
        Decision::Allowed { permit, .. } => limiter.record(permit).await.unwrap(),
        Decision::Denied(e) => panic!("unexpected denial: {e}"),
    }
}

#[tokio::test]
async fn burst_boundary_scenario() {
    init_tracing();
    let (limiter, clock) = limiter();

    for at in [0, 2 * SEC, 5 * SEC] {
        clock.set(T0 + at);
        admit(&limiter).await;
    }

    clock.set(T0 + 7 * SEC);
    let err = match limiter.acquire("/chat").await.unwrap() {
        Decision::Denied(e) => e,
        Decision::Allowed { .. } => panic!("fourth request inside 10s must be denied"),
    };
    assert_eq!(err.limit_type, LimitType::Burst);
    assert_eq!(err.reset_time, T0 + 10 * SEC);
    assert_eq!(err.remaining_time, Duration::from_secs(3));
    assert_eq!(
        err.message,
        "Too many requests in a short time. Please wait 3s before trying again."
    );

    // The t=0 entry leaves the window exactly 10s later.
    clock.set(T0 + 10 * SEC);
    assert!(limiter.check("/chat").await.unwrap().can_make_request);
}

#[tokio::test]
async fn daily_remaining_counts_down_then_resets() {
    let (limiter, clock) = limiter();
    let mut last = limiter.status().await.unwrap().remaining_requests.daily;
    assert_eq!(last, 100);

    for _ in 0..5 {
        admit(&limiter).await;
        clock.advance(11 * SEC);
        let daily = limiter.status().await.unwrap().remaining_requests.daily;
        assert_eq!(daily, last - 1);
        last = daily;
    }

    let reset_at = limiter.refresh().await.daily_reset_timestamp;
    assert_eq!(reset_at, T0 + DAY);

    clock.set(reset_at - 1);
    assert_eq!(limiter.status().await.unwrap().remaining_requests.daily, 95);
    clock.set(reset_at);
    assert_eq!(limiter.status().await.unwrap().remaining_requests.daily, 100);
}

#[tokio::test]
async fn short_term_denial_mentions_daily_headroom() {
    let (limiter, clock) = limiter();
    for _ in 0..10 {
        admit(&limiter).await;
        clock.advance(4 * SEC);
    }

    let status = limiter.status().await.unwrap();
    assert_eq!(status.limit_type, Some(LimitType::ShortTerm));
    match limiter.acquire("/chat").await.unwrap() {
        Decision::Denied(e) => {
            assert_eq!(e.limit_type, LimitType::ShortTerm);
            assert!(e.message.contains("You can make 90 more requests today"), "{}", e.message);
        }
        Decision::Allowed { .. } => panic!("short-term tier should be exhausted"),
    }
}

#[tokio::test]
async fn custom_daily_tier_denies_with_reset_message() {
    let config = RateLimitConfig::new(
        TierLimit::new(5, Duration::from_secs(1)),
        TierLimit::new(5, Duration::from_secs(1)),
        TierLimit::new(2, Duration::from_secs(3_600)),
    )
    .unwrap();
    let clock = ManualClock::new(T0);
    let limiter =
        TieredRateLimiter::new(InMemoryStore::new()).with_config(config).with_clock(clock.clone());

    for _ in 0..2 {
        admit(&limiter).await;
        clock.advance(2 * SEC);
    }
    match limiter.acquire("/chat").await.unwrap() {
        Decision::Denied(e) => {
            assert_eq!(e.limit_type, LimitType::Daily);
            assert!(e.message.starts_with("Daily limit of 2 requests reached."), "{}", e.message);
        }
        Decision::Allowed { .. } => panic!("daily tier should be exhausted"),
    }
}

#[tokio::test]
async fn ledger_survives_a_new_instance() {
    let store = InMemoryStore::new();
    let clock = ManualClock::new(T0);
    let first = TieredRateLimiter::new(store.clone()).with_clock(clock.clone());
    for _ in 0..3 {
        admit(&first).await;
    }

    let second = TieredRateLimiter::new(store.clone()).with_clock(clock.clone());
    let status = second.status().await.unwrap();
    assert!(!status.can_make_request);
    assert_eq!(status.limit_type, Some(LimitType::Burst));
    assert!(store.raw(keys::RATE_LIMIT).is_some());
}

#[tokio::test]
async fn unreadable_ledger_allows_but_failed_record_is_reported() {
    init_tracing();
    let flaky = FlakyStore::new(InMemoryStore::new());
    let limiter = TieredRateLimiter::new(flaky.clone()).with_clock(ManualClock::new(T0));

    flaky.fail(Op::Get, keys::RATE_LIMIT);
    let permit = match limiter.acquire("/chat").await.unwrap() {
        Decision::Allowed { permit, .. } => permit,
        Decision::Denied(e) => panic!("read failure must not deny: {e}"),
    };

    assert!(limiter.record(permit).await.is_err());
    assert_eq!(limiter.in_flight(), 0);
}

#[tokio::test]
async fn failed_read_during_record_keeps_history() {
    init_tracing();
    let flaky = FlakyStore::new(InMemoryStore::new());
    let limiter = TieredRateLimiter::new(flaky.clone()).with_clock(ManualClock::new(T0));
    for _ in 0..3 {
        limiter.record_request("/chat").await.unwrap();
    }

    flaky.fail(Op::Get, keys::RATE_LIMIT);
    assert!(limiter.record_request("/chat").await.is_err());
    flaky.heal();

    let ledger = limiter.refresh().await;
    assert_eq!(ledger.requests.len(), 3);
    let status = limiter.status().await.unwrap();
    assert!(!status.can_make_request);
    assert_eq!(status.remaining_requests.burst, 0);
    assert_eq!(status.remaining_requests.daily, 97);
}

#[tokio::test]
async fn clear_only_touches_the_ledger() {
    let store = InMemoryStore::new();
    store.put_raw(keys::DECKS, "[]");
    let limiter = TieredRateLimiter::new(store.clone()).with_clock(ManualClock::new(T0));
    admit(&limiter).await;

    limiter.clear().await.unwrap();
    assert!(store.raw(keys::RATE_LIMIT).is_none());
    assert_eq!(store.raw(keys::DECKS).as_deref(), Some("[]"));
    assert_eq!(limiter.usage_stats().await.total_requests_today, 0);
}
