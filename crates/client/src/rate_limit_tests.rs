// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use march_core::FakeClock;

#[test]
fn full_bucket_allows_burst_up_to_capacity() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(10, clock);
    for i in 0..10 {
        assert!(limiter.try_acquire(), "token {i} should be available");
    }
    assert!(!limiter.try_acquire());
}

#[test]
fn tokens_refill_continuously() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(60, clock.clone());
    while limiter.try_acquire() {}

    // 60/minute means one token per second.
    clock.advance(Duration::from_secs(1));
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());

    clock.advance(Duration::from_secs(2));
    assert!(limiter.try_acquire());
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());
}

#[test]
fn refill_is_capped_at_capacity() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(5, clock.clone());
    clock.advance(Duration::from_secs(3600));
    let mut granted = 0;
    while limiter.try_acquire() {
        granted += 1;
    }
    assert_eq!(granted, 5);
}

#[test]
fn zero_configured_rate_still_grants_eventually() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(0, clock.clone());
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());
    clock.advance(Duration::from_secs(60));
    assert!(limiter.try_acquire());
}

#[tokio::test]
async fn blocking_acquire_waits_for_refill() {
    let clock = FakeClock::new();
    let limiter = std::sync::Arc::new(RateLimiter::new(10, clock.clone()));
    while limiter.try_acquire() {}

    let waiter = {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            limiter.acquire().await;
        })
    };
    clock.advance(Duration::from_secs(6));
    waiter.await.unwrap();
}

#[tokio::test]
async fn rate_limited_client_spends_one_token_per_operation() {
    let clock = FakeClock::new();
    let limiter = Arc::new(RateLimiter::new(100, clock.clone()));
    let device = crate::fake::FakeDevice::new("fw001", "10.1.0");
    let client = RateLimited::new(Arc::new(device.clone()), limiter.clone());

    client.system_info().await.unwrap();
    client.disk_space().await.unwrap();
    client.reboot_start().await.unwrap();

    assert!((limiter.available() - 97.0).abs() < 1e-6);
    assert_eq!(device.count("system_info"), 1);
}

#[test]
fn limiter_is_shareable_across_threads() {
    let clock = FakeClock::new();
    let limiter = std::sync::Arc::new(RateLimiter::new(1000, clock));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            std::thread::spawn(move || (0..50).filter(|_| limiter.try_acquire()).count())
        })
        .collect();
    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(granted, 400);
}
