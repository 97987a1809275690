use cadence_harness::rate_limiter::{RateLimitConfig, RateLimitError, RateLimiter};

#[test]
fn allows_requests_within_limit() {
    let limiter = RateLimiter::new(RateLimitConfig::requests_per_minute(10));

    for _ in 0..10 {
        assert!(limiter.check("user-1").is_ok());
    }
}

#[test]
fn rejects_when_exhausted() {
    let limiter = RateLimiter::new(RateLimitConfig::requests_per_minute(5));

    for _ in 0..5 {
        limiter.check("user-1").unwrap();
    }

    let result = limiter.check("user-1");
    assert!(result.is_err());
    assert!(matches!(result, Err(RateLimitError::Exceeded { .. })));
}

#[test]
fn separate_keys_have_separate_buckets() {
    let limiter = RateLimiter::new(RateLimitConfig::requests_per_minute(2));

    limiter.check("user-a").unwrap();
    limiter.check("user-a").unwrap();
    assert!(limiter.check("user-a").is_err());
    assert!(limiter.check("user-b").is_ok());
}

#[test]
fn retry_hint_is_fixed_at_sixty_seconds_regardless_of_capacity() {
    let limiter = RateLimiter::new(RateLimitConfig::requests_per_minute(1));
    limiter.check("user-1").unwrap();
    match limiter.check("user-1") {
        Err(RateLimitError::Exceeded { retry_after, .. }) => {
            assert_eq!(retry_after.as_secs(), 60);
        }
        Ok(()) => panic!("expected rejection"),
    }
}

#[test]
fn remaining_tokens_reflects_usage() {
    let limiter = RateLimiter::new(RateLimitConfig::requests_per_minute(10));

    let rem = limiter.remaining("user-1");
    assert!((rem - 10.0).abs() < 1.0);

    limiter.check("user-1").unwrap();
    let rem = limiter.remaining("user-1");
    assert!(rem < 10.0);
    assert!(rem >= 8.5);
}

#[test]
fn unseen_key_reports_full_capacity_without_creating_a_bucket_entry() {
    let limiter = RateLimiter::new(RateLimitConfig::requests_per_minute(10));
    assert_eq!(limiter.remaining("never-seen"), 10.0);
    assert_eq!(limiter.bucket_count(), 0);
}

#[test]
fn error_message_includes_key() {
    let limiter = RateLimiter::new(RateLimitConfig::requests_per_minute(1));
    limiter.check("my-key").unwrap();
    let err = limiter.check("my-key").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("my-key"), "error should contain key name: {msg}");
}

#[test]
fn gc_drops_only_idle_full_buckets() {
    let limiter = RateLimiter::new(RateLimitConfig::requests_per_minute(5));
    limiter.check("partially-used").unwrap();
    limiter.gc_idle_buckets();
    // a bucket with only one token consumed is below capacity, so the
    // (non-time-based) GC predicate leaves it alone immediately.
    assert_eq!(limiter.bucket_count(), 1);
}
