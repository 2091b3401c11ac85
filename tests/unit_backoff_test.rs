use hivelink::config::ReconnectConfig;
use hivelink::core::backoff::ReconnectionPolicy;
use std::collections::HashSet;
use std::time::Duration;

fn config(initial: Duration, max: Duration, multiplier: f64, jitter: bool) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: initial,
        max_delay: max,
        multiplier,
        jitter,
    }
}

#[test]
fn test_growth_without_jitter() {
    let policy = ReconnectionPolicy::new(&config(
        Duration::from_secs(1),
        Duration::from_secs(4),
        2.0,
        false,
    ));

    assert_eq!(policy.next_delay(), Duration::from_secs(1));
    assert_eq!(policy.next_delay(), Duration::from_secs(2));
    assert_eq!(policy.next_delay(), Duration::from_secs(4));
    // Capped at the maximum from here on.
    assert_eq!(policy.next_delay(), Duration::from_secs(4));
    assert_eq!(policy.attempt_count(), 4);
}

#[test]
fn test_reset_restores_initial_delay() {
    let policy = ReconnectionPolicy::new(&config(
        Duration::from_secs(1),
        Duration::from_secs(60),
        2.0,
        false,
    ));

    policy.next_delay();
    policy.next_delay();
    policy.reset();
    assert_eq!(policy.attempt_count(), 0);
    assert_eq!(policy.next_delay(), Duration::from_secs(1));
}

#[test]
fn test_reset_with_jitter_bounds_first_delay() {
    let initial = Duration::from_secs(1);
    let policy = ReconnectionPolicy::new(&config(initial, Duration::from_secs(3600), 2.0, true));

    policy.next_delay();
    policy.next_delay();
    policy.reset();

    let first = policy.next_delay();
    assert!(first >= Duration::from_millis(100));
    assert!(first <= initial);
}

#[test]
fn test_jitter_produces_distinct_bounded_delays() {
    let max = Duration::from_secs(2);
    let policy = ReconnectionPolicy::new(&config(Duration::from_millis(200), max, 2.0, true));

    let mut distinct = HashSet::new();
    for _ in 0..100 {
        let delay = policy.next_delay();
        assert!(delay >= Duration::from_millis(100), "delay below floor: {delay:?}");
        assert!(delay <= max, "delay above cap: {delay:?}");
        distinct.insert(delay.as_nanos());
    }
    assert!(
        distinct.len() >= 3,
        "expected at least 3 distinct jittered delays, got {}",
        distinct.len()
    );
}

#[test]
fn test_policy_is_shareable_across_threads() {
    let policy = std::sync::Arc::new(ReconnectionPolicy::new(&config(
        Duration::from_millis(200),
        Duration::from_secs(2),
        2.0,
        true,
    )));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let policy = policy.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..25 {
                let delay = policy.next_delay();
                assert!(delay >= Duration::from_millis(100));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(policy.attempt_count(), 100);
}
