use super::*;

#[test]
fn test_default_policy_grows_and_caps() {
    let policy = RetryPolicy::default();
    let delays: Vec<Duration> = policy.intervals().take(8).collect();

    assert_eq!(delays[0], Duration::from_millis(500));
    assert_eq!(delays[1], Duration::from_millis(750));
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*delays.last().unwrap(), Duration::from_secs(5));
}

#[test]
fn test_attempt_budget() {
    let policy = RetryPolicy::attempts(3, Duration::from_millis(10));

    assert!(policy.allows_another(1, Duration::ZERO, Duration::from_millis(10)));
    assert!(policy.allows_another(2, Duration::from_secs(3600), Duration::from_millis(10)));
    assert!(!policy.allows_another(3, Duration::ZERO, Duration::from_millis(10)));
}

#[test]
fn test_time_budget() {
    let policy = RetryPolicy {
        max_elapsed: Duration::from_secs(1),
        ..RetryPolicy::default()
    };

    assert!(policy.allows_another(10, Duration::from_millis(400), Duration::from_millis(500)));
    assert!(!policy.allows_another(10, Duration::from_millis(800), Duration::from_millis(500)));
}

#[test]
fn test_multiplier_below_one_does_not_shrink() {
    let policy = RetryPolicy {
        multiplier: 0.5,
        ..RetryPolicy::default()
    };
    assert_eq!(
        policy.next_interval(Duration::from_secs(1)),
        Duration::from_secs(1)
    );
}

#[test]
fn test_not_ready_message_keeps_status_and_attempts() {
    let err = ReadinessError::NotReady {
        url: "http://172.18.0.2:8080/health".to_string(),
        attempts: 4,
        status: 503,
    };

    assert_eq!(err.attempts(), 4);
    let message = err.to_string();
    assert!(message.contains("status code not ok"), "{}", message);
    assert!(message.contains("503"), "{}", message);
}
