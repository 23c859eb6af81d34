//! Readiness polling against a local health responder

use std::time::Duration;

use axum::http::StatusCode;
use headscale_e2e::readiness::wait_ready;
use headscale_e2e::{ReadinessError, RetryPolicy};
use headscale_tests::{HealthResponder, unused_port};

fn quick(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        probe_timeout: Duration::from_secs(2),
        ..RetryPolicy::attempts(max_attempts, Duration::from_millis(10))
    }
}

#[tokio::test]
async fn test_ready_immediately() {
    let responder = HealthResponder::start(0).await.unwrap();

    wait_ready(&responder.url(), quick(1)).await.unwrap();
    assert_eq!(responder.hits(), 1);
}

#[tokio::test]
async fn test_failures_within_budget_succeed() {
    let responder = HealthResponder::start(3).await.unwrap();

    wait_ready(&responder.url(), quick(5)).await.unwrap();
    assert_eq!(responder.hits(), 4);
}

#[tokio::test]
async fn test_failures_beyond_budget_report_not_ready() {
    let responder = HealthResponder::start(10).await.unwrap();

    let err = wait_ready(&responder.url(), quick(3)).await.unwrap_err();
    match err {
        ReadinessError::NotReady {
            attempts, status, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(status, 503);
        }
        other => panic!("expected NotReady, got {:?}", other),
    }
    assert_eq!(responder.hits(), 3);
}

#[tokio::test]
async fn test_only_200_counts_as_ready() {
    let responder = HealthResponder::start_with_status(1, StatusCode::NO_CONTENT)
        .await
        .unwrap();

    let err = wait_ready(&responder.url(), quick(1)).await.unwrap_err();
    assert!(matches!(err, ReadinessError::NotReady { status: 204, .. }), "{:?}", err);
}

#[tokio::test]
async fn test_nothing_listening_reports_unreachable() {
    let port = unused_port().await.unwrap();
    let url = format!("http://127.0.0.1:{}/health", port);

    let err = wait_ready(&url, quick(2)).await.unwrap_err();
    assert!(matches!(err, ReadinessError::Unreachable { attempts: 2, .. }), "{:?}", err);
    assert!(err.to_string().contains("not ready"), "{}", err);
}

#[tokio::test]
async fn test_time_budget_stops_polling() {
    let responder = HealthResponder::start(u32::MAX).await.unwrap();
    let policy = RetryPolicy {
        initial_interval: Duration::from_millis(50),
        max_interval: Duration::from_millis(50),
        max_elapsed: Duration::from_millis(300),
        ..RetryPolicy::default()
    };

    let started = std::time::Instant::now();
    let err = wait_ready(&responder.url(), policy).await.unwrap_err();
    assert!(matches!(err, ReadinessError::NotReady { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(err.attempts() >= 2);
}
