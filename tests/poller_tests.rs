use async_trait::async_trait;
use fox::error::{Error, Result};
use fox::poller::{PollAttempt, Probe, ReadinessPoller};
use mockall::mock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Define a mock for the Probe trait
mock! {
    pub Endpoint {}

    #[async_trait]
    impl Probe for Endpoint {
        async fn probe(&self, url: &str) -> bool;
    }
}

const URL: &str = "http://localhost:8080";

/// A probe that starts answering on the `up_from`-th call.
fn probe_up_from(up_from: u32) -> (MockEndpoint, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let mut probe = MockEndpoint::new();
    probe
        .expect_probe()
        .withf(|url| url.to_string() == URL)
        .returning(move |_| counter.fetch_add(1, Ordering::SeqCst) + 1 >= up_from);
    (probe, calls)
}

#[tokio::test(start_paused = true)]
async fn test_up_on_third_probe() -> Result<()> {
    let (probe, calls) = probe_up_from(3);
    let poller = ReadinessPoller::new(Arc::new(probe));
    let started = Instant::now();

    let probes = poller
        .wait_until_up(URL, 5, Duration::from_millis(2000))
        .await?;

    assert_eq!(probes, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Immediate first probe, then two fixed intervals
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(4000) && elapsed < Duration::from_millis(6000));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_up_immediately() -> Result<()> {
    let mut probe = MockEndpoint::new();
    probe.expect_probe().times(1).returning(|_| true);
    let poller = ReadinessPoller::new(Arc::new(probe));
    let started = Instant::now();

    assert_eq!(poller.wait_until_up(URL, 30, Duration::from_secs(2)).await?, 1);
    assert!(started.elapsed() < Duration::from_millis(2000));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_up_times_out_after_max_attempts() {
    let mut probe = MockEndpoint::new();
    probe.expect_probe().times(4).returning(|_| false);
    let poller = ReadinessPoller::new(Arc::new(probe));

    let result = poller
        .wait_until_up(URL, 4, Duration::from_millis(500))
        .await;

    match result {
        Err(Error::Timeout(message)) => assert!(message.contains("never came up")),
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_down_never_happens() {
    let mut probe = MockEndpoint::new();
    probe.expect_probe().times(3).returning(|_| true);
    let poller = ReadinessPoller::new(Arc::new(probe));
    let started = Instant::now();

    let result = poller
        .wait_until_down(URL, 3, Duration::from_millis(2000))
        .await;

    assert!(matches!(result, Err(Error::Timeout(ref m)) if m.contains("never went down")));
    // No sleep after the last probe
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(4000) && elapsed < Duration::from_millis(6000));
}

#[tokio::test(start_paused = true)]
async fn test_down_after_second_probe() -> Result<()> {
    let (probe, _calls) = probe_up_from(u32::MAX);
    let poller = ReadinessPoller::new(Arc::new(probe));

    // Never answers, so it is down on the first probe
    assert_eq!(poller.wait_until_down(URL, 5, Duration::from_secs(1)).await?, 1);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let mut probe = MockEndpoint::new();
    probe
        .expect_probe()
        .returning(move |_| counter.fetch_add(1, Ordering::SeqCst) == 0);
    let poller = ReadinessPoller::new(Arc::new(probe));

    assert_eq!(poller.wait_until_down(URL, 5, Duration::from_secs(1)).await?, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_attempts_still_probes_once() {
    let mut probe = MockEndpoint::new();
    probe.expect_probe().times(1).returning(|_| false);
    let poller = ReadinessPoller::new(Arc::new(probe));

    let result = poller.wait_until_up(URL, 0, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[test]
fn test_poll_attempt_budget() {
    let attempt = PollAttempt::new(0, Duration::from_secs(2));
    assert_eq!(attempt.remaining, 1);
    assert_eq!(attempt.issued, 0);
    assert!(!attempt.exhausted());

    let attempt = PollAttempt::new(30, Duration::from_secs(2));
    assert_eq!(attempt.remaining, 30);
    assert_eq!(attempt.interval, Duration::from_secs(2));
}
