//! Tick timing of variable-cadence tickers.

use os_supervisor::Ticker;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_variable_cadence_repeats_last_duration() {
    let durations = [
        Duration::from_millis(100),
        Duration::from_millis(250),
        Duration::from_secs(1),
    ];
    let ticker = Ticker::new_var(&durations);
    let t0 = Instant::now();
    ticker.start(CancellationToken::new());

    let mut expected = Duration::ZERO;
    for k in 0..6 {
        expected += durations[k.min(durations.len() - 1)];
        ticker.recv().await.unwrap();
        let elapsed = Instant::now() - t0;
        let drift = if elapsed > expected {
            elapsed - expected
        } else {
            expected - elapsed
        };
        assert!(
            drift <= Duration::from_millis(10),
            "tick {k}: expected {expected:?}, got {elapsed:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_consumer_does_not_shift_deadlines() {
    let ticker = Ticker::new(Duration::from_secs(1));
    let t0 = Instant::now();
    ticker.start(CancellationToken::new());

    let first = ticker.recv().await.unwrap();
    assert_eq!(first - t0, Duration::from_secs(1));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let second = ticker.recv().await.unwrap();
    let third = ticker.recv().await.unwrap();
    assert_eq!(second - t0, Duration::from_secs(2));
    assert_eq!(third - t0, Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_delivery() {
    let ticker = Ticker::new(Duration::from_secs(1));
    let ctx = CancellationToken::new();
    ticker.start(ctx.clone());
    assert!(ticker.recv().await.is_some());
    ctx.cancel();
    assert!(ticker.recv().await.is_none());
}
