//! End-to-end tests for uart-core against the mock transport.
//!
//! These run the full locate → session → slot pipeline without hardware:
//! `cargo test --package uart-core --test integration`

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use uart_core::{
    Error, MockTransport, ScanOptions, StreamEnd, Supervisor, SupervisorOptions, TelemetrySample,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn board() -> Arc<MockTransport> {
    Arc::new(
        MockTransport::builder()
            .peer(Some("Living Room TV"), "10:00:00:00:00:01", -72)
            .peer(None, "10:00:00:00:00:02", -90)
            .peer(Some("CIRCUITPYb6e1"), "10:00:00:00:00:03", -51)
            .build(),
    )
}

fn sample(elapsed: f64) -> TelemetrySample {
    TelemetrySample {
        elapsed,
        accel: [0.012, -0.034, 9.806],
        gyro: [0.001, 0.0, -0.002],
        mag: [-21.5, 4.25, 40.125],
    }
}

#[tokio::test]
async fn test_records_flow_from_notifications_to_consumer() {
    let transport = board();
    let link = transport.link_handle();
    let mut stream = Supervisor::new(Arc::clone(&transport), SupervisorOptions::default())
        .run("CIRCUITPY");

    timeout(TEST_TIMEOUT, link.wait_subscribed()).await.unwrap();

    let line = sample(1.5).encode_line();
    for chunk in line.as_bytes().chunks(20) {
        assert!(link.push(chunk));
    }

    let record = timeout(TEST_TIMEOUT, stream.await_latest())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.as_str(), line.trim_end());
    let parsed = record.parse_sample().unwrap();
    assert_eq!(parsed.elapsed, 1.5);
    assert_eq!(parsed.mag, [-21.5, 4.25, 40.125]);

    assert_eq!(stream.shutdown().await.unwrap(), StreamEnd::Cancelled);
}

#[tokio::test]
async fn test_slow_consumer_sees_only_newest_record() {
    let transport = board();
    let link = transport.link_handle();
    let mut stream = Supervisor::new(Arc::clone(&transport), SupervisorOptions::default())
        .run("CIRCUITPY");

    timeout(TEST_TIMEOUT, link.wait_subscribed()).await.unwrap();
    for i in 0..10 {
        link.push(sample(f64::from(i)).encode_line().as_bytes());
    }

    let record = stream.await_latest().await.unwrap();
    assert_eq!(record.parse_sample().unwrap().elapsed, 9.0);
    assert!(stream.try_latest().is_none());

    stream.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancellation_runs_cleanup_exactly_once() {
    let transport = board();
    let link = transport.link_handle();
    let stream = Supervisor::new(Arc::clone(&transport), SupervisorOptions::default())
        .run("CIRCUITPY");

    timeout(TEST_TIMEOUT, link.wait_subscribed()).await.unwrap();
    let token = stream.cancellation_token();
    token.cancel();

    let end = timeout(TEST_TIMEOUT, stream.join()).await.unwrap().unwrap();
    assert_eq!(end, StreamEnd::Cancelled);
    assert_eq!(link.unsubscribe_calls(), 1);
    assert_eq!(link.disconnect_calls(), 1);
    assert!(!link.is_connected());
}

#[tokio::test]
async fn test_cancellation_with_dropped_link_is_not_an_error() {
    let transport = board();
    let link = transport.link_handle();
    let stream = Supervisor::new(Arc::clone(&transport), SupervisorOptions::default())
        .run("CIRCUITPY");

    timeout(TEST_TIMEOUT, link.wait_subscribed()).await.unwrap();
    link.drop_link();
    stream.cancel();

    let end = timeout(TEST_TIMEOUT, stream.join()).await.unwrap();
    assert!(end.is_ok(), "cleanup failures must not surface: {end:?}");
    assert_eq!(link.unsubscribe_calls(), 1);
    assert_eq!(link.disconnect_calls(), 1);
}

#[tokio::test]
async fn test_link_loss_ends_the_run() {
    let transport = board();
    let link = transport.link_handle();
    let mut stream = Supervisor::new(Arc::clone(&transport), SupervisorOptions::default())
        .run("CIRCUITPY");

    timeout(TEST_TIMEOUT, link.wait_subscribed()).await.unwrap();
    link.push(b"7.000,\n");
    link.drop_link();

    // The pending record is still delivered, then the slot reports the end.
    assert_eq!(stream.await_latest().await.unwrap().as_str(), "7.000,");
    assert!(timeout(TEST_TIMEOUT, stream.await_latest()).await.unwrap().is_none());

    let end = stream.join().await.unwrap();
    assert_eq!(end, StreamEnd::LinkLost);
    assert_eq!(transport.connect_calls(), 1);
}

#[tokio::test]
async fn test_not_found_reports_discovered_peers() {
    let transport = board();
    let mut stream = Supervisor::new(Arc::clone(&transport), SupervisorOptions::default())
        .run("ARDUINO");

    assert!(timeout(TEST_TIMEOUT, stream.await_latest()).await.unwrap().is_none());
    let err = stream.join().await.unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound { .. }));
    assert_eq!(err.discovered_peers().unwrap(), transport.peers().as_slice());
    assert_eq!(transport.discover_calls(), 1);
    assert_eq!(transport.connect_calls(), 0);
}

#[tokio::test]
async fn test_scan_failure_is_reported() {
    let transport = Arc::new(MockTransport::builder().fail_discover("adapter powered off").build());
    let stream = Supervisor::new(transport, SupervisorOptions::default()).run("CIRCUITPY");
    assert!(matches!(stream.join().await, Err(Error::Bluetooth(_))));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_scan_window() {
    let transport = Arc::new(
        MockTransport::builder()
            .peer(Some("CIRCUITPY"), "10:00:00:00:00:09", -40)
            .scan_latency(Duration::from_secs(30))
            .build(),
    );
    let options = SupervisorOptions::new().scan(ScanOptions::new().duration_secs(30));
    let stream = Supervisor::new(Arc::clone(&transport), options).run("CIRCUITPY");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!stream.is_finished());

    let end = stream.shutdown().await.unwrap();
    assert_eq!(end, StreamEnd::Cancelled);
    assert_eq!(transport.connect_calls(), 0);
}
