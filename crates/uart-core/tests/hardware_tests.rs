//! Hardware integration tests for uart-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```text
//! cargo test --package uart-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Set `UART_BLE_DEVICE` to the name token of a board running the telemetry
//! firmware (defaults to `CIRCUITPY`):
//! ```text
//! UART_BLE_DEVICE=ARDUINO cargo test --package uart-core --test hardware_tests -- --ignored
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use uart_core::{
    BtleTransport, Located, ScanOptions, StreamEnd, Supervisor, SupervisorOptions, Transport,
    locate,
};

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("uart_core=debug")
        .with_test_writer()
        .try_init();
}

fn get_device() -> String {
    env::var("UART_BLE_DEVICE").unwrap_or_else(|_| "CIRCUITPY".to_string())
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_discover_lists_peers() {
    init_logging();
    let transport = BtleTransport::new().await.expect("no adapter");
    let peers = timeout(BLE_TIMEOUT, transport.discover(Duration::from_secs(5)))
        .await
        .expect("scan timed out")
        .expect("scan failed");

    println!("Found {} peers", peers.len());
    for peer in &peers {
        println!("  {} - {} - {:?}", peer.display_name(), peer.address, peer.rssi);
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_locate_target() {
    init_logging();
    let target = get_device();
    let transport = BtleTransport::new().await.expect("no adapter");
    let located = locate(&transport, &target, &ScanOptions::default())
        .await
        .expect("scan failed");

    match located {
        Located::Found(device) => println!("Found {} at {}", device.name, device.address),
        Located::NotFound(peers) => panic!("'{}' not found among {} peers", target, peers.len()),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_stream_records_then_cancel() {
    init_logging();
    let transport = Arc::new(BtleTransport::new().await.expect("no adapter"));
    let mut stream = Supervisor::new(transport, SupervisorOptions::default()).run(get_device());

    for _ in 0..5 {
        let record = timeout(BLE_TIMEOUT, stream.await_latest())
            .await
            .expect("no record within timeout")
            .expect("stream ended early");
        println!("{}", record.display_spaced());
        assert!(record.parse_sample().is_ok(), "unexpected record: {record}");
    }

    let end = timeout(BLE_TIMEOUT, stream.shutdown())
        .await
        .expect("cleanup timed out")
        .expect("stream failed");
    assert_eq!(end, StreamEnd::Cancelled);
}
