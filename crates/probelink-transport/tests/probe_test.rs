//! Auto-baud detection against scripted mock devices.

use probelink_core::config::ProbeConfig;
use probelink_transport::mock::{MockOpener, OpenRecord};
use probelink_transport::{SerialTransport, TransportOpener, detect_baud_rate};
use std::time::Duration;

const PORT: &str = "/dev/mock0";

fn config(candidates: &[u32]) -> ProbeConfig {
    ProbeConfig {
        candidates: candidates.to_vec(),
        settle_ms: 30,
        ..ProbeConfig::default()
    }
}

#[tokio::test]
async fn test_first_readable_candidate_wins() {
    let (opener, handle) = MockOpener::new();
    handle.greet_at(115_200, b"\xf0\x0f\xff\x81\x00\xfe".to_vec());
    handle.greet_at(230_400, b"ESP32 Marauder v1.2\r\n> ".to_vec());
    handle.greet_at(9600, b"also readable\r\n".to_vec());

    let outcome = detect_baud_rate(&opener, PORT, &config(&[115_200, 230_400, 9600])).await;

    assert!(outcome.detected);
    assert_eq!(outcome.baud_rate, 230_400);
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.attempts[0].printable_ratio, Some(0.0));
    assert!(outcome.attempts[1].accepted(0.75));

    // Probing stops at the accepted rate.
    let rates: Vec<u32> = handle.opens().iter().map(|o| o.baud_rate).collect();
    assert_eq!(rates, vec![115_200, 230_400]);
}

#[tokio::test]
async fn test_silent_device_falls_back_to_first_candidate() {
    let (opener, handle) = MockOpener::new();

    let outcome = detect_baud_rate(&opener, PORT, &config(&[921_600, 115_200])).await;

    assert!(!outcome.detected);
    assert_eq!(outcome.baud_rate, 921_600);
    assert_eq!(outcome.attempts.len(), 2);
    assert!(outcome.attempts.iter().all(|a| a.bytes_read == 0));
    assert!(outcome.attempts.iter().all(|a| a.printable_ratio.is_none()));
    assert_eq!(handle.opens().len(), 2);
}

#[tokio::test]
async fn test_open_failures_are_recorded() {
    let (opener, handle) = MockOpener::new();
    handle.set_fail_open(true);

    let outcome = detect_baud_rate(&opener, PORT, &config(&[115_200, 9600])).await;

    assert!(!outcome.detected);
    assert_eq!(outcome.baud_rate, 115_200);
    assert!(
        outcome
            .attempts
            .iter()
            .all(|a| a.error.as_deref().is_some_and(|e| e.contains("mock open failure")))
    );
}

#[tokio::test]
async fn test_probe_sequence_is_sent_and_link_closed() {
    let (opener, mut handle) = MockOpener::new();
    handle.greet_at(115_200, b"OK\r\n".to_vec());

    let outcome = detect_baud_rate(&opener, PORT, &config(&[115_200])).await;
    assert!(outcome.detected);

    let mut device = handle.next_device().await.unwrap();
    assert_eq!(device.baud_rate, 115_200);
    // Both host halves were dropped, so the device sees the probe then EOF.
    assert_eq!(device.read_to_close().await.unwrap(), b"\r\n".to_vec());
}

#[tokio::test]
async fn test_probe_does_not_touch_control_lines() {
    let (opener, handle) = MockOpener::new();
    handle.greet_at(115_200, b"ready\r\n".to_vec());

    detect_baud_rate(&opener, PORT, &config(&[115_200])).await;

    assert!(handle.control_lines().is_empty());
    assert!(handle.parameters().is_empty());
}

#[tokio::test]
async fn test_empty_sequence_writes_nothing() {
    let (opener, mut handle) = MockOpener::new();
    let cfg = ProbeConfig {
        sequence: Vec::new(),
        ..config(&[115_200])
    };

    detect_baud_rate(&opener, PORT, &cfg).await;

    let mut device = handle.next_device().await.unwrap();
    assert!(device.read_to_close().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_read_is_capped() {
    let (opener, handle) = MockOpener::new();
    handle.greet_at(115_200, vec![b'A'; 1024]);
    let cfg = ProbeConfig {
        max_read_bytes: 64,
        ..config(&[115_200])
    };

    let outcome = detect_baud_rate(&opener, PORT, &cfg).await;

    assert_eq!(outcome.attempts[0].bytes_read, 64);
    assert!(outcome.detected);
}

#[tokio::test]
async fn test_open_delay_is_applied() {
    let (opener, handle) = MockOpener::new();
    handle.set_open_delay(Duration::from_millis(20));

    let started = tokio::time::Instant::now();
    let transport = opener.open(PORT, 57_600).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(transport.port_name(), PORT);
    assert_eq!(
        handle.opens(),
        vec![OpenRecord {
            port: PORT.into(),
            baud_rate: 57_600
        }]
    );
}
