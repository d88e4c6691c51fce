//! Integration tests for LinkEngine
//!
//! These tests drive the full lifecycle against the in-memory mock transport:
//! the test plays the firmware on the device end of each link.

use bytes::Bytes;
use probelink_core::{ConnectionState, EngineConfig, LineParameters};
use probelink_engine::{EngineError, LinkEngine, ResponseEnvelope, Subscription};
use probelink_protocol::{DeviceCommand, RawCommand, ResponseKind};
use probelink_transport::mock::{MockDevice, MockLinkHandle, MockOpener};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const PORT: &str = "/dev/mock0";
const WAIT: Duration = Duration::from_secs(2);

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.link.read_timeout_ms = 50;
    config.link.read_retry_delay_ms = 10;
    config.link.disconnect_timeout_ms = 300;
    config.link.connect_timeout_ms = 300;
    config.aggregation.idle_flush_ms = 100;
    config.chip_info.idle_flush_ms = 100;
    config.link.tick_interval_ms = 20;
    config
}

fn engine_with(config: EngineConfig) -> (LinkEngine<MockOpener>, MockLinkHandle) {
    let (opener, handle) = MockOpener::new();
    (LinkEngine::new(opener, config).unwrap(), handle)
}

async fn connected(config: EngineConfig) -> (LinkEngine<MockOpener>, MockLinkHandle, MockDevice) {
    let (engine, mut handle) = engine_with(config);
    engine.connect(PORT, 115_200).await.unwrap();
    let device = handle.next_device().await.unwrap();
    (engine, handle, device)
}

async fn next<T: Clone>(sub: &mut Subscription<T>) -> T {
    timeout(WAIT, sub.next_item())
        .await
        .expect("timed out waiting for sink item")
        .expect("sink closed")
}

async fn wait_for_line(lines: &mut Subscription<String>, wanted: &str) {
    loop {
        if next(lines).await == wanted {
            return;
        }
    }
}

async fn find_record(
    records: &mut Subscription<Arc<ResponseEnvelope>>,
    pred: impl Fn(&ResponseKind) -> bool,
) -> Arc<ResponseEnvelope> {
    loop {
        let record = next(records).await;
        if pred(record.kind()) {
            return record;
        }
    }
}

#[tokio::test]
async fn test_connect_configures_link() {
    let (engine, handle, _device) = connected(fast_config()).await;

    assert_eq!(engine.state(), ConnectionState::Connected);
    assert_eq!(engine.port().as_deref(), Some(PORT));
    assert_eq!(engine.line_parameters(), Some(LineParameters::new(115_200)));
    assert!(engine.connected_at().is_some());
    assert_eq!(handle.parameters(), vec![LineParameters::new(115_200)]);
    assert_eq!(handle.control_lines(), vec![(true, true)]);

    let states: Vec<_> = engine.history().iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    assert_eq!(engine.stats().connects, 1);
}

#[tokio::test]
async fn test_control_lines_follow_config() {
    let mut config = fast_config();
    config.link.dtr = false;
    config.link.rts = false;
    let (_engine, handle, _device) = connected(config).await;

    assert_eq!(handle.control_lines(), vec![(false, false)]);
}

#[tokio::test]
async fn test_concurrent_connect_is_rejected() {
    let (engine, handle) = engine_with(fast_config());
    handle.set_open_delay(Duration::from_millis(150));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.connect(PORT, 115_200).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let second = engine.connect(PORT, 9600).await;
    assert!(matches!(second, Err(EngineError::ConnectInProgress)));

    first.await.unwrap().unwrap();
    assert_eq!(engine.state(), ConnectionState::Connected);
    assert_eq!(handle.opens().len(), 1);
}

#[tokio::test]
async fn test_connect_timeout_sets_error_then_recovers() {
    let (engine, handle) = engine_with(fast_config());
    handle.set_open_delay(Duration::from_millis(1000));

    let result = engine.connect(PORT, 115_200).await;
    assert!(matches!(
        result,
        Err(EngineError::Timeout {
            operation: "connect",
            ..
        })
    ));
    assert_eq!(engine.state(), ConnectionState::Error);

    handle.set_open_delay(Duration::ZERO);
    engine.connect(PORT, 115_200).await.unwrap();
    assert_eq!(engine.state(), ConnectionState::Connected);

    let states: Vec<_> = engine.history().iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
}

#[tokio::test]
async fn test_open_failure_sets_error() {
    let (engine, handle) = engine_with(fast_config());
    handle.set_fail_open(true);

    let result = engine.connect(PORT, 115_200).await;
    assert!(matches!(result, Err(EngineError::Transport(_))));
    assert_eq!(engine.state(), ConnectionState::Error);
    assert!(engine.port().is_none());
}

#[tokio::test]
async fn test_lines_and_records_flow() {
    let (engine, mut handle) = engine_with(fast_config());
    let mut lines = engine.subscribe_lines();
    let mut records = engine.subscribe_records();
    engine.connect(PORT, 115_200).await.unwrap();
    let mut device = handle.next_device().await.unwrap();

    device
        .send(b"\x1b[32mAP #1: HomeNet\x1b[0m\r\n  BSSID: aa:bb:cc:dd:ee:ff\r\n  RSSI: -42\r\n\r\n")
        .await
        .unwrap();

    assert_eq!(next(&mut lines).await, "AP #1: HomeNet");
    assert_eq!(next(&mut lines).await, "  BSSID: aa:bb:cc:dd:ee:ff");
    assert_eq!(next(&mut lines).await, "  RSSI: -42");

    let record = next(&mut records).await;
    let ResponseKind::AccessPoint(ap) = record.kind() else {
        panic!("expected access point, got {:?}", record.kind());
    };
    assert_eq!(ap.ssid, "HomeNet");
    assert_eq!(ap.rssi, -42);
    assert_eq!(ap.bssid, "aa:bb:cc:dd:ee:ff");

    let stats = engine.stats();
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.records, 1);
    assert!(stats.bytes_read > 0);
}

#[tokio::test]
async fn test_idle_record_is_flushed_by_ticker() {
    let (engine, mut handle) = engine_with(fast_config());
    let mut records = engine.subscribe_records();
    engine.connect(PORT, 115_200).await.unwrap();
    let mut device = handle.next_device().await.unwrap();

    device
        .send(b"BLE #4: aa:bb:cc:00:11:22\r\n  RSSI: -70\r\n")
        .await
        .unwrap();

    let record = next(&mut records).await;
    assert!(matches!(record.kind(), ResponseKind::BleDevice(_)));
    assert_eq!(record.text(), "BLE #4: aa:bb:cc:00:11:22, RSSI: -70");
}

#[tokio::test]
async fn test_command_flushes_pending_record() {
    let mut config = fast_config();
    // Keep the idle path out of the way so only the command can flush.
    config.aggregation.idle_flush_ms = 60_000;
    let (engine, mut handle) = engine_with(config);
    let mut lines = engine.subscribe_lines();
    let mut records = engine.subscribe_records();
    engine.connect(PORT, 115_200).await.unwrap();
    let mut device = handle.next_device().await.unwrap();

    device
        .send(b"STA #1: 11:22:33:44:55:66\r\n  RSSI: -60\r\n")
        .await
        .unwrap();
    wait_for_line(&mut lines, "  RSSI: -60").await;
    assert!(records.try_recv().is_none());

    assert!(engine.send_command(&DeviceCommand::StopScan).await);
    assert_eq!(device.read_line().await.unwrap(), "stopscan");

    let record = next(&mut records).await;
    assert!(matches!(record.kind(), ResponseKind::Station(_)));
    assert_eq!(engine.stats().commands_sent, 1);
}

#[tokio::test]
async fn test_chip_info_command_arms_collector() {
    let (engine, mut handle) = engine_with(fast_config());
    let mut records = engine.subscribe_records();
    engine.connect(PORT, 115_200).await.unwrap();
    let mut device = handle.next_device().await.unwrap();

    assert!(engine.send_command(&DeviceCommand::ChipInfo).await);
    assert_eq!(device.read_line().await.unwrap(), "chipinfo");

    device
        .send(b"chipinfo\r\nModel: ESP32-C3\r\nCores: 1\r\n[CHIPINFO_END]\r\n")
        .await
        .unwrap();

    let record = find_record(&mut records, |k| matches!(k, ResponseKind::ChipInfo(_))).await;
    let ResponseKind::ChipInfo(info) = record.kind() else {
        unreachable!();
    };
    assert_eq!(info.model.as_deref(), Some("ESP32-C3"));
    assert_eq!(info.cores, Some(1));
}

#[tokio::test]
async fn test_binary_transfer_reaches_binary_sink() {
    let (engine, mut handle) = engine_with(fast_config());
    let mut lines = engine.subscribe_lines();
    let mut binaries = engine.subscribe_binaries();
    engine.connect(PORT, 115_200).await.unwrap();
    let mut device = handle.next_device().await.unwrap();

    let payload: &[u8] = b"\xd4\xc3\xb2\xa1\r\n\x00\x01";
    let mut transfer = format!("SD:READ:LENGTH:{}\r\n", payload.len()).into_bytes();
    transfer.extend_from_slice(payload);
    transfer.extend_from_slice(b"\nSD:READ:END:\r\nOK\r\n");
    device.send(&transfer).await.unwrap();

    assert_eq!(next(&mut binaries).await, Bytes::copy_from_slice(payload));
    assert_eq!(next(&mut lines).await, "SD:READ:LENGTH:7");
    assert_eq!(next(&mut lines).await, "OK");
    assert_eq!(engine.stats().binaries, 1);
}

#[tokio::test]
async fn test_device_gone_sets_error() {
    let (engine, mut handle) = engine_with(fast_config());
    let mut state = engine.watch_state();
    engine.connect(PORT, 115_200).await.unwrap();
    drop(handle.next_device().await.unwrap());

    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Error))
        .await
        .expect("reader never gave up")
        .unwrap();

    let max = engine.config().link.max_consecutive_read_errors as u64;
    assert_eq!(engine.stats().read_errors, max);

    engine.disconnect().await;
    assert_eq!(engine.state(), ConnectionState::Disconnected);
    assert!(engine.port().is_none());
}

#[tokio::test]
async fn test_disconnect_closes_transport() {
    let (engine, _handle, mut device) = connected(fast_config()).await;

    engine.disconnect().await;

    assert_eq!(engine.state(), ConnectionState::Disconnected);
    let rest = timeout(WAIT, device.read_to_close()).await.unwrap().unwrap();
    assert!(rest.is_empty());
    assert!(!engine.send_command(&DeviceCommand::Version).await);
}

#[tokio::test]
async fn test_reconnect_replaces_session_and_resets_buffers() {
    let (engine, mut handle) = engine_with(fast_config());
    let mut records = engine.subscribe_records();
    engine.connect(PORT, 115_200).await.unwrap();
    let mut first = handle.next_device().await.unwrap();

    // Half a record, never finished on this link.
    first.send(b"SVC #1: printer").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    engine.connect(PORT, 9600).await.unwrap();
    let mut second = handle.next_device().await.unwrap();
    assert!(timeout(WAIT, first.read_to_close()).await.is_ok());
    assert_eq!(engine.line_parameters().map(|p| p.baud_rate), Some(9600));

    second.send(b"Version: 2.0.1\r\n").await.unwrap();
    let record = next(&mut records).await;
    assert_eq!(record.text(), "Version: 2.0.1");
}

#[tokio::test]
async fn test_hung_disconnect_forces_reset() {
    let mut config = fast_config();
    config.link.write_timeout_ms = 5_000;
    let (engine, _handle, _device) = connected(config).await;

    // The device never reads, so a write larger than the link buffer stalls
    // while holding the writer.
    let stalled = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .try_send_command(&RawCommand::new("x".repeat(256 * 1024)))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = tokio::time::Instant::now();
    engine.disconnect().await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(engine.state(), ConnectionState::Disconnected);
    assert!(engine.port().is_none());
    assert_eq!(
        engine.history().last().map(|t| t.reason),
        Some("force reset")
    );
    stalled.abort();
}

#[tokio::test]
async fn test_probe_refused_while_connected() {
    let (engine, _handle, _device) = connected(fast_config()).await;

    let result = engine.probe_baud_rate(PORT).await;
    assert!(matches!(result, Err(EngineError::ProbeWhileConnected { .. })));
}

#[tokio::test]
async fn test_connect_auto_uses_detected_rate() {
    let mut config = fast_config();
    config.probe.candidates = vec![115_200, 57_600];
    config.probe.settle_ms = 30;
    let (engine, handle) = engine_with(config);
    handle.greet_at(115_200, b"\xff\xfe\x00\x80".to_vec());
    handle.greet_at(57_600, b"ESP32 shell\r\n> ".to_vec());

    let outcome = engine.connect_auto(PORT).await.unwrap();

    assert!(outcome.detected);
    assert_eq!(outcome.baud_rate, 57_600);
    assert_eq!(engine.state(), ConnectionState::Connected);
    assert_eq!(engine.line_parameters().map(|p| p.baud_rate), Some(57_600));

    let rates: Vec<u32> = handle.opens().iter().map(|o| o.baud_rate).collect();
    assert_eq!(rates, vec![115_200, 57_600, 57_600]);
    // Only the real connect drives the control lines.
    assert_eq!(handle.control_lines(), vec![(true, true)]);
}
