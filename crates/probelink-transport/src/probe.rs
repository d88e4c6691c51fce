//! Auto-baud detection.
//!
//! Each candidate rate is tried in priority order: open the port, write a
//! short probe sequence, let the device answer for a settle window, and read
//! back whatever arrived. At the right rate a text console answers with
//! printable ASCII; at a wrong rate framing errors turn the answer into
//! noise. The first rate whose sample is printable enough wins.
//!
//! Probing never touches DTR/RTS, and every transient link is dropped before
//! the next candidate is opened.

use probelink_core::config::ProbeConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::traits::{SerialTransport, TransportOpener};
use crate::types::{ProbeAttempt, ProbeOutcome};

/// Share of bytes that are printable ASCII, space, tab, CR or LF.
///
/// Returns `None` for an empty sample.
///
/// # Examples
///
/// ```
/// use probelink_transport::probe::printable_ratio;
///
/// assert_eq!(printable_ratio(b"OK\r\n"), Some(1.0));
/// assert_eq!(printable_ratio(b"ab\xff\x00"), Some(0.5));
/// assert_eq!(printable_ratio(b""), None);
/// ```
pub fn printable_ratio(sample: &[u8]) -> Option<f64> {
    if sample.is_empty() {
        return None;
    }
    let printable = sample
        .iter()
        .filter(|&&b| b.is_ascii_graphic() || matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .count();
    Some(printable as f64 / sample.len() as f64)
}

/// Open `port` at `baud_rate`, send the probe and collect the answer.
///
/// The transport is dropped when this returns.
async fn sample<O: TransportOpener>(
    opener: &O,
    port: &str,
    baud_rate: u32,
    config: &ProbeConfig,
) -> Result<Vec<u8>> {
    let transport = opener.open(port, baud_rate).await?;
    let (mut reader, mut writer) = transport.into_split();

    if !config.sequence.is_empty() {
        writer.write_all(&config.sequence).await?;
        writer.flush().await?;
    }

    let deadline = Instant::now() + config.settle();
    let mut buf = vec![0u8; config.max_read_bytes];
    let mut filled = 0;

    while filled < buf.len() {
        match timeout_at(deadline, reader.read(&mut buf[filled..])).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => filled += n,
            Ok(Err(e)) => return Err(e.into()),
        }
    }

    buf.truncate(filled);
    Ok(buf)
}

/// Find the baud rate the device on `port` answers at.
///
/// Never fails: open errors and silent candidates are recorded in the
/// returned attempts, and when nothing is accepted the first candidate is
/// used with `detected == false`.
///
/// # Examples
///
/// ```
/// use probelink_core::config::ProbeConfig;
/// use probelink_transport::mock::MockOpener;
/// use probelink_transport::probe::detect_baud_rate;
///
/// #[tokio::main]
/// async fn main() {
///     let (opener, handle) = MockOpener::new();
///     handle.greet_at(9600, b"ESP32 ready\r\n> ".to_vec());
///
///     let config = ProbeConfig {
///         candidates: vec![115_200, 9600],
///         settle_ms: 20,
///         ..ProbeConfig::default()
///     };
///     let outcome = detect_baud_rate(&opener, "/dev/mock0", &config).await;
///
///     assert_eq!(outcome.baud_rate, 9600);
///     assert!(outcome.detected);
/// }
/// ```
pub async fn detect_baud_rate<O: TransportOpener>(
    opener: &O,
    port: &str,
    config: &ProbeConfig,
) -> ProbeOutcome {
    let mut attempts = Vec::with_capacity(config.candidates.len());

    for &baud_rate in &config.candidates {
        let attempt = match sample(opener, port, baud_rate, config).await {
            Ok(bytes) => ProbeAttempt {
                baud_rate,
                bytes_read: bytes.len(),
                printable_ratio: printable_ratio(&bytes),
                error: None,
            },
            Err(e) => {
                warn!(port, baud_rate, error = %e, "Probe sample failed");
                ProbeAttempt {
                    baud_rate,
                    bytes_read: 0,
                    printable_ratio: None,
                    error: Some(e.to_string()),
                }
            }
        };

        debug!(
            baud_rate,
            bytes = attempt.bytes_read,
            ratio = ?attempt.printable_ratio,
            "Probe sample"
        );

        let accepted = attempt.accepted(config.printable_threshold);
        attempts.push(attempt);
        if accepted {
            info!(port, baud_rate, "Baud rate detected");
            return ProbeOutcome {
                baud_rate,
                detected: true,
                attempts,
            };
        }
    }

    let baud_rate = config.fallback_rate();
    info!(port, baud_rate, "No baud rate answered, using fallback");
    ProbeOutcome {
        baud_rate,
        detected: false,
        attempts,
    }
}
