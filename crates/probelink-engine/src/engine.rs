//! Connection lifecycle and the per-connection tasks.
//!
//! ```text
//!                 ┌──────────── LinkEngine ─────────────┐
//!                 │  lifecycle lock · connecting flag   │
//!                 │  state watch · transition history   │
//!                 └──────┬──────────────────────┬───────┘
//!                        │ connect               │ send_command
//!                        v                       v
//!   transport ──read──> Reader ──feed──> LinkPipeline <── flush / arm
//!                        │                  ^   │
//!                        │ lines, blobs     │   │ records
//!                        v                  │   v
//!                      sinks            Ticker  dispatch queue ──> Consumer ──> record sink
//! ```
//!
//! One connect, disconnect or probe runs at a time, serialized by an async
//! mutex. A `connecting` flag rejects a second connect before it ever waits
//! on that mutex. Every connection owns a [`CancellationToken`]; disconnect
//! cancels it and waits for the tasks, and if that takes longer than the
//! disconnect timeout the engine force-resets: tasks are aborted, handles
//! dropped and all buffers cleared.

use chrono::{DateTime, Utc};
use probelink_core::constants::STATE_HISTORY_CAPACITY;
use probelink_core::{ConnectionState, EngineConfig, LineParameters};
use probelink_protocol::{EncodeCommand, LinkPipeline, PipelineEvent};
use probelink_transport::{ProbeOutcome, SerialTransport, TransportOpener, detect_baud_rate};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::dispatch::{self, DispatchSender};
use crate::error::{EngineError, Result};
use crate::sinks::{Sinks, Subscription};
use crate::stats::{EngineStats, StatsSnapshot};

type WriterOf<O> = <<O as TransportOpener>::Transport as SerialTransport>::Writer;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub at: DateTime<Utc>,
    pub reason: &'static str,
}

/// State reachable from every task, independent of the transport type.
struct Shared {
    config: EngineConfig,
    state: watch::Sender<ConnectionState>,
    history: Mutex<VecDeque<StateTransition>>,
    pipeline: Mutex<LinkPipeline>,
    sinks: Sinks,
    stats: Arc<EngineStats>,
}

impl Shared {
    /// Apply a transition if the state machine allows it.
    fn transition(&self, to: ConnectionState, reason: &'static str) -> bool {
        let mut from = None;
        self.state.send_if_modified(|state| {
            if *state == to || !state.can_transition_to(&to) {
                return false;
            }
            from = Some(*state);
            *state = to;
            true
        });

        let Some(from) = from else {
            trace!(to = %to, reason, "State transition skipped");
            return false;
        };

        debug!(%from, %to, reason, "State transition");
        let mut history = lock(&self.history);
        if history.len() == STATE_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(StateTransition {
            from,
            to,
            at: Utc::now(),
            reason,
        });
        true
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Run one transport read through the pipeline and route the output.
    fn ingest(&self, bytes: &[u8], now: Instant, queue: &DispatchSender) {
        trace!(len = bytes.len(), "Bytes read");
        self.stats.bytes(bytes.len());

        let events = lock(&self.pipeline).feed(bytes, now);
        for event in events {
            match event {
                PipelineEvent::Line(line) => {
                    self.stats.line();
                    self.sinks.publish_line(line);
                }
                PipelineEvent::Record(record) => {
                    queue.push(record);
                }
                PipelineEvent::Binary(blob) => {
                    debug!(len = blob.len(), "Binary transfer complete");
                    self.stats.binary();
                    self.sinks.publish_binary(blob);
                }
            }
        }
    }

    fn reset_buffers(&self) {
        lock(&self.pipeline).reset();
    }
}

/// A live connection.
struct Session {
    port: String,
    params: LineParameters,
    connected_at: DateTime<Utc>,
    cancel: CancellationToken,
    queue: DispatchSender,
    tasks: JoinSet<()>,
}

struct Inner<O: TransportOpener> {
    opener: O,
    shared: Arc<Shared>,
    connecting: AtomicBool,
    lifecycle: tokio::sync::Mutex<()>,
    session: Mutex<Option<Session>>,
    writer: tokio::sync::Mutex<Option<WriterOf<O>>>,
}

/// Clears the `connecting` flag however the connect call ends.
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How a session task ended, for shutdown logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Finished,
    Cancelled,
    Panic,
}

impl TaskTermination {
    fn classify(result: std::result::Result<(), JoinError>) -> Self {
        match result {
            Ok(()) => Self::Finished,
            Err(e) if e.is_cancelled() => Self::Cancelled,
            Err(_) => Self::Panic,
        }
    }
}

/// Serial-link engine.
///
/// Cheap to clone; all clones drive the same link.
///
/// # Examples
///
/// ```
/// use probelink_core::{ConnectionState, EngineConfig};
/// use probelink_engine::LinkEngine;
/// use probelink_protocol::{DeviceCommand, ResponseKind};
/// use probelink_transport::mock::MockOpener;
///
/// #[tokio::main]
/// async fn main() -> probelink_engine::Result<()> {
///     let (opener, mut handle) = MockOpener::new();
///     let engine = LinkEngine::new(opener, EngineConfig::default())?;
///     let mut records = engine.subscribe_records();
///
///     engine.connect("/dev/mock0", 115_200).await?;
///     assert_eq!(engine.state(), ConnectionState::Connected);
///
///     let mut device = handle.next_device().await.unwrap();
///     assert!(engine.send_command(&DeviceCommand::Version).await);
///     assert_eq!(device.read_line().await?, "version");
///
///     device.send(b"Version: 1.4.2\r\n").await?;
///     let record = records.next_item().await.unwrap();
///     assert!(matches!(record.kind(), ResponseKind::Version { .. }));
///
///     engine.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct LinkEngine<O: TransportOpener> {
    inner: Arc<Inner<O>>,
}

impl<O: TransportOpener> Clone for LinkEngine<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: TransportOpener> LinkEngine<O> {
    /// Create an engine in the `Disconnected` state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` does not validate.
    pub fn new(opener: O, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            pipeline: Mutex::new(LinkPipeline::new(&config)),
            sinks: Sinks::new(&config.sinks),
            state: watch::Sender::new(ConnectionState::Disconnected),
            history: Mutex::new(VecDeque::with_capacity(STATE_HISTORY_CAPACITY)),
            stats: Arc::new(EngineStats::default()),
            config,
        });

        Ok(Self {
            inner: Arc::new(Inner {
                opener,
                shared,
                connecting: AtomicBool::new(false),
                lifecycle: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                writer: tokio::sync::Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// Recent state transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        lock(&self.inner.shared.history).iter().cloned().collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.shared.stats.snapshot()
    }

    /// Port of the current session, if any.
    pub fn port(&self) -> Option<String> {
        lock(&self.inner.session).as_ref().map(|s| s.port.clone())
    }

    /// Line parameters of the current session, if any.
    pub fn line_parameters(&self) -> Option<LineParameters> {
        lock(&self.inner.session).as_ref().map(|s| s.params)
    }

    /// When the current session was opened, if any.
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.session).as_ref().map(|s| s.connected_at)
    }

    pub fn subscribe_lines(&self) -> Subscription<String> {
        self.inner.shared.sinks.subscribe_lines()
    }

    pub fn subscribe_records(&self) -> Subscription<Arc<crate::ResponseEnvelope>> {
        self.inner.shared.sinks.subscribe_records()
    }

    pub fn subscribe_binaries(&self) -> Subscription<bytes::Bytes> {
        self.inner.shared.sinks.subscribe_binaries()
    }

    /// Open `port` at `baud_rate` and start the reader, consumer and ticker.
    ///
    /// Any existing session is disconnected first. On success the state is
    /// `Connected`; on failure it is `Error` and the error is returned.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ConnectInProgress`] if another connect is running.
    /// - [`EngineError::Timeout`] if opening takes longer than the connect
    ///   timeout.
    /// - [`EngineError::Transport`] if the port cannot be opened or
    ///   configured.
    pub async fn connect(&self, port: &str, baud_rate: u32) -> Result<()> {
        if self.inner.connecting.swap(true, Ordering::AcqRel) {
            warn!(port, "Connect rejected, another connect is in progress");
            return Err(EngineError::ConnectInProgress);
        }
        let _connecting = ConnectingGuard(&self.inner.connecting);

        self.disconnect().await;

        let _lifecycle = self.inner.lifecycle.lock().await;
        let shared = &self.inner.shared;
        shared.transition(ConnectionState::Connecting, "connect requested");
        info!(port, baud_rate, "Connecting");

        let connect_timeout = shared.config.link.connect_timeout();
        let result = match timeout(connect_timeout, self.open_session(port, baud_rate)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::timeout("connect", connect_timeout)),
        };

        match result {
            Ok(()) => {
                shared.transition(ConnectionState::Connected, "port opened");
                shared.stats.connected();
                info!(port, baud_rate, "Connected");
                Ok(())
            }
            Err(e) => {
                shared.transition(ConnectionState::Error, "connect failed");
                warn!(port, baud_rate, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    /// Detect the baud rate on `port`, then connect at it.
    pub async fn connect_auto(&self, port: &str) -> Result<ProbeOutcome> {
        let outcome = self.probe_baud_rate(port).await?;
        self.connect(port, outcome.baud_rate).await?;
        Ok(outcome)
    }

    async fn open_session(&self, port: &str, baud_rate: u32) -> Result<()> {
        let shared = &self.inner.shared;
        let link = &shared.config.link;

        let mut transport = self.inner.opener.open(port, baud_rate).await?;
        let params = link.line_parameters(baud_rate);
        transport.set_parameters(&params)?;
        transport.set_control_lines(link.dtr, link.rts)?;

        shared.reset_buffers();

        let (reader, writer) = transport.into_split();
        *self.inner.writer.lock().await = Some(writer);

        let cancel = CancellationToken::new();
        let (queue, queue_rx) = dispatch::channel();
        let mut tasks = JoinSet::new();

        tasks.spawn(read_loop(
            reader,
            Arc::clone(shared),
            queue.clone(),
            cancel.clone(),
        ));
        tasks.spawn(dispatch::run_consumer(
            queue_rx,
            shared.sinks.clone(),
            Arc::clone(&shared.stats),
            cancel.clone(),
        ));
        tasks.spawn(tick_loop(Arc::clone(shared), queue.clone(), cancel.clone()));

        *lock(&self.inner.session) = Some(Session {
            port: port.to_string(),
            params,
            connected_at: Utc::now(),
            cancel,
            queue,
            tasks,
        });
        Ok(())
    }

    /// Close the link.
    ///
    /// Cancels the session tasks and waits for them, dropping the transport.
    /// If that does not finish within the disconnect timeout the engine is
    /// force-reset instead. Either way the state ends `Disconnected`.
    pub async fn disconnect(&self) {
        let limit = self.inner.shared.config.link.disconnect_timeout();
        if timeout(limit, self.close_gracefully()).await.is_err() {
            warn!(timeout = ?limit, "Disconnect timed out");
            self.force_reset();
        }
    }

    async fn close_gracefully(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let session = lock(&self.inner.session).take();
        if let Some(mut session) = session {
            session.cancel.cancel();

            if let Some(mut writer) = self.inner.writer.lock().await.take()
                && let Err(e) = writer.shutdown().await
            {
                debug!(error = %e, "Writer shutdown failed");
            }

            while let Some(result) = session.tasks.join_next().await {
                if TaskTermination::classify(result) == TaskTermination::Panic {
                    error!(port = %session.port, "Session task panicked");
                }
            }
            info!(port = %session.port, "Disconnected");
        }

        self.inner.shared.reset_buffers();
        self.inner
            .shared
            .transition(ConnectionState::Disconnected, "disconnect");
    }

    /// Tear everything down without waiting.
    ///
    /// Aborts the session tasks, drops the transport halves, clears all
    /// buffers and sets `Disconnected`. Used when a graceful disconnect hangs.
    pub fn force_reset(&self) {
        warn!("Forcing link reset");

        if let Some(session) = lock(&self.inner.session).take() {
            session.cancel.cancel();
            // Dropping the JoinSet aborts the tasks and with them the reader.
            drop(session.tasks);
        }

        match self.inner.writer.try_lock() {
            Ok(mut writer) => drop(writer.take()),
            // A write in flight holds it; it times out and the next connect
            // replaces the handle.
            Err(_) => warn!("Writer busy during reset"),
        }

        self.inner.shared.reset_buffers();
        self.inner
            .shared
            .transition(ConnectionState::Disconnected, "force reset");
    }

    /// Write a command, returning whether it reached the transport.
    ///
    /// See [`try_send_command`](Self::try_send_command) for the details.
    pub async fn send_command<C: EncodeCommand + ?Sized>(&self, command: &C) -> bool {
        match self.try_send_command(command).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Command not sent");
                false
            }
        }
    }

    /// Write a command followed by CRLF.
    ///
    /// The in-progress record is flushed first so the command's echo never
    /// joins the previous response. When the command is the chip-info
    /// command the collector is armed before the bytes go out, with the
    /// command's `max_wait` as its ceiling. No retry on failure.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotConnected`] without a live session.
    /// - [`EngineError::Timeout`] if the write exceeds the write timeout.
    /// - [`EngineError::Transport`] if the write fails.
    pub async fn try_send_command<C: EncodeCommand + ?Sized>(&self, command: &C) -> Result<()> {
        let encoded = command.encode();
        let shared = &self.inner.shared;

        let mut writer = self.inner.writer.lock().await;
        let queue = lock(&self.inner.session).as_ref().map(|s| s.queue.clone());
        let (Some(writer), Some(queue)) = (writer.as_mut(), queue) else {
            return Err(EngineError::NotConnected);
        };

        let flushed = {
            let mut pipeline = lock(&shared.pipeline);
            let flushed = pipeline.flush_aggregation();
            if encoded
                .text
                .eq_ignore_ascii_case(shared.config.chip_info.command.trim())
            {
                debug!("Arming chip-info collector");
                pipeline.arm_chip_info(Instant::now(), encoded.max_wait, &encoded.text);
            }
            flushed
        };
        queue.push_all(flushed);

        let bytes = encoded.wire_bytes();
        let write_timeout = shared.config.link.write_timeout();
        let write = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };
        match timeout(write_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(EngineError::timeout("write", write_timeout)),
        }

        shared.stats.command_sent();
        debug!(command = %encoded.text, "Command sent");
        Ok(())
    }

    /// Detect the baud rate the device on `port` answers at.
    ///
    /// Runs under the lifecycle lock, so it never overlaps a connect or
    /// disconnect. Control lines are left untouched.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ConnectInProgress`] while a connect is running.
    /// - [`EngineError::ProbeWhileConnected`] while a session is open.
    pub async fn probe_baud_rate(&self, port: &str) -> Result<ProbeOutcome> {
        if self.inner.connecting.load(Ordering::Acquire) {
            return Err(EngineError::ConnectInProgress);
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.state().is_active() || lock(&self.inner.session).is_some() {
            return Err(EngineError::probe_while_connected(port));
        }

        info!(port, "Probing baud rate");
        let outcome = detect_baud_rate(&self.inner.opener, port, &self.config().probe).await;
        info!(
            port,
            baud_rate = outcome.baud_rate,
            detected = outcome.detected,
            "Probe finished"
        );
        Ok(outcome)
    }
}

/// Reader task: pull bytes from the transport into the pipeline.
///
/// A read that times out is an idle line, not an error. EOF and I/O
/// failures count towards the consecutive error limit, after which the link
/// goes to `Error` and the reader stops.
async fn read_loop<R>(
    mut reader: R,
    shared: Arc<Shared>,
    queue: DispatchSender,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let link = &shared.config.link;
    let read_timeout = link.read_timeout();
    let mut buf = vec![0u8; link.read_buffer_size];
    let mut consecutive_errors = 0u32;

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = timeout(read_timeout, reader.read(&mut buf)) => read,
        };

        let failure = match read {
            Err(_) => continue,
            Ok(Ok(0)) => "end of stream".to_string(),
            Ok(Ok(n)) => {
                consecutive_errors = 0;
                shared.ingest(&buf[..n], Instant::now(), &queue);
                continue;
            }
            Ok(Err(e)) => e.to_string(),
        };

        consecutive_errors += 1;
        shared.stats.read_error();
        warn!(error = %failure, consecutive_errors, "Read failed");

        if consecutive_errors >= link.max_consecutive_read_errors {
            error!(consecutive_errors, "Too many read errors, reader stopping");
            shared.transition(ConnectionState::Error, "read errors");
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(link.read_retry_delay()) => {}
        }
    }
    debug!("Reader stopped");
}

/// Ticker task: flush records that went idle.
async fn tick_loop(shared: Arc<Shared>, queue: DispatchSender, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(shared.config.link.tick_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let records = lock(&shared.pipeline).flush_idle(Instant::now());
                queue.push_all(records);
            }
        }
    }
    debug!("Ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use probelink_transport::mock::MockOpener;

    fn engine() -> LinkEngine<MockOpener> {
        let (opener, _handle) = MockOpener::new();
        LinkEngine::new(opener, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let (opener, _handle) = MockOpener::new();
        let mut config = EngineConfig::default();
        config.probe.candidates.clear();

        let result = LinkEngine::new(opener, config);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_starts_disconnected() {
        let engine = engine();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(engine.history().is_empty());
        assert!(engine.port().is_none());
    }

    #[test]
    fn test_invalid_transition_is_skipped() {
        let engine = engine();
        let shared = &engine.inner.shared;

        assert!(!shared.transition(ConnectionState::Connected, "test"));
        assert!(shared.transition(ConnectionState::Connecting, "test"));
        assert!(!shared.transition(ConnectionState::Connecting, "test"));
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let engine = engine();
        let shared = &engine.inner.shared;

        for _ in 0..STATE_HISTORY_CAPACITY {
            shared.transition(ConnectionState::Connecting, "test");
            shared.transition(ConnectionState::Disconnected, "test");
        }

        let history = engine.history();
        assert_eq!(history.len(), STATE_HISTORY_CAPACITY);
        assert_eq!(history.last().unwrap().to, ConnectionState::Disconnected);
    }

    #[test]
    fn test_force_reset_when_idle() {
        let engine = engine();
        engine.force_reset();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_without_session() {
        let engine = engine();
        let result = engine
            .try_send_command(&probelink_protocol::DeviceCommand::Version)
            .await;
        assert!(matches!(result, Err(EngineError::NotConnected)));
        assert!(!engine.send_command(&probelink_protocol::DeviceCommand::Version).await);
    }

    #[test]
    fn test_task_termination() {
        assert_eq!(TaskTermination::classify(Ok(())), TaskTermination::Finished);
    }
}
