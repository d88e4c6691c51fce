//! Synchronous byte-to-record pipeline.
//!
//! [`LinkPipeline`] wires the framer, the aggregator and the chip-info
//! collector together. It is the single owner of all per-connection parsing
//! state and has no I/O or runtime of its own: the engine's reader feeds it
//! bytes, the engine's ticker calls [`LinkPipeline::flush_idle`].
//!
//! ```text
//! bytes ──> ByteFramer ──Line──> raw sink
//!               │          ├──> ChipInfoCollector ──> records
//!               │          └──> Aggregator ─────────> records
//!               ├──Blank──> Aggregator (flush)
//!               └──Binary─> binary sink
//! ```

use bytes::Bytes;
use probelink_core::EngineConfig;
use std::time::Duration;
use tokio::time::Instant;

use crate::aggregate::Aggregator;
use crate::chipinfo::{ArmSource, ChipInfoCollector};
use crate::framer::{ByteFramer, FramerEvent};

/// Output of the pipeline, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A cleaned line for the raw sink. Every framed line appears exactly once.
    Line(String),

    /// A completed record for the dispatch queue.
    Record(String),

    /// A completed binary payload.
    Binary(Bytes),
}

/// Framer, aggregator and chip-info collector behind one interface.
///
/// # Example
///
/// ```
/// use probelink_core::EngineConfig;
/// use probelink_protocol::pipeline::{LinkPipeline, PipelineEvent};
/// use tokio::time::Instant;
///
/// let mut pipeline = LinkPipeline::new(&EngineConfig::default());
/// let events = pipeline.feed(b"AP #1: HomeNet\r\n  RSSI: -40\r\n\r\n", Instant::now());
///
/// assert_eq!(
///     events,
///     vec![
///         PipelineEvent::Line("AP #1: HomeNet".into()),
///         PipelineEvent::Line("  RSSI: -40".into()),
///         PipelineEvent::Record("AP #1: HomeNet, RSSI: -40".into()),
///     ]
/// );
/// ```
#[derive(Debug)]
pub struct LinkPipeline {
    framer: ByteFramer,
    aggregator: Aggregator,
    chip_info: ChipInfoCollector,
}

impl LinkPipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            framer: ByteFramer::with_options(
                config.framing.prompt.clone(),
                config.framing.max_line_length,
            )
            .with_max_binary_length(config.framing.max_binary_length),
            aggregator: Aggregator::new(config.aggregation.idle_flush()),
            chip_info: ChipInfoCollector::new(&config.chip_info),
        }
    }

    /// Feed one transport read and return everything it completed.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) -> Vec<PipelineEvent> {
        self.framer.feed(bytes);

        let mut out = Vec::new();
        while let Some(event) = self.framer.next_event() {
            match event {
                FramerEvent::Line(line) => {
                    let active = self.aggregator.active_kind();
                    let claimed = self.chip_info.observe_beside(&line, now, active);
                    if !claimed {
                        self.aggregator.accept(&line, now);
                    }
                    out.push(PipelineEvent::Line(line));
                }
                FramerEvent::Blank => {
                    self.aggregator.flush();
                }
                FramerEvent::Binary(blob) => {
                    out.push(PipelineEvent::Binary(blob));
                }
            }
            self.collect_records(&mut out);
        }
        out
    }

    /// Flush records that have been idle past their thresholds.
    pub fn flush_idle(&mut self, now: Instant) -> Vec<String> {
        self.aggregator.flush_idle(now);
        self.chip_info.flush_idle(now);
        self.drain_records()
    }

    /// Flush the in-progress aggregation record unconditionally.
    ///
    /// Called before a command is written so its echo never joins the
    /// previous response. The chip-info collection is left alone.
    pub fn flush_aggregation(&mut self) -> Vec<String> {
        self.aggregator.flush();
        self.drain_records()
    }

    /// Arm the chip-info collector ahead of the chip-info command.
    pub fn arm_chip_info(&mut self, now: Instant, ceiling: Duration, echo: &str) {
        self.chip_info
            .arm(now, ArmSource::Command, ceiling, Some(echo));
    }

    /// Drop all per-connection state.
    pub fn reset(&mut self) {
        self.framer.clear();
        self.aggregator.clear();
        self.chip_info.clear();
    }

    pub fn framer(&self) -> &ByteFramer {
        &self.framer
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn chip_info(&self) -> &ChipInfoCollector {
        &self.chip_info
    }

    fn drain_records(&mut self) -> Vec<String> {
        let mut records: Vec<String> = self.aggregator.drain_records().collect();
        records.extend(self.chip_info.drain_records());
        records
    }

    fn collect_records(&mut self, out: &mut Vec<PipelineEvent>) {
        out.extend(self.drain_records().into_iter().map(PipelineEvent::Record));
    }
}
