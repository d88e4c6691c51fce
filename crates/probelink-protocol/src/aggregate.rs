//! Multi-line record aggregation.
//!
//! The [`Aggregator`] owns at most one in-progress record. Completed records
//! are queued as plain text and drained by the caller.
//!
//! # Flush Rules
//!
//! | Input | Active record | Effect |
//! |-------|---------------|--------|
//! | start of kind K | any | flush active, start K |
//! | continuation | yes | append with the kind's joiner |
//! | end marker | yes | append, flush |
//! | blank line | yes | flush |
//! | single line | any | flush active, emit line as its own record |
//! | idle for threshold | yes | flush |

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::classify::{LineClass, RecordKind, classify};

/// What [`Aggregator::apply`] did with a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Line started or extended the active record.
    Buffered,

    /// Previous record was flushed and the line started a new one.
    Replaced,

    /// Active record was flushed.
    Flushed,

    /// Line was emitted as its own record, after flushing any active one.
    Single { flushed: bool },

    /// Blank line with nothing active.
    Ignored,
}

#[derive(Debug)]
struct ActiveRecord {
    kind: RecordKind,
    text: String,
    last_activity: Instant,
}

/// Multi-line aggregation state machine.
///
/// # Example
///
/// ```
/// use probelink_protocol::aggregate::Aggregator;
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// let mut aggregator = Aggregator::new(Duration::from_millis(500));
/// let now = Instant::now();
///
/// aggregator.accept("AP #1: HomeNet", now);
/// aggregator.accept("  RSSI: -40", now);
/// aggregator.accept("", now);
///
/// assert_eq!(aggregator.next_record(), Some("AP #1: HomeNet, RSSI: -40".to_string()));
/// ```
#[derive(Debug)]
pub struct Aggregator {
    active: Option<ActiveRecord>,
    idle_flush: Duration,
    records: VecDeque<String>,
}

impl Aggregator {
    pub fn new(idle_flush: Duration) -> Self {
        Self {
            active: None,
            idle_flush,
            records: VecDeque::new(),
        }
    }

    /// Classify a line against the active record and apply it.
    pub fn accept(&mut self, line: &str, now: Instant) -> FlushDecision {
        let class = classify(line, self.active_kind());
        self.apply(class, line, now)
    }

    /// Apply an already classified line.
    pub fn apply(&mut self, class: LineClass, line: &str, now: Instant) -> FlushDecision {
        match class {
            LineClass::Start(kind) => {
                let flushed = self.flush();
                self.active = Some(ActiveRecord {
                    kind,
                    text: line.trim().to_string(),
                    last_activity: now,
                });
                if flushed {
                    FlushDecision::Replaced
                } else {
                    FlushDecision::Buffered
                }
            }
            LineClass::Continuation => match self.active.as_mut() {
                Some(active) => {
                    active.text.push_str(active.kind.rules().joiner);
                    active.text.push_str(line.trim());
                    active.last_activity = now;
                    FlushDecision::Buffered
                }
                None => self.emit_single(line),
            },
            LineClass::EndMarker => match self.active.as_mut() {
                Some(active) => {
                    active.text.push_str(active.kind.rules().joiner);
                    active.text.push_str(line.trim());
                    self.flush();
                    FlushDecision::Flushed
                }
                None => self.emit_single(line),
            },
            LineClass::Blank => {
                if self.flush() {
                    FlushDecision::Flushed
                } else {
                    FlushDecision::Ignored
                }
            }
            LineClass::Single => self.emit_single(line),
        }
    }

    fn emit_single(&mut self, line: &str) -> FlushDecision {
        let flushed = self.flush();
        self.records.push_back(line.trim().to_string());
        FlushDecision::Single { flushed }
    }

    /// Flush the active record, if any.
    ///
    /// Returns `true` when a record was queued.
    pub fn flush(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                debug!(kind = %active.kind, "Record flushed");
                self.records.push_back(active.text);
                true
            }
            None => false,
        }
    }

    /// Flush the active record if it has been idle for the threshold.
    pub fn flush_idle(&mut self, now: Instant) -> bool {
        let expired = self
            .active
            .as_ref()
            .is_some_and(|a| now.saturating_duration_since(a.last_activity) >= self.idle_flush);

        if expired {
            debug!("Idle threshold reached");
            self.flush()
        } else {
            false
        }
    }

    /// Kind of the record being built.
    pub fn active_kind(&self) -> Option<RecordKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    /// Extract the next completed record.
    pub fn next_record(&mut self) -> Option<String> {
        self.records.pop_front()
    }

    pub fn records_available(&self) -> usize {
        self.records.len()
    }

    /// Drain all completed records in order.
    pub fn drain_records(&mut self) -> std::collections::vec_deque::Drain<'_, String> {
        self.records.drain(..)
    }

    /// Drop the active record and all queued records.
    pub fn clear(&mut self) {
        self.active = None;
        self.records.clear();
    }
}
