//! Broadcast sinks for observers.
//!
//! Three independent bounded channels fan the engine's output out to any
//! number of observers:
//!
//! | Sink    | Item                     | Producer      |
//! |---------|--------------------------|---------------|
//! | lines   | `String`                 | reader task   |
//! | records | `Arc<ResponseEnvelope>`  | consumer task |
//! | binary  | `Bytes`                  | reader task   |
//!
//! Publishing never waits. When an observer falls behind, the oldest items
//! it has not read are overwritten and its next receive reports how many
//! were lost as [`Delivery::Missed`].

use bytes::Bytes;
use probelink_core::config::SinkConfig;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{trace, warn};

use crate::envelope::ResponseEnvelope;

/// What an observer gets from [`Subscription::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    Item(T),

    /// The observer lagged and this many items were dropped.
    Missed(u64),
}

/// Receiving end of one sink.
#[derive(Debug)]
pub struct Subscription<T> {
    sink: &'static str,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    fn new(sink: &'static str, rx: broadcast::Receiver<T>) -> Self {
        Self { sink, rx }
    }

    /// Wait for the next item or lag notice.
    ///
    /// Returns `None` once the engine that owns the sink is dropped.
    pub async fn recv(&mut self) -> Option<Delivery<T>> {
        match self.rx.recv().await {
            Ok(item) => Some(Delivery::Item(item)),
            Err(RecvError::Lagged(missed)) => Some(self.lagged(missed)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv). `None` when empty.
    pub fn try_recv(&mut self) -> Option<Delivery<T>> {
        match self.rx.try_recv() {
            Ok(item) => Some(Delivery::Item(item)),
            Err(TryRecvError::Lagged(missed)) => Some(self.lagged(missed)),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    /// Wait for the next item, stepping over lag notices.
    pub async fn next_item(&mut self) -> Option<T> {
        loop {
            match self.recv().await? {
                Delivery::Item(item) => return Some(item),
                Delivery::Missed(_) => continue,
            }
        }
    }

    fn lagged(&self, missed: u64) -> Delivery<T> {
        warn!(sink = self.sink, missed, "Observer lagging, items dropped");
        Delivery::Missed(missed)
    }
}

/// The engine's three output sinks.
#[derive(Debug, Clone)]
pub struct Sinks {
    lines: broadcast::Sender<String>,
    records: broadcast::Sender<Arc<ResponseEnvelope>>,
    binaries: broadcast::Sender<Bytes>,
}

impl Sinks {
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            lines: broadcast::channel(config.line_capacity).0,
            records: broadcast::channel(config.record_capacity).0,
            binaries: broadcast::channel(config.binary_capacity).0,
        }
    }

    pub fn subscribe_lines(&self) -> Subscription<String> {
        Subscription::new("lines", self.lines.subscribe())
    }

    pub fn subscribe_records(&self) -> Subscription<Arc<ResponseEnvelope>> {
        Subscription::new("records", self.records.subscribe())
    }

    pub fn subscribe_binaries(&self) -> Subscription<Bytes> {
        Subscription::new("binary", self.binaries.subscribe())
    }

    // A send error only means nobody is subscribed right now.

    pub(crate) fn publish_line(&self, line: String) {
        if self.lines.send(line).is_err() {
            trace!("No line observers");
        }
    }

    pub(crate) fn publish_record(&self, record: Arc<ResponseEnvelope>) {
        if self.records.send(record).is_err() {
            trace!("No record observers");
        }
    }

    pub(crate) fn publish_binary(&self, blob: Bytes) {
        if self.binaries.send(blob).is_err() {
            trace!("No binary observers");
        }
    }
}
