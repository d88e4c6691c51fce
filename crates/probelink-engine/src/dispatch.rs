//! Lossless hand-off from the reader to the record consumer.
//!
//! The reader must never wait on observers, so completed records go into an
//! unbounded FIFO and a single consumer task turns them into
//! [`ResponseEnvelope`]s for the record sink. Order is preserved and nothing
//! is dropped between the two.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::envelope::ResponseEnvelope;
use crate::sinks::Sinks;
use crate::stats::EngineStats;

/// A record waiting for the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRecord {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Producer side of the dispatch queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DispatchSender {
    tx: mpsc::UnboundedSender<QueuedRecord>,
}

impl DispatchSender {
    /// Queue a record, stamped with the current time.
    ///
    /// Returns `false` if the consumer is gone.
    pub fn push(&self, text: String) -> bool {
        trace!(len = text.len(), "Record queued");
        self.tx
            .send(QueuedRecord {
                text,
                received_at: Utc::now(),
            })
            .is_ok()
    }

    pub fn push_all(&self, records: impl IntoIterator<Item = String>) {
        for record in records {
            self.push(record);
        }
    }
}

pub type DispatchReceiver = mpsc::UnboundedReceiver<QueuedRecord>;

pub fn channel() -> (DispatchSender, DispatchReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DispatchSender { tx }, rx)
}

/// Drain the queue into the record sink until cancelled or the queue closes.
pub async fn run_consumer(
    mut rx: DispatchReceiver,
    sinks: Sinks,
    stats: Arc<EngineStats>,
    cancel: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        debug!(record = %record.text, "Record dispatched");
        stats.record_dispatched();
        sinks.publish_record(Arc::new(ResponseEnvelope::new(
            record.text,
            record.received_at,
        )));
    }
    debug!("Consumer stopped");
}
