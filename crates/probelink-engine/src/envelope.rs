//! Records as delivered to observers.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use probelink_protocol::{Decoded, ResponseKind, decode};
use std::fmt;

/// A completed record with its receive time and a lazily decoded view.
///
/// Decoding runs at most once, on the first call to
/// [`decoded`](Self::decoded), no matter how many observers share the
/// envelope. Observers that only want the text never pay for it.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use probelink_engine::ResponseEnvelope;
/// use probelink_protocol::ResponseKind;
///
/// let envelope = ResponseEnvelope::new("Version: 1.4.2", Utc::now());
/// assert!(!envelope.is_decoded());
///
/// assert!(matches!(envelope.kind(), ResponseKind::Version { .. }));
/// assert!(envelope.is_decoded());
/// ```
pub struct ResponseEnvelope {
    text: String,
    received_at: DateTime<Utc>,
    decoded: OnceCell<Decoded>,
}

impl ResponseEnvelope {
    pub fn new(text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            received_at,
            decoded: OnceCell::new(),
        }
    }

    /// Record text as grouped by the aggregator.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the record was completed.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Structured view of the record, decoded on first use.
    pub fn decoded(&self) -> &Decoded {
        self.decoded.get_or_init(|| decode(&self.text))
    }

    pub fn kind(&self) -> &ResponseKind {
        &self.decoded().kind
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }
}

impl fmt::Debug for ResponseEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseEnvelope")
            .field("text", &self.text)
            .field("received_at", &self.received_at)
            .field("decoded", &self.decoded.get())
            .finish()
    }
}
