//! Binary payload extraction from a line-oriented stream.
//!
//! After the firmware prints `SD:READ:LENGTH:<n>`, it writes raw file bytes
//! followed by the literal terminator `\nSD:READ:END:`. The extractor copies
//! bytes into an accumulator while scanning for that terminator.
//!
//! # Partial Matches
//!
//! A payload may legitimately contain a prefix of the terminator (a newline,
//! or `\nSD:` inside a text file). When the scan breaks after `K` matched
//! bytes, those `K` bytes are appended to the blob and the breaking byte is
//! tested again against the first terminator byte:
//!
//! ```text
//! payload ... \n S D : X ...
//!             ^^^^^^^ matched 4, then 'X' breaks
//!             -> "\nSD:" flushed into blob, 'X' retested at position 0
//! ```
//!
//! # Runaway Transfers
//!
//! If the terminator never arrives (the device reset mid-transfer), the
//! accumulator stops at the declared length plus a small overrun, or at the
//! configured maximum. The transfer is then abandoned: bytes up to the
//! declared length are dropped and the rest is handed back as text.

use bytes::{Bytes, BytesMut};
use probelink_core::constants::{
    BINARY_LENGTH_TOKEN, BINARY_OVERRUN_SLACK, BINARY_PREALLOC_LIMIT, BINARY_TERMINATOR,
    DEFAULT_MAX_BINARY_LENGTH, LF,
};
use tracing::{debug, warn};

/// Parse the declared length from a binary header line.
///
/// The token may appear anywhere in the line; the digits right after it are
/// the byte count.
///
/// # Examples
///
/// ```
/// use probelink_protocol::binary::parse_length_header;
///
/// assert_eq!(parse_length_header("SD:READ:LENGTH:512"), Some(512));
/// assert_eq!(parse_length_header("SD:READ:LENGTH:"), None);
/// assert_eq!(parse_length_header("AP #1: x"), None);
/// ```
pub fn parse_length_header(line: &str) -> Option<usize> {
    let start = line.find(BINARY_LENGTH_TOKEN)? + BINARY_LENGTH_TOKEN.len();
    let digits: String = line[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Outcome of one [`BinaryExtractor::feed`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    /// All input was consumed and the terminator is still outstanding.
    Pending,

    /// The terminator completed after `consumed` input bytes.
    Complete { blob: Bytes, consumed: usize },

    /// The payload outgrew its limit after `consumed` input bytes.
    ///
    /// `text` holds the accumulated bytes past the declared length; they
    /// belong to line mode, ahead of the unconsumed input.
    Overflow { text: Bytes, consumed: usize },
}

/// Accumulates one binary payload until the terminator is matched.
#[derive(Debug)]
pub struct BinaryExtractor {
    /// Bytes copied so far.
    buffer: BytesMut,

    /// Number of terminator bytes matched so far.
    matched: usize,

    /// Byte count announced by the header, if any.
    declared_len: Option<usize>,

    /// Accumulated bytes (including a pending terminator prefix) never exceed this.
    limit: usize,

    /// The header line ended in CR; swallow one LF before the payload.
    skip_leading_lf: bool,
}

impl BinaryExtractor {
    /// Create an extractor for a payload announced with `declared_len` bytes.
    ///
    /// Set `skip_leading_lf` when the header line ended on a CR whose LF has
    /// not been seen yet.
    pub fn new(declared_len: Option<usize>, skip_leading_lf: bool) -> Self {
        Self::with_max_length(declared_len, skip_leading_lf, DEFAULT_MAX_BINARY_LENGTH)
    }

    /// Like [`BinaryExtractor::new`], bounding the payload at `max_length`.
    pub fn with_max_length(
        declared_len: Option<usize>,
        skip_leading_lf: bool,
        max_length: usize,
    ) -> Self {
        let max_length = max_length.max(1);
        let limit = declared_len
            .map_or(max_length, |len| len.saturating_add(BINARY_OVERRUN_SLACK))
            .min(max_length);
        let reserve = declared_len.unwrap_or(0).min(BINARY_PREALLOC_LIMIT).min(limit);

        Self {
            buffer: BytesMut::with_capacity(reserve),
            matched: 0,
            declared_len,
            limit,
            skip_leading_lf,
        }
    }

    /// Feed bytes into the extractor.
    ///
    /// Returns [`Extract::Complete`] once the terminator completes, where
    /// `consumed` counts the bytes of `data` used up to and including the
    /// terminator. Remaining bytes belong to line mode again.
    ///
    /// # Examples
    ///
    /// ```
    /// use probelink_protocol::binary::{BinaryExtractor, Extract};
    ///
    /// let mut extractor = BinaryExtractor::new(Some(3), false);
    /// assert_eq!(extractor.feed(b"ab"), Extract::Pending);
    ///
    /// let Extract::Complete { blob, consumed } = extractor.feed(b"c\nSD:READ:END:OK") else {
    ///     panic!("terminator not matched");
    /// };
    /// assert_eq!(&blob[..], b"abc");
    /// assert_eq!(consumed, 14);
    /// ```
    pub fn feed(&mut self, data: &[u8]) -> Extract {
        for (i, &byte) in data.iter().enumerate() {
            if self.buffer.len() + self.matched >= self.limit {
                return Extract::Overflow {
                    text: self.abandon(),
                    consumed: i,
                };
            }
            if let Some(blob) = self.push(byte) {
                return Extract::Complete {
                    blob,
                    consumed: i + 1,
                };
            }
        }
        Extract::Pending
    }

    /// Process one byte.
    fn push(&mut self, byte: u8) -> Option<Bytes> {
        if self.skip_leading_lf {
            self.skip_leading_lf = false;
            if byte == LF {
                return None;
            }
        }

        if byte == BINARY_TERMINATOR[self.matched] {
            self.matched += 1;
            if self.matched == BINARY_TERMINATOR.len() {
                return Some(self.finish());
            }
            return None;
        }

        if self.matched > 0 {
            // False positive: the matched prefix is payload.
            self.buffer
                .extend_from_slice(&BINARY_TERMINATOR[..self.matched]);
            self.matched = 0;

            if byte == BINARY_TERMINATOR[0] {
                self.matched = 1;
                return None;
            }
        }

        self.buffer.extend_from_slice(&[byte]);
        None
    }

    /// Give up on the transfer, returning the bytes that are text again.
    fn abandon(&mut self) -> Bytes {
        self.buffer
            .extend_from_slice(&BINARY_TERMINATOR[..self.matched]);
        self.matched = 0;

        let mut data = self.buffer.split();
        let keep = self.declared_len.unwrap_or(0).min(data.len());
        let text = data.split_off(keep).freeze();

        warn!(
            declared = ?self.declared_len,
            dropped = data.len(),
            returned = text.len(),
            "Binary terminator never arrived, abandoning transfer"
        );
        text
    }

    fn finish(&mut self) -> Bytes {
        self.matched = 0;
        let blob = self.buffer.split().freeze();

        match self.declared_len {
            Some(expected) if expected != blob.len() => {
                warn!(
                    expected,
                    received = blob.len(),
                    "Binary payload length differs from header"
                );
            }
            _ => debug!(len = blob.len(), "Binary payload complete"),
        }

        blob
    }

    /// Bytes accumulated so far, excluding a pending terminator prefix.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Length announced by the header.
    pub fn declared_len(&self) -> Option<usize> {
        self.declared_len
    }
}
