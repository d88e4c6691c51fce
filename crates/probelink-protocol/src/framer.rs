//! Byte framer for the serial console stream.
//!
//! This module turns raw transport reads into framing events. The framer
//! accumulates bytes until CR or LF, cleans the line (ANSI sequences and
//! prompt), and detects the binary header that switches the stream into raw
//! payload mode.
//!
//! # Usage
//!
//! ```
//! use probelink_protocol::framer::{ByteFramer, FramerEvent};
//!
//! let mut framer = ByteFramer::new();
//!
//! // A transport read can end in the middle of a line
//! framer.feed(b"Scan st");
//! assert_eq!(framer.events_available(), 0);
//!
//! framer.feed(b"arted\r\n");
//! assert_eq!(
//!     framer.next_event(),
//!     Some(FramerEvent::Line("Scan started".to_string()))
//! );
//! ```

use bytes::Bytes;
use probelink_core::constants::{CR, DEFAULT_MAX_BINARY_LENGTH, DEFAULT_MAX_LINE_LENGTH, LF};
use std::collections::VecDeque;
use tracing::{trace, warn};

use crate::binary::{BinaryExtractor, Extract, parse_length_header};
use crate::clean::clean_line;

/// Initial line buffer capacity.
///
/// Console lines are rarely longer than a terminal row.
const INITIAL_LINE_CAPACITY: usize = 256;

/// Recommended initial capacity for the event queue.
///
/// A single read usually completes a handful of lines.
const INITIAL_EVENT_QUEUE_CAPACITY: usize = 8;

/// Output of the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    /// A cleaned, non-empty line.
    Line(String),

    /// A terminator with nothing before it (an empty line).
    Blank,

    /// A completed binary payload.
    Binary(Bytes),
}

/// State machine states for the framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Accumulating text until CR or LF.
    Line,

    /// Copying raw payload bytes into the binary extractor.
    Binary,
}

/// Stateful byte-to-line framer.
///
/// # State Machine
///
/// ```text
/// ┌──────────┐  "SD:READ:LENGTH:<n>" line   ┌──────────┐
/// │   Line   │─────────────────────────────>│  Binary  │
/// └──────────┘                              └──────────┘
///       ^                                        │
///       │         "\nSD:READ:END:" matched       │
///       └────────────────────────────────────────┘
///
/// State transitions:
/// - Line → Binary: a completed line carries the length token. The rest of
///   the same read goes straight to the extractor.
/// - Binary → Line: the terminator completes. Bytes after it are framed as
///   text again.
/// - Binary → Line: the payload outgrows its limit. The bytes past the
///   declared length are framed as text.
/// ```
///
/// # Terminators
///
/// CR and LF both end a line, and a CR immediately followed by LF is a single
/// terminator. A terminator with an empty line buffer yields
/// [`FramerEvent::Blank`], except for the LF half of a CRLF pair and for
/// terminators directly after a binary payload.
#[derive(Debug)]
pub struct ByteFramer {
    /// Bytes of the line being built.
    line: Vec<u8>,

    /// Active payload extraction.
    binary: Option<BinaryExtractor>,

    /// The previous byte was this terminator.
    last_terminator: Option<u8>,

    /// Swallow empty terminators until the first text byte after a payload.
    after_binary: bool,

    /// Device prompt to strip.
    prompt: Option<String>,

    max_line_length: usize,

    max_binary_length: usize,

    events: VecDeque<FramerEvent>,
}

impl ByteFramer {
    /// Create a framer with the default limits and no device prompt.
    pub fn new() -> Self {
        Self::with_options(None, DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a framer with a device prompt and a line length limit.
    ///
    /// # Example
    ///
    /// ```
    /// use probelink_protocol::framer::{ByteFramer, FramerEvent};
    ///
    /// let mut framer = ByteFramer::with_options(Some("esp32> ".to_string()), 1024);
    /// framer.feed(b"esp32> chipinfo\n");
    /// assert_eq!(framer.next_event(), Some(FramerEvent::Line("chipinfo".to_string())));
    /// ```
    pub fn with_options(prompt: Option<String>, max_line_length: usize) -> Self {
        Self {
            line: Vec::with_capacity(INITIAL_LINE_CAPACITY),
            binary: None,
            last_terminator: None,
            after_binary: false,
            prompt,
            max_line_length: max_line_length.max(1),
            max_binary_length: DEFAULT_MAX_BINARY_LENGTH,
            events: VecDeque::with_capacity(INITIAL_EVENT_QUEUE_CAPACITY),
        }
    }

    /// Bound every binary payload at `max_binary_length` bytes.
    pub fn with_max_binary_length(mut self, max_binary_length: usize) -> Self {
        self.max_binary_length = max_binary_length.max(1);
        self
    }

    /// Feed one transport read into the framer.
    ///
    /// Events are queued in arrival order. A read may contain the tail of a
    /// text line, a binary header, the payload and the text after the
    /// terminator; all of them are handled in one call.
    ///
    /// # Example
    ///
    /// ```
    /// use probelink_protocol::framer::{ByteFramer, FramerEvent};
    ///
    /// let mut framer = ByteFramer::new();
    /// framer.feed(b"SD:READ:LENGTH:2\r\nhi\nSD:READ:END:OK\n");
    ///
    /// let events: Vec<_> = framer.drain_events().collect();
    /// assert_eq!(events.len(), 3);
    /// assert!(matches!(&events[1], FramerEvent::Binary(b) if &b[..] == b"hi"));
    /// assert_eq!(events[2], FramerEvent::Line("OK".to_string()));
    /// ```
    pub fn feed(&mut self, bytes: &[u8]) {
        let mut i = 0;

        while i < bytes.len() {
            if let Some(extractor) = self.binary.as_mut() {
                match extractor.feed(&bytes[i..]) {
                    Extract::Complete { blob, consumed } => {
                        self.events.push_back(FramerEvent::Binary(blob));
                        self.binary = None;
                        self.after_binary = true;
                        self.last_terminator = None;
                        i += consumed;
                    }
                    Extract::Overflow { text, consumed } => {
                        self.binary = None;
                        self.after_binary = false;
                        self.last_terminator = None;
                        i += consumed;
                        self.feed(&text);
                    }
                    Extract::Pending => break,
                }
                continue;
            }

            let byte = bytes[i];
            i += 1;
            self.push_text_byte(byte);
        }
    }

    fn push_text_byte(&mut self, byte: u8) {
        if byte == CR || byte == LF {
            self.handle_terminator(byte);
            return;
        }

        self.last_terminator = None;
        self.after_binary = false;
        self.line.push(byte);

        if self.line.len() >= self.max_line_length {
            warn!(
                max = self.max_line_length,
                "Line exceeded maximum length, emitting partial line"
            );
            self.complete_line(None);
        }
    }

    fn handle_terminator(&mut self, byte: u8) {
        let crlf_pair = byte == LF && self.last_terminator == Some(CR);
        self.last_terminator = if crlf_pair { None } else { Some(byte) };

        if self.line.is_empty() {
            if !crlf_pair && !self.after_binary {
                self.events.push_back(FramerEvent::Blank);
            }
            return;
        }

        self.complete_line(Some(byte));
    }

    /// Emit the buffered line and enter binary mode if it is a header.
    fn complete_line(&mut self, terminator: Option<u8>) {
        let cleaned = clean_line(&self.line, self.prompt.as_deref());
        self.line.clear();

        if cleaned.is_empty() {
            return;
        }

        trace!(line = %cleaned, "Line framed");
        let declared = parse_length_header(&cleaned);
        self.events.push_back(FramerEvent::Line(cleaned));

        if let Some(len) = declared {
            trace!(len, "Binary header detected");
            let skip_lf = terminator == Some(CR);
            self.binary = Some(BinaryExtractor::with_max_length(
                Some(len),
                skip_lf,
                self.max_binary_length,
            ));
            self.last_terminator = None;
        }
    }

    /// Extract the next queued event.
    pub fn next_event(&mut self) -> Option<FramerEvent> {
        self.events.pop_front()
    }

    /// Returns current framer state.
    ///
    /// # Example
    ///
    /// ```
    /// use probelink_protocol::framer::{ByteFramer, FramerState};
    ///
    /// let mut framer = ByteFramer::new();
    /// assert_eq!(framer.state(), FramerState::Line);
    ///
    /// framer.feed(b"SD:READ:LENGTH:10\n");
    /// assert_eq!(framer.state(), FramerState::Binary);
    /// ```
    pub fn state(&self) -> FramerState {
        if self.binary.is_some() {
            FramerState::Binary
        } else {
            FramerState::Line
        }
    }

    /// Returns number of events ready for extraction.
    pub fn events_available(&self) -> usize {
        self.events.len()
    }

    /// Bytes of the line currently being accumulated.
    pub fn pending_line_len(&self) -> usize {
        self.line.len()
    }

    /// Clear all internal buffers and reset state.
    ///
    /// Drops the partial line, any in-progress binary payload and queued
    /// events.
    pub fn clear(&mut self) {
        self.line.clear();
        self.binary = None;
        self.last_terminator = None;
        self.after_binary = false;
        self.events.clear();
    }

    /// Returns an iterator that drains all currently queued events.
    ///
    /// It does NOT process more data - call [`feed()`] first.
    ///
    /// [`feed()`]: ByteFramer::feed
    pub fn drain_events(&mut self) -> DrainEvents<'_> {
        DrainEvents { framer: self }
    }
}

impl Default for ByteFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator that drains events from a [`ByteFramer`].
///
/// Created by [`ByteFramer::drain_events`].
pub struct DrainEvents<'a> {
    framer: &'a mut ByteFramer,
}

impl<'a> Iterator for DrainEvents<'a> {
    type Item = FramerEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_event()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.framer.events_available();
        (len, Some(len))
    }
}

impl<'a> ExactSizeIterator for DrainEvents<'a> {
    fn len(&self) -> usize {
        self.framer.events_available()
    }
}
