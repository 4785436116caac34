//! Event-stream framing — bytes in, protocol messages out.
//!
//! DESIGN
//! ======
//! Three stages, each owning its own state:
//! - [`decoder::Utf8Decoder`] turns raw chunks into text, carrying partial
//!   multi-byte sequences across reads.
//! - [`splitter::FrameSplitter`] cuts text into frames on blank lines.
//! - [`parser::parse_frame`] turns one frame into a [`ProtocolMessage`] or
//!   drops it.
//!
//! [`EventStreamDecoder`] chains the three for one stream. It performs no I/O
//! and never interprets `data`; JSON belongs to the consumer.

pub mod decoder;
pub mod parser;
pub mod splitter;

use serde::{Deserialize, Serialize};

pub use decoder::{DecodeError, Utf8Decoder};
pub use parser::parse_frame;
pub use splitter::FrameSplitter;

/// One fully framed event emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    /// Value of the last `event:` line, if the frame had one.
    pub event: Option<String>,
    /// `data:` line contents joined by `\n`.
    pub data: String,
}

impl ProtocolMessage {
    /// Message without an event name.
    #[must_use]
    pub fn data(data: impl Into<String>) -> Self {
        Self { event: None, data: data.into() }
    }

    /// Message with an event name.
    #[must_use]
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self { event: Some(event.into()), data: data.into() }
    }
}

/// Incremental bytes → messages pipeline for a single stream.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    decoder: Utf8Decoder,
    splitter: FrameSplitter,
}

impl EventStreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every message it completed, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] when the bytes are not UTF-8.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<ProtocolMessage>, DecodeError> {
        let text = self.decoder.decode(bytes)?;
        Ok(self
            .splitter
            .push(&text)
            .iter()
            .filter_map(|frame| parse_frame(frame))
            .collect())
    }

    /// Flush at end-of-stream: parse the residual frame, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] when the stream stopped inside a
    /// multi-byte character.
    pub fn finish(&mut self) -> Result<Option<ProtocolMessage>, DecodeError> {
        if let Err(e) = self.decoder.finish() {
            self.splitter.clear();
            return Err(e);
        }
        Ok(self.splitter.finish().and_then(|frame| parse_frame(&frame)))
    }

    /// Drop any buffered bytes and text.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.splitter.clear();
    }

    /// Text received but not yet closed by a frame boundary.
    #[must_use]
    pub fn buffered(&self) -> &str {
        self.splitter.buffered()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
