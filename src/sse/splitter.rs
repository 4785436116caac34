//! Frame splitting on blank-line boundaries.

/// Frame terminator on the wire.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Accumulates decoded text and cuts it into complete frames.
///
/// Text after the last boundary stays buffered until the next
/// [`push`](Self::push) or [`finish`](Self::finish). A frame is handed out
/// once and removed from the buffer, so nothing is emitted twice.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: String,
    // Offset below which the buffer holds no delimiter start.
    scanned: usize,
}

impl FrameSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` and return every frame it completed, in order.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut frames = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].find(FRAME_DELIMITER) {
            let end = search_from + offset;
            frames.push(self.buffer[consumed..end].to_owned());
            consumed = end + FRAME_DELIMITER.len();
            search_from = consumed;
        }
        self.buffer.drain(..consumed);

        // A trailing '\n' may be the first half of the next delimiter.
        self.scanned = if self.buffer.ends_with('\n') {
            self.buffer.len() - 1
        } else {
            self.buffer.len()
        };
        frames
    }

    /// End-of-stream flush. Returns the residual text as a final frame
    /// unless it is blank. The buffer is empty afterwards.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    #[must_use]
    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
#[path = "splitter_test.rs"]
mod tests;
