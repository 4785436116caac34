//! Incremental UTF-8 decoding with a carry for split characters.

/// Error returned by [`Utf8Decoder`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The bytes contain a sequence that can never be valid UTF-8.
    #[error("invalid UTF-8 at byte {offset} of chunk")]
    InvalidUtf8 { offset: usize },
    /// The stream ended part-way through a multi-byte character.
    #[error("stream ended inside a partial UTF-8 sequence ({len} bytes)")]
    Truncated { len: usize },
}

/// Stateful decoder. Bytes of a character split across chunks are held back
/// until the rest arrives; the carry never exceeds 3 bytes.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, prefixed by any carry from the previous call.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] on a malformed sequence. The carry
    /// is discarded in that case.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String, DecodeError> {
        let mut input = std::mem::take(&mut self.carry);
        input.extend_from_slice(bytes);

        let valid = match std::str::from_utf8(&input) {
            Ok(_) => input.len(),
            Err(e) if e.error_len().is_some() => {
                return Err(DecodeError::InvalidUtf8 { offset: e.valid_up_to() });
            }
            Err(e) => e.valid_up_to(),
        };

        self.carry = input.split_off(valid);
        String::from_utf8(input).map_err(|e| DecodeError::InvalidUtf8 { offset: e.utf8_error().valid_up_to() })
    }

    /// Signal end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if a partial character is still held.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        let carry = std::mem::take(&mut self.carry);
        if carry.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Truncated { len: carry.len() })
        }
    }

    pub fn reset(&mut self) {
        self.carry.clear();
    }

    /// Number of bytes held back for the next call.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod tests;
