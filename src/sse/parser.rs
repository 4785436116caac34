//! Frame parsing — `event:` / `data:` lines into a [`ProtocolMessage`].

use super::ProtocolMessage;

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

/// Parse one complete frame.
///
/// The last `event:` line wins. Each `data:` line contributes one trimmed
/// segment; segments are joined with `\n`. Other lines (comments, unknown
/// fields, blanks) are ignored. A frame without any `data:` line yields
/// `None`, never an empty message.
#[must_use]
pub fn parse_frame(frame: &str) -> Option<ProtocolMessage> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for raw in frame.split('\n') {
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            event = Some(name.trim().to_owned());
        } else if let Some(value) = line.strip_prefix(DATA_PREFIX) {
            data.push(value.trim());
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(ProtocolMessage { event, data: data.join("\n") })
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
