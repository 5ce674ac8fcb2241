//! Request framing for the newline-delimited JSON protocol.
//!
//! A request unit is optional whitespace, a single-line JSON object text, and
//! a terminating line feed. The framer owns the accumulating byte buffer for
//! one connection: complete units are extracted as they arrive and partial
//! trailing data waits for the next chunk.
//!
//! Protocol limitation, preserved deliberately: a request body cannot contain
//! a literal line feed, so clients must emit each JSON request on a single
//! line. Multi-line JSON is unrepresentable in this framing.

/// Streaming extractor of complete request units.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
}

impl Framer {
    /// Creates a framer with an empty buffer.
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Appends a freshly read chunk to the buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extracts the next complete request unit, if one is buffered.
    ///
    /// Consumes up to and including the delimiter, trims surrounding ASCII
    /// whitespace, and silently discards units that were all whitespace.
    /// Returns `None` once no complete unit remains; call again after the
    /// next [`Framer::extend`].
    pub fn next_request(&mut self) -> Option<Vec<u8>> {
        loop {
            let newline = self.buffer.iter().position(|byte| *byte == b'\n')?;
            let mut unit: Vec<u8> = self.buffer.drain(..=newline).collect();

            while unit.last().is_some_and(u8::is_ascii_whitespace) {
                unit.pop();
            }
            let lead = unit
                .iter()
                .position(|byte| !byte.is_ascii_whitespace())
                .unwrap_or(unit.len());
            unit.drain(..lead);

            if !unit.is_empty() {
                return Some(unit);
            }
        }
    }

    /// Bytes currently buffered, complete or partial.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
