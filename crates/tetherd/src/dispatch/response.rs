//! Response framing helpers for the session loop.

use std::io::Write;

use tether_wire::ResponseEnvelope;

use super::errors::DispatchError;

/// Writer that frames outgoing responses as newline-terminated JSON.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a response writer wrapping the given output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serializes an envelope as a single line and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_envelope(&mut self, envelope: &ResponseEnvelope) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, envelope)
            .map_err(DispatchError::SerializeResponse)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes a request unit back verbatim, newline-terminated; the echo
    /// path.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_verbatim(&mut self, unit: &[u8]) -> Result<(), DispatchError> {
        self.writer.write_all(unit)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
