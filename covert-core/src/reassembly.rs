//! Receiver-side accumulator: rebuilds the wire text from arriving chunks.

/// Growable byte buffer with one finalize step. Chunks are appended in
/// arrival order; the protocol carries no sequence numbers and relies on
/// the transport delivering in order.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    buf: Vec<u8>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &str) {
        self.buf.extend_from_slice(chunk.as_bytes());
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Take the full concatenation and leave the buffer empty. Every chunk
    /// appended was valid UTF-8, so the concatenation is too.
    pub fn take(&mut self) -> String {
        let bytes = std::mem::take(&mut self.buf);
        String::from_utf8(bytes).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
