//! Chunker: split a payload into an ordered sequence of bounded pieces.

use crate::config::DEFAULT_CHUNK_SIZE;

/// Split `payload` into contiguous chunks of `chunk_size` characters each;
/// the last chunk holds the remainder. Splits on character boundaries so
/// every chunk is itself valid UTF-8. An empty payload yields no chunks.
///
/// Pure and restartable: the returned iterator is `Clone` and borrows the
/// payload. A zero `chunk_size` falls back to the default (the validated
/// configuration rejects it before a transfer starts).
pub fn split(payload: &str, chunk_size: usize) -> Chunks<'_> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    Chunks {
        rest: payload,
        chunk_size,
    }
}

/// Iterator over the chunks of a payload. See [`split`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    chunk_size: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .char_indices()
            .nth(self.chunk_size)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}
