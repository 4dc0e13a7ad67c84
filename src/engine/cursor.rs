//! Read position over the payload being streamed

use std::ops::Range;
use std::sync::Arc;

/// A slice of the payload reserved for one buffer
///
/// Holds its own reference to the payload, so the bytes can be copied into the
/// device after the engine lock is released, even if a `write` has replaced
/// the payload in the meantime.
#[derive(Debug, Clone)]
pub struct Chunk {
    payload: Arc<Vec<u8>>,
    range: Range<usize>,
}

impl Chunk {
    /// The reserved bytes
    pub fn bytes(&self) -> &[u8] {
        &self.payload[self.range.clone()]
    }

    /// Number of reserved bytes
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether the chunk is empty (never true for chunks handed out by the cursor)
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// The single active payload and how far into it playback has been scheduled
#[derive(Debug, Default)]
pub struct PlaybackCursor {
    payload: Arc<Vec<u8>>,
    offset: usize,
}

impl PlaybackCursor {
    /// A cursor with no payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the current payload and install `data` at offset 0
    pub fn replace(&mut self, data: Vec<u8>) {
        self.clear();
        self.payload = Arc::new(data);
    }

    /// Release the current payload
    pub fn clear(&mut self) {
        self.payload = Arc::default();
        self.offset = 0;
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether no payload is installed
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes already handed out to buffers
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes not yet handed out
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }

    /// Whether every byte has been handed out
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.payload.len()
    }

    /// Reserve the next `min(max_len, remaining)` bytes and advance past them
    ///
    /// Returns `None` once the payload is exhausted.
    pub fn take_chunk(&mut self, max_len: usize) -> Option<Chunk> {
        if self.is_exhausted() || max_len == 0 {
            return None;
        }
        let end = self.offset + max_len.min(self.remaining());
        let range = self.offset..end;
        self.offset = end;
        Some(Chunk {
            payload: Arc::clone(&self.payload),
            range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_cover_payload() {
        let mut cursor = PlaybackCursor::new();
        cursor.replace((0..=255u8).cycle().take(5000).collect());

        let lengths: Vec<usize> = std::iter::from_fn(|| cursor.take_chunk(2048))
            .map(|chunk| chunk.len())
            .collect();

        assert_eq!(lengths, vec![2048, 2048, 904]);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.offset(), 5000);
    }

    #[test]
    fn test_replace_resets_offset() {
        let mut cursor = PlaybackCursor::new();
        cursor.replace(vec![1; 100]);
        cursor.take_chunk(60);
        assert_eq!(cursor.remaining(), 40);

        cursor.replace(vec![2; 50]);
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.len(), 50);
        assert_eq!(cursor.take_chunk(2048).unwrap().bytes(), &[2; 50][..]);
    }

    #[test]
    fn test_chunk_outlives_replacement() {
        let mut cursor = PlaybackCursor::new();
        cursor.replace(vec![7; 10]);
        let chunk = cursor.take_chunk(4).unwrap();

        cursor.replace(vec![9; 10]);
        assert_eq!(chunk.bytes(), &[7; 4][..]);
    }

    #[test]
    fn test_empty_payload_is_exhausted() {
        let mut cursor = PlaybackCursor::new();
        assert!(cursor.is_exhausted());
        cursor.replace(Vec::new());
        assert!(cursor.take_chunk(2048).is_none());
    }
}
