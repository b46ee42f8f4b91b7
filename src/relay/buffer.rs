//! Line-oriented chunking of the serial byte stream.

/// Capacity of the line buffer, and so the largest chunk ever forwarded.
pub const LINE_BUFFER_CAPACITY: usize = 128;

/// Byte that ends a GPS sentence.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Fixed-capacity accumulator that releases a chunk on every line
/// terminator, or when full.
///
/// A line longer than the capacity is released in several chunks, so chunk
/// boundaries are not always sentence boundaries.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    data: [u8; LINE_BUFFER_CAPACITY],
    len: usize,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            data: [0; LINE_BUFFER_CAPACITY],
            len: 0,
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of buffered bytes.
    pub const fn capacity(&self) -> usize {
        LINE_BUFFER_CAPACITY
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Drop buffered bytes.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append one byte. Returns the chunk to send when the byte completes
    /// one; the buffer is then empty again for the next call.
    pub fn push(&mut self, byte: u8) -> Option<&[u8]> {
        self.data[self.len] = byte;
        self.len += 1;

        if byte == LINE_TERMINATOR || self.len == LINE_BUFFER_CAPACITY {
            let chunk_len = self.len;
            self.len = 0;
            return Some(&self.data[..chunk_len]);
        }
        None
    }

    /// Append `bytes`, handing every completed chunk to `flush` as soon as
    /// it completes.
    ///
    /// Stops at the first flush error; the buffer is left empty and the rest
    /// of `bytes` is not consumed.
    pub fn feed<E>(
        &mut self,
        bytes: &[u8],
        mut flush: impl FnMut(&[u8]) -> Result<(), E>,
    ) -> Result<(), E> {
        for &byte in bytes {
            if let Some(chunk) = self.push(byte) {
                flush(chunk)?;
            }
        }
        Ok(())
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
