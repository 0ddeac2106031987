use std::io::Read;

use crc32fast::Hasher;

use crate::error::ArchiveError;

/// Pending bytes are gathered up to this size before they hit the CRC
/// primitive, so that trickles of tiny writes do not pay per-call overhead.
const CRC_BUFFER_SIZE: usize = 64 * 1024;

/// Incremental CRC32 with write coalescing and post-hoc combining.
#[derive(Default, Clone)]
pub struct Crc32Accumulator {
    hasher: Hasher,
    pending: Vec<u8>,
}

impl Crc32Accumulator {
    pub fn new() -> Crc32Accumulator {
        Crc32Accumulator::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        if bytes.len() >= CRC_BUFFER_SIZE {
            self.drain();
            self.hasher.update(bytes);
            return;
        }
        if self.pending.len() + bytes.len() > CRC_BUFFER_SIZE {
            self.drain();
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Folds in the CRC of `other_len` bytes hashed elsewhere, as if those
    /// bytes had been appended to this accumulator.
    pub fn combine(&mut self, other_crc: u32, other_len: u64) {
        self.drain();
        let other = Hasher::new_with_initial_len(other_crc, other_len);
        self.hasher.combine(&other);
    }

    pub fn value(&mut self) -> u32 {
        self.drain();
        self.hasher.clone().finalize()
    }

    /// Drains `reader` and returns the CRC32 of everything it produced.
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<u32, ArchiveError> {
        let mut accumulator = Crc32Accumulator::new();
        let mut buf = vec![0; CRC_BUFFER_SIZE];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            accumulator.update(&buf[..read]);
        }
        Ok(accumulator.value())
    }

    fn drain(&mut self) {
        if !self.pending.is_empty() {
            self.hasher.update(&self.pending);
            self.pending.clear();
        }
    }
}

/// Coalesces writes below `capacity` into one contiguous chunk before a
/// caller-supplied emit step runs; larger writes bypass the buffer entirely.
#[derive(Debug)]
pub(crate) struct WriteBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl WriteBuffer {
    pub fn new(capacity: usize) -> WriteBuffer {
        WriteBuffer {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push<F>(&mut self, bytes: &[u8], mut emit: F) -> Result<(), ArchiveError>
    where
        F: FnMut(&[u8]) -> Result<(), ArchiveError>,
    {
        if bytes.len() >= self.capacity {
            self.flush(&mut emit)?;
            return emit(bytes);
        }
        if self.buf.len() + bytes.len() > self.capacity {
            self.flush(&mut emit)?;
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn flush<F>(&mut self, emit: &mut F) -> Result<(), ArchiveError>
    where
        F: FnMut(&[u8]) -> Result<(), ArchiveError>,
    {
        if !self.buf.is_empty() {
            emit(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}
