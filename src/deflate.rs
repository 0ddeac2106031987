use std::io::{Error as IoError, ErrorKind};

use flate2::{Compress, Compression, FlushCompress, Status};

use crate::error::ArchiveError;

/// An empty final DEFLATE block. Appending it after a run of sync-flushed
/// sub-blocks closes the stream.
pub const DEFLATE_TERMINATOR: [u8; 2] = [0x03, 0x00];

/// How many input bytes the streaming framer accepts between two sync flush
/// boundaries, bounding the compressor's pending state.
pub const DEFAULT_FLUSH_INTERVAL: usize = 5 * 1024 * 1024;

const OUT_CHUNK_RESERVE: usize = 32 * 1024;

/// Produces a raw DEFLATE bitstream, byte-aligned at configurable intervals,
/// for storage mode 8. The output carries no zlib header or trailer.
pub struct DeflateFramer {
    deflater: Compress,
    flush_interval: usize,
    since_flush: usize,
}

impl DeflateFramer {
    pub fn new() -> DeflateFramer {
        DeflateFramer::with_flush_interval(DEFAULT_FLUSH_INTERVAL)
    }

    pub fn with_flush_interval(flush_interval: usize) -> DeflateFramer {
        DeflateFramer {
            deflater: Compress::new(Compression::default(), false),
            flush_interval: flush_interval.max(1),
            since_flush: 0,
        }
    }

    /// Compresses `input`, appending the produced bytes to `out`. A
    /// SYNC_FLUSH boundary is inserted whenever the configured interval of
    /// input bytes has gone through since the previous one.
    pub fn write(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), ArchiveError> {
        self.pump(input, out, FlushCompress::None)?;
        self.since_flush += input.len();
        if self.since_flush >= self.flush_interval {
            self.pump(&[], out, FlushCompress::Sync)?;
            self.since_flush = 0;
        }
        Ok(())
    }

    /// Terminates the stream with the final block, appending it to `out`.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), ArchiveError> {
        self.pump(&[], out, FlushCompress::Finish)
    }

    fn pump(
        &mut self,
        mut input: &[u8],
        out: &mut Vec<u8>,
        flush: FlushCompress,
    ) -> Result<(), ArchiveError> {
        loop {
            if out.capacity() == out.len() {
                out.reserve(OUT_CHUNK_RESERVE);
            }
            let before_in = self.deflater.total_in();
            let before_out = out.len();
            let status = self
                .deflater
                .compress_vec(input, out, flush)
                .map_err(|e| IoError::new(ErrorKind::InvalidData, e))?;
            let consumed = (self.deflater.total_in() - before_in) as usize;
            input = &input[consumed..];

            match status {
                Status::StreamEnd => return Ok(()),
                Status::Ok | Status::BufError => {
                    // The compressor is done once all input went in and it
                    // stopped short of the available output space.
                    if input.is_empty()
                        && out.len() < out.capacity()
                        && !matches!(flush, FlushCompress::Finish)
                    {
                        return Ok(());
                    }
                    // A stalled call means the spare output space was too
                    // small to hold the next block.
                    if consumed == 0 && out.len() == before_out {
                        out.reserve(OUT_CHUNK_RESERVE);
                    }
                }
            }
        }
    }
}

impl Default for DeflateFramer {
    fn default() -> Self {
        DeflateFramer::new()
    }
}

/// Compresses `bytes` into one self-contained sub-block ending on a
/// SYNC_FLUSH boundary. Sub-blocks concatenate into a valid raw DEFLATE
/// stream once [`DEFLATE_TERMINATOR`] is appended after the last one.
pub fn deflate_chunk(bytes: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut framer = DeflateFramer::new();
    let mut out = Vec::with_capacity(bytes.len() / 2 + 64);
    framer.pump(bytes, &mut out, FlushCompress::Sync)?;
    Ok(out)
}
