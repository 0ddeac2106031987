use std::io::Write;

use crate::checksum::{Crc32Accumulator, WriteBuffer};
use crate::constants::{FILE_NAME_MAX_BYTES, ZIP_COMMENT_MAX_BYTES};
use crate::deflate::DeflateFramer;
use crate::error::ArchiveError;
use crate::path_set::{uniquify_filename, PathSet};
use crate::records;
use crate::types::{ArchiveEntry, DateTimeCS, FileDateTime, StorageMode};
use crate::write_wrapper::WriteAndTell;

/// Archive-wide settings, resolved once when the [`Streamer`] is built.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub(crate) auto_rename_duplicates: bool,
    pub(crate) replace_backslashes: bool,
    pub(crate) write_buffer_size: usize,
    pub(crate) zip_comment: Vec<u8>,
    pub(crate) default_mtime: FileDateTime,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            auto_rename_duplicates: false,
            replace_backslashes: true,
            write_buffer_size: 8 * 1024,
            zip_comment: format!(
                "Written using {} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )
            .into_bytes(),
            default_mtime: FileDateTime::Now,
        }
    }
}

impl ArchiveOptions {
    /// Rename colliding file paths by appending `" (n)"` instead of failing.
    pub fn auto_rename_duplicates(mut self, auto_rename: bool) -> ArchiveOptions {
        self.auto_rename_duplicates = auto_rename;
        self
    }

    /// When disabled, filenames containing backslashes are rejected instead
    /// of having them replaced with `_`.
    pub fn replace_backslashes(mut self, replace: bool) -> ArchiveOptions {
        self.replace_backslashes = replace;
        self
    }

    /// Size of the per-entry coalescing buffer in front of the CRC and sink.
    pub fn write_buffer_size(mut self, size: usize) -> ArchiveOptions {
        self.write_buffer_size = size.max(1);
        self
    }

    /// The archive comment placed in the end-of-central-directory record,
    /// truncated to 65535 bytes.
    pub fn zip_comment(mut self, comment: &[u8]) -> ArchiveOptions {
        let len = comment.len().min(ZIP_COMMENT_MAX_BYTES);
        self.zip_comment = comment[..len].to_owned();
        self
    }

    /// Modification time used by entries that do not set their own.
    pub fn default_mtime(mut self, mtime: FileDateTime) -> ArchiveOptions {
        self.default_mtime = mtime;
        self
    }
}

/// Per-entry settings in the builder style of [`ArchiveOptions`].
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub(crate) last_modified_time: Option<FileDateTime>,
    pub(crate) use_data_descriptor: bool,
}

impl EntryOptions {
    pub fn last_modified_time(mut self, mtime: FileDateTime) -> EntryOptions {
        self.last_modified_time = Some(mtime);
        self
    }

    /// Emit the header with zeroed CRC and sizes, and the real values in a
    /// data descriptor after the payload.
    pub fn use_data_descriptor(mut self, use_data_descriptor: bool) -> EntryOptions {
        self.use_data_descriptor = use_data_descriptor;
        self
    }
}

#[derive(Debug)]
struct PendingEntry {
    index: usize,
    body_start: u64,
    use_data_descriptor: bool,
}

/// Drives a Zip archive onto an append-only sink.
///
/// Entries are sequenced strictly: local file header, payload, optional data
/// descriptor, then the next entry. No byte is ever patched after it has been
/// handed to the sink, so the output can go straight into a socket or an HTTP
/// response body. `close` emits the central directory and consumes the
/// streamer, returning the final archive size together with the sink.
pub struct Streamer<W: Write> {
    out: WriteAndTell<W>,
    entries: Vec<ArchiveEntry>,
    path_set: PathSet,
    options: ArchiveOptions,
    default_mtime: DateTimeCS,
    pending: Option<PendingEntry>,
    expected_position: u64,
}

impl<W: Write> Streamer<W> {
    pub fn new(sink: W) -> Streamer<W> {
        Streamer::with_options(sink, ArchiveOptions::default())
    }

    pub fn with_options(sink: W, options: ArchiveOptions) -> Streamer<W> {
        let default_mtime = options.default_mtime.resolve();
        Streamer {
            out: WriteAndTell::new(sink),
            entries: Vec::new(),
            path_set: PathSet::new(),
            options,
            default_mtime,
            pending: None,
            expected_position: 0,
        }
    }

    /// Current absolute output offset.
    pub fn tell(&self) -> u64 {
        self.out.tell()
    }

    /// Declares a stored entry whose payload the caller will append
    /// verbatim. Returns the output offset after the local file header.
    pub fn add_stored_entry(
        &mut self,
        file_name: &str,
        size: u64,
        crc32: u32,
        options: &EntryOptions,
    ) -> Result<u64, ArchiveError> {
        self.begin_entry(
            file_name,
            StorageMode::Stored,
            size,
            size,
            crc32,
            options,
            false,
        )
    }

    /// Declares a deflated entry whose pre-compressed payload the caller
    /// will append. Returns the output offset after the local file header.
    #[allow(clippy::too_many_arguments)]
    pub fn add_deflated_entry(
        &mut self,
        file_name: &str,
        compressed_size: u64,
        uncompressed_size: u64,
        crc32: u32,
        options: &EntryOptions,
    ) -> Result<u64, ArchiveError> {
        self.begin_entry(
            file_name,
            StorageMode::Deflated,
            compressed_size,
            uncompressed_size,
            crc32,
            options,
            false,
        )
    }

    /// Adds a directory entry with no payload. The name gains a trailing `/`
    /// if it does not carry one already.
    pub fn add_empty_directory(
        &mut self,
        dir_name: &str,
        options: &EntryOptions,
    ) -> Result<u64, ArchiveError> {
        self.begin_entry(dir_name, StorageMode::Stored, 0, 0, 0, options, true)
    }

    /// Forwards raw payload bytes to the sink. For deflated entries the
    /// bytes must already be a raw DEFLATE stream.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), ArchiveError> {
        self.append_record(bytes)
    }

    /// Advances the output offset by `n` bytes that reached the transport
    /// without going through this streamer, e.g. via `sendfile`.
    pub fn simulate_write(&mut self, n: u64) {
        self.out.advance_position(n);
        self.expected_position += n;
    }

    /// Opens a stored entry and runs `block` with its writing sink; the sink
    /// is closed afterwards and the data descriptor emitted. Returns the
    /// final `(crc32, compressed size, uncompressed size)`.
    pub fn write_stored_file<F>(
        &mut self,
        file_name: &str,
        options: &EntryOptions,
        block: F,
    ) -> Result<(u32, u64, u64), ArchiveError>
    where
        F: FnOnce(&mut StoredSink<'_, W>) -> Result<(), ArchiveError>,
    {
        let mut sink = self.stored_file_sink(file_name, options)?;
        block(&mut sink)?;
        sink.finish()
    }

    /// Opens a deflated entry and runs `block` with its compressing sink.
    pub fn write_deflated_file<F>(
        &mut self,
        file_name: &str,
        options: &EntryOptions,
        block: F,
    ) -> Result<(u32, u64, u64), ArchiveError>
    where
        F: FnOnce(&mut DeflatedSink<'_, W>) -> Result<(), ArchiveError>,
    {
        let mut sink = self.deflated_file_sink(file_name, options)?;
        block(&mut sink)?;
        sink.finish()
    }

    /// Deferred form of [`write_stored_file`](Self::write_stored_file): the
    /// caller holds the sink and must call `finish` on it.
    pub fn stored_file_sink(
        &mut self,
        file_name: &str,
        options: &EntryOptions,
    ) -> Result<StoredSink<'_, W>, ArchiveError> {
        let sized = options.clone().use_data_descriptor(true);
        self.begin_entry(file_name, StorageMode::Stored, 0, 0, 0, &sized, false)?;
        let buffer = WriteBuffer::new(self.options.write_buffer_size);
        Ok(StoredSink {
            streamer: self,
            buffer,
            crc: Crc32Accumulator::new(),
            bytes_seen: 0,
            result: None,
        })
    }

    /// Deferred form of [`write_deflated_file`](Self::write_deflated_file).
    pub fn deflated_file_sink(
        &mut self,
        file_name: &str,
        options: &EntryOptions,
    ) -> Result<DeflatedSink<'_, W>, ArchiveError> {
        let sized = options.clone().use_data_descriptor(true);
        self.begin_entry(file_name, StorageMode::Deflated, 0, 0, 0, &sized, false)?;
        let buffer = WriteBuffer::new(self.options.write_buffer_size);
        Ok(DeflatedSink {
            streamer: self,
            buffer,
            crc: Crc32Accumulator::new(),
            framer: DeflateFramer::new(),
            scratch: Vec::new(),
            uncompressed: 0,
            compressed: 0,
            result: None,
        })
    }

    /// Fills in the final CRC and sizes of the last opened entry and emits
    /// its data descriptor. This is the explicit form used when the payload
    /// flowed to the transport outside of this streamer.
    pub fn update_last_entry_and_write_data_descriptor(
        &mut self,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Result<u64, ArchiveError> {
        let pending = self.pending.take().ok_or(ArchiveError::NoOpenEntry)?;
        if !pending.use_data_descriptor {
            self.pending = Some(pending);
            return Err(ArchiveError::NoOpenEntry);
        }

        let entry = &mut self.entries[pending.index];
        entry.crc32 = crc32;
        entry.compressed_size = compressed_size;
        entry.uncompressed_size = uncompressed_size;

        let descriptor = records::build_data_descriptor(crc32, compressed_size, uncompressed_size);
        self.append_record(descriptor.buffer())?;
        Ok(self.out.tell())
    }

    /// Emits the central directory and the end-of-central-directory records,
    /// consuming the streamer. Returns the total archive size and the sink.
    pub fn close(mut self) -> Result<(u64, W), ArchiveError> {
        self.finish_pending_entry()?;

        let start_of_central_directory = self.out.tell();
        if self.expected_position != start_of_central_directory {
            return Err(ArchiveError::OffsetOutOfSync {
                expected: self.expected_position,
                actual: start_of_central_directory,
            });
        }

        for entry in &self.entries {
            let cde = records::build_central_directory_entry(entry);
            self.out.append(cde.buffer())?;
        }
        let central_directory_size = self.out.tell() - start_of_central_directory;

        let tail = records::build_end_of_central_directory(
            self.entries.len() as u64,
            start_of_central_directory,
            central_directory_size,
            &self.options.zip_comment,
        );
        self.out.append(tail.buffer())?;

        self.entries.clear();
        self.path_set.clear();

        let archive_size = self.out.tell();
        Ok((archive_size, self.out.into_inner()))
    }

    #[allow(clippy::too_many_arguments)]
    fn begin_entry(
        &mut self,
        file_name: &str,
        storage_mode: StorageMode,
        compressed_size: u64,
        uncompressed_size: u64,
        crc32: u32,
        options: &EntryOptions,
        is_directory: bool,
    ) -> Result<u64, ArchiveError> {
        self.finish_pending_entry()?;

        let mut name = self.normalize_file_name(file_name)?;
        if is_directory && !name.ends_with('/') {
            name.push('/');
        }
        if self.options.auto_rename_duplicates && !is_directory {
            name = uniquify_filename(&name, &self.path_set);
            if name.len() > FILE_NAME_MAX_BYTES {
                return Err(ArchiveError::FileNameTooLong(name.len()));
            }
        }
        if is_directory {
            self.path_set.add_directory(&name)?;
        } else {
            self.path_set.add_file(&name)?;
        }

        let mtime = options
            .last_modified_time
            .map(|t| t.resolve())
            .unwrap_or(self.default_mtime);
        let use_data_descriptor = options.use_data_descriptor && !is_directory;

        let mut entry = ArchiveEntry::new(
            name.into_bytes(),
            storage_mode,
            mtime,
            use_data_descriptor,
            is_directory,
        );
        entry.crc32 = crc32;
        entry.compressed_size = compressed_size;
        entry.uncompressed_size = uncompressed_size;
        entry.offset = self.out.tell();

        let header = records::build_local_file_header(&entry);
        self.append_record(header.buffer())?;
        self.entries.push(entry);

        if !is_directory {
            self.pending = Some(PendingEntry {
                index: self.entries.len() - 1,
                body_start: self.out.tell(),
                use_data_descriptor,
            });
        }
        Ok(self.out.tell())
    }

    /// Checks the previous entry before the next record may be emitted. A
    /// predeclared entry must have received exactly its declared payload; a
    /// data-descriptor entry must have been closed through
    /// [`update_last_entry_and_write_data_descriptor`](Self::update_last_entry_and_write_data_descriptor).
    fn finish_pending_entry(&mut self) -> Result<(), ArchiveError> {
        if let Some(pending) = self.pending.take() {
            if pending.use_data_descriptor {
                return Err(ArchiveError::DataDescriptorPending);
            }
            let written = self.out.tell() - pending.body_start;
            let declared = self.entries[pending.index].compressed_size;
            if written != declared {
                return Err(ArchiveError::EntryBodySizeMismatch { declared, written });
            }
        }
        Ok(())
    }

    fn normalize_file_name(&self, raw: &str) -> Result<String, ArchiveError> {
        let name = if raw.contains('\\') {
            if !self.options.replace_backslashes {
                return Err(ArchiveError::InvalidPath(raw.to_owned()));
            }
            raw.replace('\\', "_")
        } else {
            raw.to_owned()
        };
        if name.len() > FILE_NAME_MAX_BYTES {
            return Err(ArchiveError::FileNameTooLong(name.len()));
        }
        Ok(name)
    }

    fn append_record(&mut self, bytes: &[u8]) -> Result<(), ArchiveError> {
        self.out.append(bytes)?;
        self.expected_position += bytes.len() as u64;
        Ok(())
    }
}

impl<W: Write> Write for Streamer<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.append(buf).map_err(archive_to_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn archive_to_io(error: ArchiveError) -> std::io::Error {
    match error {
        ArchiveError::Io(e) => e,
        other => std::io::Error::new(std::io::ErrorKind::Other, other),
    }
}

/// Sink for one stored entry: forwards bytes verbatim while accumulating the
/// CRC and the byte count for the trailing data descriptor.
pub struct StoredSink<'a, W: Write> {
    streamer: &'a mut Streamer<W>,
    buffer: WriteBuffer,
    crc: Crc32Accumulator,
    bytes_seen: u64,
    result: Option<(u32, u64, u64)>,
}

impl<W: Write> StoredSink<'_, W> {
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, ArchiveError> {
        if self.result.is_some() {
            return Err(ArchiveError::NoOpenEntry);
        }
        let crc = &mut self.crc;
        let streamer = &mut *self.streamer;
        self.buffer.push(bytes, |chunk| {
            crc.update(chunk);
            streamer.append_record(chunk)
        })?;
        self.bytes_seen += bytes.len() as u64;
        Ok(bytes.len())
    }

    /// Flushes pending bytes, patches the entry and writes its data
    /// descriptor. Safe to call more than once.
    pub fn finish(&mut self) -> Result<(u32, u64, u64), ArchiveError> {
        if let Some(result) = self.result {
            return Ok(result);
        }
        let crc = &mut self.crc;
        let streamer = &mut *self.streamer;
        self.buffer.flush(&mut |chunk: &[u8]| {
            crc.update(chunk);
            streamer.append_record(chunk)
        })?;

        let crc32 = self.crc.value();
        self.streamer
            .update_last_entry_and_write_data_descriptor(crc32, self.bytes_seen, self.bytes_seen)?;
        let result = (crc32, self.bytes_seen, self.bytes_seen);
        self.result = Some(result);
        Ok(result)
    }
}

impl<W: Write> Write for StoredSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf).map_err(archive_to_io)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sink for one deflated entry: compresses on the fly, hashing the plain
/// bytes and counting both sides of the compressor.
pub struct DeflatedSink<'a, W: Write> {
    streamer: &'a mut Streamer<W>,
    buffer: WriteBuffer,
    crc: Crc32Accumulator,
    framer: DeflateFramer,
    scratch: Vec<u8>,
    uncompressed: u64,
    compressed: u64,
    result: Option<(u32, u64, u64)>,
}

impl<W: Write> DeflatedSink<'_, W> {
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, ArchiveError> {
        if self.result.is_some() {
            return Err(ArchiveError::NoOpenEntry);
        }
        let crc = &mut self.crc;
        let framer = &mut self.framer;
        let scratch = &mut self.scratch;
        let uncompressed = &mut self.uncompressed;
        self.buffer.push(bytes, |chunk| {
            crc.update(chunk);
            *uncompressed += chunk.len() as u64;
            framer.write(chunk, scratch)
        })?;
        self.drain_compressed()?;
        Ok(bytes.len())
    }

    /// Flushes the buffer, terminates the DEFLATE stream, patches the entry
    /// and writes its data descriptor. Safe to call more than once.
    pub fn finish(&mut self) -> Result<(u32, u64, u64), ArchiveError> {
        if let Some(result) = self.result {
            return Ok(result);
        }
        let crc = &mut self.crc;
        let framer = &mut self.framer;
        let scratch = &mut self.scratch;
        let uncompressed = &mut self.uncompressed;
        self.buffer.flush(&mut |chunk: &[u8]| {
            crc.update(chunk);
            *uncompressed += chunk.len() as u64;
            framer.write(chunk, scratch)
        })?;
        self.framer.finish(&mut self.scratch)?;
        self.drain_compressed()?;

        let crc32 = self.crc.value();
        self.streamer.update_last_entry_and_write_data_descriptor(
            crc32,
            self.compressed,
            self.uncompressed,
        )?;
        let result = (crc32, self.compressed, self.uncompressed);
        self.result = Some(result);
        Ok(result)
    }

    fn drain_compressed(&mut self) -> Result<(), ArchiveError> {
        if !self.scratch.is_empty() {
            self.compressed += self.scratch.len() as u64;
            self.streamer.append_record(&self.scratch)?;
            self.scratch.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for DeflatedSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf).map_err(archive_to_io)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
