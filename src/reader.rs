//! Reverse-direction parser: locates the end-of-central-directory record
//! near the tail, follows the Zip64 locator when present, and decodes the
//! central directory into entry descriptors. A forward scan over local file
//! headers is available as a salvage path for archives that lost their tail.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;

use crate::constants::{
    CENTRAL_DIRECTORY_END_SIGNATURE, CENTRAL_DIRECTORY_ENTRY_SIGNATURE,
    END_OF_CENTRAL_DIRECTORY_SIZE, FOUR_BYTE_MAX, GP_FLAG_DATA_DESCRIPTOR,
    LOCAL_FILE_HEADER_SIGNATURE, TWO_BYTE_MAX, X0001_ZIP64, X5455_EXTENDED_TIMESTAMP,
    ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE, ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE,
    ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE,
};
use crate::descriptor::ArchiveDescriptorReader;
use crate::error::ParseError;
use crate::types::{ArchiveEntry, DateTimeCS, StorageMode};

/// General purpose flag bit 0: the entry payload is encrypted.
const GP_FLAG_ENCRYPTED: u16 = 1;

/// A parsed archive: its central directory entries and the trailing comment.
#[derive(Debug)]
pub struct ArchiveReader {
    pub entries: Vec<ArchiveEntry>,
    pub comment: Vec<u8>,
}

impl ArchiveReader {
    /// Parses a complete archive from its tail.
    ///
    /// Scans the last 65557 bytes for the end-of-central-directory record,
    /// accepting the candidate whose comment length matches the bytes that
    /// follow it, then follows the Zip64 locator when one precedes the
    /// record. The central directory is read en bloc up to the end of the
    /// file, since some producers mis-report its size by a few bytes.
    ///
    /// With `resolve_local_headers`, each entry's local file header is
    /// visited afterwards to pin down the exact payload offset; without it,
    /// `compressed_data_offset` stays pending.
    pub fn read_zip_structure<R: Read + Seek>(
        io: &mut R,
        resolve_local_headers: bool,
    ) -> Result<ArchiveReader, ParseError> {
        let file_size = io
            .seek(SeekFrom::End(0))
            .map_err(|e| ParseError::read_at(0, e))?;
        if file_size < END_OF_CENTRAL_DIRECTORY_SIZE {
            return Err(ParseError::MissingEndOfCentralDirectory);
        }

        let tail_len = file_size.min(END_OF_CENTRAL_DIRECTORY_SIZE + TWO_BYTE_MAX);
        let tail_start = file_size - tail_len;
        let mut tail = vec![0u8; tail_len as usize];
        seek_to(io, tail_start)?;
        io.read_exact(&mut tail)
            .map_err(|e| ParseError::read_at(tail_start, e))?;

        let eocd_index = find_end_of_central_directory(&tail)
            .ok_or(ParseError::MissingEndOfCentralDirectory)?;
        let eocd_offset = tail_start + eocd_index as u64;

        let mut eocd = ArchiveDescriptorReader::new(&tail[eocd_index..], eocd_offset);
        eocd.skip(4)?; // signature, validated by the scan
        let disk_number = eocd.read_u16()? as u64;
        let central_directory_disk = eocd.read_u16()? as u64;
        let entries_on_this_disk = eocd.read_u16()? as u64;
        let num_entries_classical = eocd.read_u16()? as u64;
        let central_directory_size_classical = eocd.read_u32()? as u64;
        let central_directory_offset_classical = eocd.read_u32()? as u64;
        let comment_len = eocd.read_u16()? as usize;
        let comment = eocd.read_bytes(comment_len)?;

        // Saturated disk fields point at the Zip64 record; any other nonzero
        // value means a split archive.
        if (disk_number != 0 && disk_number != TWO_BYTE_MAX)
            || (central_directory_disk != 0 && central_directory_disk != TWO_BYTE_MAX)
            || (entries_on_this_disk != num_entries_classical
                && entries_on_this_disk != TWO_BYTE_MAX)
        {
            return Err(ParseError::UnsupportedFeature("multi-disk archive"));
        }

        let locator = read_zip64_locator(&tail, eocd_index, tail_start)?;
        let (num_entries, central_directory_offset, _central_directory_size) = match locator {
            Some(zip64_eocd_offset) => read_zip64_end_of_central_directory(io, zip64_eocd_offset)?,
            None => (
                num_entries_classical,
                central_directory_offset_classical,
                central_directory_size_classical,
            ),
        };

        seek_to(io, central_directory_offset)?;
        let mut central_directory = Vec::new();
        io.read_to_end(&mut central_directory)
            .map_err(|e| ParseError::read_at(central_directory_offset, e))?;

        let mut reader =
            ArchiveDescriptorReader::new(&central_directory, central_directory_offset);
        let mut entries = Vec::with_capacity(num_entries.min(1024) as usize);
        for _ in 0..num_entries {
            entries.push(read_central_directory_entry(&mut reader)?);
        }

        let mut archive = ArchiveReader { entries, comment };
        if resolve_local_headers {
            archive.resolve_compressed_data_offsets(io)?;
        }
        Ok(archive)
    }

    /// Visits every entry's local file header and records the absolute
    /// offset of its first payload byte.
    pub fn resolve_compressed_data_offsets<R: Read + Seek>(
        &mut self,
        io: &mut R,
    ) -> Result<(), ParseError> {
        for entry in &mut self.entries {
            seek_to(io, entry.offset)?;
            let signature = io
                .read_u32::<LittleEndian>()
                .map_err(|e| ParseError::read_at(entry.offset, e))?;
            if signature != LOCAL_FILE_HEADER_SIGNATURE {
                return Err(ParseError::InvalidStructure {
                    offset: entry.offset,
                    reason: "expected a local file header signature",
                });
            }
            // The header's own name and extra lengths are authoritative,
            // central directory extras routinely differ from the local ones.
            seek_to(io, entry.offset + 26)?;
            let name_len = io
                .read_u16::<LittleEndian>()
                .map_err(|e| ParseError::read_at(entry.offset + 26, e))? as u64;
            let extra_len = io
                .read_u16::<LittleEndian>()
                .map_err(|e| ParseError::read_at(entry.offset + 28, e))? as u64;
            entry.compressed_data_offset = Some(entry.offset + 30 + name_len + extra_len);
        }
        Ok(())
    }

    /// Decodes entries front to back from local file headers alone, for
    /// archives whose central directory is missing or truncated.
    ///
    /// The scan stops at the first read failure or foreign signature and
    /// returns everything decoded up to that point. Entries that rely on a
    /// data descriptor are a hard error, since their payload end cannot be
    /// located without their central directory record.
    pub fn read_zip_straight_ahead<R: Read + Seek>(
        io: &mut R,
    ) -> Result<Vec<ArchiveEntry>, ParseError> {
        let mut entries = Vec::new();
        let mut position = 0u64;

        loop {
            if seek_to(io, position).is_err() {
                break;
            }
            let mut fixed = [0u8; 30];
            if io.read_exact(&mut fixed).is_err() {
                break;
            }
            let mut header = ArchiveDescriptorReader::new(&fixed, position);
            if header.read_u32()? != LOCAL_FILE_HEADER_SIGNATURE {
                break;
            }
            let _version_needed = header.read_u16()?;
            let general_purpose_flags = header.read_u16()?;
            if general_purpose_flags & GP_FLAG_ENCRYPTED != 0 {
                return Err(ParseError::UnsupportedFeature("encrypted entry"));
            }
            if general_purpose_flags & GP_FLAG_DATA_DESCRIPTOR != 0 {
                return Err(ParseError::UnsupportedFeature(
                    "data descriptor entry in a straight-ahead scan",
                ));
            }
            let storage_code = header.read_u16()?;
            let time = header.read_u16()?;
            let date = header.read_u16()?;
            let crc32 = header.read_u32()?;
            let compressed_size = header.read_u32()? as u64;
            let uncompressed_size = header.read_u32()? as u64;
            let name_len = header.read_u16()? as usize;
            let extra_len = header.read_u16()? as usize;

            let mut variable = vec![0u8; name_len + extra_len];
            if io.read_exact(&mut variable).is_err() {
                break;
            }

            let storage_mode = match StorageMode::from_code(storage_code) {
                Ok(mode) => mode,
                Err(_) => {
                    return Err(ParseError::UnsupportedFeature(
                        "storage mode other than stored or deflated",
                    ))
                }
            };

            let mut entry = parsed_entry(
                variable[..name_len].to_vec(),
                storage_mode,
                general_purpose_flags,
            );
            entry.last_mod_file_time = time;
            entry.last_mod_file_date = date;
            entry.crc32 = crc32;
            entry.compressed_size = compressed_size;
            entry.uncompressed_size = uncompressed_size;
            entry.offset = position;

            read_extra_fields(
                &variable[name_len..],
                position + 30 + name_len as u64,
                &mut entry,
            )?;

            let data_offset = position + 30 + (name_len + extra_len) as u64;
            entry.compressed_data_offset = Some(data_offset);
            position = data_offset + entry.compressed_size;
            entries.push(entry);
        }

        Ok(entries)
    }
}

impl ArchiveEntry {
    /// Positions `io` at this entry's payload and returns a consuming
    /// reader over it. Requires the payload offset to have been resolved.
    pub fn extractor<R: Read + Seek>(&self, mut io: R) -> Result<EntryExtractor<R>, ParseError> {
        let offset = self
            .compressed_data_offset
            .ok_or(ParseError::LocalHeaderPending)?;
        io.seek(SeekFrom::Start(offset))
            .map_err(|e| ParseError::read_at(offset, e))?;
        let capped = io.take(self.compressed_size);
        Ok(match self.storage_mode {
            StorageMode::Stored => EntryExtractor::Stored {
                reader: capped,
                offset,
            },
            StorageMode::Deflated => EntryExtractor::Deflated {
                reader: DeflateDecoder::new(capped),
                offset,
            },
        })
    }
}

/// Streams one entry payload out of the archive: a length-capped passthrough
/// for stored entries, an inflater for deflated ones.
pub enum EntryExtractor<R: Read> {
    Stored {
        reader: std::io::Take<R>,
        offset: u64,
    },
    Deflated {
        reader: DeflateDecoder<std::io::Take<R>>,
        offset: u64,
    },
}

impl<R: Read> EntryExtractor<R> {
    /// Returns up to `max` decoded bytes, or `None` once the payload is
    /// exhausted.
    pub fn extract(&mut self, max: usize) -> Result<Option<Vec<u8>>, ParseError> {
        let mut buf = vec![0u8; max];
        let mut filled = 0usize;
        loop {
            let (result, offset) = match self {
                EntryExtractor::Stored { reader, offset } => (reader.read(&mut buf[filled..]), *offset),
                EntryExtractor::Deflated { reader, offset } => (reader.read(&mut buf[filled..]), *offset),
            };
            match result {
                Ok(0) => break,
                Ok(read) => {
                    filled += read;
                    if filled == max {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ParseError::read_at(offset, e)),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

/// Rightmost signature whose recorded comment length spans exactly the bytes
/// remaining after the fixed record. A shorter match would be signature bytes
/// that merely occur inside the archive comment.
fn find_end_of_central_directory(tail: &[u8]) -> Option<usize> {
    let signature = CENTRAL_DIRECTORY_END_SIGNATURE.to_le_bytes();
    let fixed = END_OF_CENTRAL_DIRECTORY_SIZE as usize;
    for i in (0..=tail.len() - fixed).rev() {
        if tail[i..i + 4] == signature {
            let comment_len =
                u16::from_le_bytes([tail[i + fixed - 2], tail[i + fixed - 1]]) as usize;
            if i + fixed + comment_len == tail.len() {
                return Some(i);
            }
        }
    }
    None
}

/// Probes the 20 bytes before the end-of-central-directory record for the
/// Zip64 locator and returns the Zip64 record's offset when present.
fn read_zip64_locator(
    tail: &[u8],
    eocd_index: usize,
    tail_start: u64,
) -> Result<Option<u64>, ParseError> {
    let locator_size = ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE as usize;
    if eocd_index < locator_size {
        return Ok(None);
    }
    let start = eocd_index - locator_size;
    let mut locator =
        ArchiveDescriptorReader::new(&tail[start..eocd_index], tail_start + start as u64);
    if locator.read_u32()? != ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE {
        return Ok(None);
    }
    let disk_with_zip64_eocd = locator.read_u32()?;
    let zip64_eocd_offset = locator.read_u64()?;
    let total_disks = locator.read_u32()?;
    if disk_with_zip64_eocd != 0 || total_disks > 1 {
        return Err(ParseError::UnsupportedFeature("multi-disk archive"));
    }
    Ok(Some(zip64_eocd_offset))
}

fn read_zip64_end_of_central_directory<R: Read + Seek>(
    io: &mut R,
    offset: u64,
) -> Result<(u64, u64, u64), ParseError> {
    seek_to(io, offset)?;
    let mut fixed = [0u8; ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE as usize];
    io.read_exact(&mut fixed)
        .map_err(|e| ParseError::read_at(offset, e))?;

    let mut record = ArchiveDescriptorReader::new(&fixed, offset);
    if record.read_u32()? != ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE {
        return Err(ParseError::InvalidStructure {
            offset,
            reason: "expected the zip64 end-of-central-directory signature",
        });
    }
    let _record_size = record.read_u64()?;
    let _version_made_by = record.read_u16()?;
    let _version_needed = record.read_u16()?;
    let disk_number = record.read_u32()?;
    let central_directory_disk = record.read_u32()?;
    let entries_on_this_disk = record.read_u64()?;
    let num_entries = record.read_u64()?;
    let central_directory_size = record.read_u64()?;
    let central_directory_offset = record.read_u64()?;

    if disk_number != 0 || central_directory_disk != 0 || entries_on_this_disk != num_entries {
        return Err(ParseError::UnsupportedFeature("multi-disk archive"));
    }
    Ok((num_entries, central_directory_offset, central_directory_size))
}

fn read_central_directory_entry(
    reader: &mut ArchiveDescriptorReader<'_>,
) -> Result<ArchiveEntry, ParseError> {
    let record_offset = reader.position();
    if reader.read_u32()? != CENTRAL_DIRECTORY_ENTRY_SIGNATURE {
        return Err(ParseError::InvalidStructure {
            offset: record_offset,
            reason: "expected a central directory entry signature",
        });
    }

    let version_made_by = reader.read_u16()?;
    let version_needed = reader.read_u16()?;
    let general_purpose_flags = reader.read_u16()?;
    if general_purpose_flags & GP_FLAG_ENCRYPTED != 0 {
        return Err(ParseError::UnsupportedFeature("encrypted entry"));
    }
    let storage_code = reader.read_u16()?;
    let time = reader.read_u16()?;
    let date = reader.read_u16()?;
    let crc32 = reader.read_u32()?;
    let compressed_size = reader.read_u32()? as u64;
    let uncompressed_size = reader.read_u32()? as u64;
    let name_len = reader.read_u16()? as usize;
    let extra_len = reader.read_u16()? as usize;
    let comment_len = reader.read_u16()? as usize;
    let file_disk_number = reader.read_u16()? as u32;
    let internal_file_attributes = reader.read_u16()?;
    let external_file_attributes = reader.read_u32()?;
    let offset = reader.read_u32()? as u64;
    let file_name_as_bytes = reader.read_bytes(name_len)?;
    let extra_offset = reader.position();
    let extra = reader.read_bytes(extra_len)?;
    let file_comment = if comment_len > 0 {
        Some(reader.read_bytes(comment_len)?)
    } else {
        None
    };

    let storage_mode = match StorageMode::from_code(storage_code) {
        Ok(mode) => mode,
        Err(_) => {
            return Err(ParseError::UnsupportedFeature(
                "storage mode other than stored or deflated",
            ))
        }
    };

    let mut entry = parsed_entry(file_name_as_bytes, storage_mode, general_purpose_flags);
    entry.version_made_by = version_made_by;
    entry.version_needed = version_needed;
    entry.last_mod_file_time = time;
    entry.last_mod_file_date = date;
    entry.crc32 = crc32;
    entry.compressed_size = compressed_size;
    entry.uncompressed_size = uncompressed_size;
    entry.offset = offset;
    entry.file_disk_number = file_disk_number;
    entry.internal_file_attributes = internal_file_attributes;
    entry.external_file_attributes = external_file_attributes;
    entry.file_comment = file_comment;

    read_extra_fields(&extra, extra_offset, &mut entry)?;
    Ok(entry)
}

/// Decodes the extra-field area.
///
/// The Zip64 field lists its values in a fixed order but only for the slots
/// that were saturated in the fixed header, so every value is read
/// conditionally. Fields with a declared size overrunning the area are
/// ignored rather than rejected; sloppy producers are common and the fixed
/// header already carries usable values.
fn read_extra_fields(
    extra: &[u8],
    base_offset: u64,
    entry: &mut ArchiveEntry,
) -> Result<(), ParseError> {
    let mut reader = ArchiveDescriptorReader::new(extra, base_offset);
    while reader.remaining() >= 4 {
        let header_id = reader.read_u16()?;
        let payload_size = reader.read_u16()? as usize;
        if payload_size > reader.remaining() {
            break;
        }
        let payload = reader.read_bytes(payload_size)?;
        match header_id {
            X0001_ZIP64 => {
                let mut field = ArchiveDescriptorReader::new(&payload, base_offset);
                if entry.uncompressed_size == FOUR_BYTE_MAX && field.remaining() >= 8 {
                    entry.uncompressed_size = field.read_u64()?;
                }
                if entry.compressed_size == FOUR_BYTE_MAX && field.remaining() >= 8 {
                    entry.compressed_size = field.read_u64()?;
                }
                if entry.offset == FOUR_BYTE_MAX && field.remaining() >= 8 {
                    entry.offset = field.read_u64()?;
                }
                if entry.file_disk_number == 0xFFFF && field.remaining() >= 4 {
                    entry.file_disk_number = field.read_u32()?;
                }
            }
            X5455_EXTENDED_TIMESTAMP => {
                let mut field = ArchiveDescriptorReader::new(&payload, base_offset);
                let flags = field.read_u8()?;
                if flags & 1 != 0 && field.remaining() >= 4 {
                    entry.unix_mtime = Some(field.read_i32()?);
                }
            }
            other => entry.unknown_extra_fields.push((other, payload)),
        }
    }
    Ok(())
}

fn parsed_entry(
    file_name_as_bytes: Vec<u8>,
    storage_mode: StorageMode,
    general_purpose_flags: u16,
) -> ArchiveEntry {
    let mut entry = ArchiveEntry::new(
        file_name_as_bytes,
        storage_mode,
        DateTimeCS::default(),
        false,
        false,
    );
    entry.general_purpose_flags = general_purpose_flags;
    entry.use_data_descriptor = general_purpose_flags & GP_FLAG_DATA_DESCRIPTOR != 0;
    entry.unix_mtime = None;
    entry
}

fn seek_to<R: Seek>(io: &mut R, offset: u64) -> Result<(), ParseError> {
    io.seek(SeekFrom::Start(offset))
        .map(|_| ())
        .map_err(|e| ParseError::read_at(offset, e))
}
