//! Stateless builders for every record the archive format is made of. Each
//! function renders one record from explicit field values into an
//! [`ArchiveDescriptor`], ready for a single append to the sink.

use crate::constants::{
    CENTRAL_DIRECTORY_END_SIGNATURE, CENTRAL_DIRECTORY_ENTRY_BASE_SIZE,
    CENTRAL_DIRECTORY_ENTRY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE,
    END_OF_CENTRAL_DIRECTORY_SIZE, FOUR_BYTE_MAX, LOCAL_FILE_HEADER_BASE_SIZE,
    LOCAL_FILE_HEADER_SIGNATURE, TWO_BYTE_MAX, VERSION_MADE_BY, VERSION_NEEDED_TO_EXTRACT,
    VERSION_NEEDED_TO_EXTRACT_ZIP64, X0001_ZIP64, X5455_EXTENDED_TIMESTAMP,
    ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE, ZIP64_CENTRAL_EXTRA_PAYLOAD_SIZE,
    ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE,
    ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE, ZIP64_LOCAL_EXTRA_PAYLOAD_SIZE,
};
use crate::descriptor::ArchiveDescriptor;
use crate::types::ArchiveEntry;

/// Renders the local file header for `entry`, extra fields included.
///
/// When a data descriptor is in use, the CRC and size slots are zero; the
/// real values follow the payload. The Zip64 field appears only when the
/// declared sizes themselves overflow, and is placed before the timestamp
/// extra so that Windows Explorer keeps accepting the archive.
pub fn build_local_file_header(entry: &ArchiveEntry) -> ArchiveDescriptor {
    let zip64 = entry.header_requires_zip64();
    let (compressed, uncompressed) = entry.declared_header_sizes();
    let version_needed = if zip64 {
        VERSION_NEEDED_TO_EXTRACT_ZIP64
    } else {
        VERSION_NEEDED_TO_EXTRACT
    };

    let extra = local_extra_fields(entry);
    let mut header = ArchiveDescriptor::new(
        LOCAL_FILE_HEADER_BASE_SIZE + entry.file_name_as_bytes.len() as u64 + extra.len() as u64,
    );
    header.write_u32(LOCAL_FILE_HEADER_SIGNATURE);
    header.write_u16(version_needed);
    header.write_u16(entry.general_purpose_flags);
    header.write_u16(entry.storage_mode.code());
    header.write_u16(entry.last_mod_file_time);
    header.write_u16(entry.last_mod_file_date);
    header.write_u32(if entry.use_data_descriptor { 0 } else { entry.crc32 });
    header.write_u32(saturated_u32(compressed, zip64));
    header.write_u32(saturated_u32(uncompressed, zip64));
    header.write_u16(entry.file_name_as_bytes.len() as u16);
    header.write_u16(extra.len() as u16);
    header.write_bytes(&entry.file_name_as_bytes);
    header.write_bytes(extra.buffer());
    header
}

/// Renders the data descriptor that trails a payload written with unknown
/// sizes. The size slots widen to eight bytes when the actual values demand
/// it, regardless of how the local header was tagged.
pub fn build_data_descriptor(
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
) -> ArchiveDescriptor {
    let wide = compressed_size > FOUR_BYTE_MAX || uncompressed_size > FOUR_BYTE_MAX;
    let mut descriptor = ArchiveDescriptor::new(if wide { 24 } else { 16 });
    descriptor.write_u32(DATA_DESCRIPTOR_SIGNATURE);
    descriptor.write_u32(crc32);
    if wide {
        descriptor.write_u64(compressed_size);
        descriptor.write_u64(uncompressed_size);
    } else {
        descriptor.write_u32(compressed_size as u32);
        descriptor.write_u32(uncompressed_size as u32);
    }
    descriptor
}

/// Renders one central directory entry.
///
/// When any of the sizes or the header offset overflow, all three four-byte
/// slots are saturated and the full 28-byte Zip64 field carries the real
/// values; the disk number is saturated alongside so that readers find the
/// trailing four-byte disk field where they expect it.
pub fn build_central_directory_entry(entry: &ArchiveEntry) -> ArchiveDescriptor {
    let zip64 = entry.requires_zip64();
    let version_needed = if zip64 {
        VERSION_NEEDED_TO_EXTRACT_ZIP64
    } else {
        VERSION_NEEDED_TO_EXTRACT
    };
    let comment_len = entry.file_comment.as_ref().map_or(0, |c| c.len());

    let extra = central_extra_fields(entry);
    let mut cde = ArchiveDescriptor::new(
        CENTRAL_DIRECTORY_ENTRY_BASE_SIZE
            + entry.file_name_as_bytes.len() as u64
            + extra.len() as u64
            + comment_len as u64,
    );
    cde.write_u32(CENTRAL_DIRECTORY_ENTRY_SIGNATURE);
    cde.write_u16(VERSION_MADE_BY);
    cde.write_u16(version_needed);
    cde.write_u16(entry.general_purpose_flags);
    cde.write_u16(entry.storage_mode.code());
    cde.write_u16(entry.last_mod_file_time);
    cde.write_u16(entry.last_mod_file_date);
    cde.write_u32(entry.crc32);
    cde.write_u32(saturated_u32(entry.compressed_size, zip64));
    cde.write_u32(saturated_u32(entry.uncompressed_size, zip64));
    cde.write_u16(entry.file_name_as_bytes.len() as u16);
    cde.write_u16(extra.len() as u16);
    cde.write_u16(comment_len as u16);
    cde.write_u16(if zip64 { 0xFFFF } else { 0 });
    cde.write_u16(entry.internal_file_attributes);
    cde.write_u32(entry.external_file_attributes);
    cde.write_u32(saturated_u32(entry.offset, zip64));
    cde.write_bytes(&entry.file_name_as_bytes);
    cde.write_bytes(extra.buffer());
    if let Some(comment) = &entry.file_comment {
        cde.write_bytes(comment);
    }
    cde
}

/// Renders the archive tail: the Zip64 end-of-central-directory record and
/// its locator when any count or offset overflows, then the classical record
/// with the trailing comment.
pub fn build_end_of_central_directory(
    num_entries: u64,
    central_directory_offset: u64,
    central_directory_size: u64,
    comment: &[u8],
) -> ArchiveDescriptor {
    let zip64 = central_directory_size > FOUR_BYTE_MAX
        || central_directory_offset > FOUR_BYTE_MAX
        || central_directory_offset + central_directory_size > FOUR_BYTE_MAX
        || num_entries > TWO_BYTE_MAX;

    let mut tail = ArchiveDescriptor::new(
        ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE
            + ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE
            + END_OF_CENTRAL_DIRECTORY_SIZE
            + comment.len() as u64,
    );

    if zip64 {
        let zip64_eocd_offset = central_directory_offset + central_directory_size;

        tail.write_u32(ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE);
        tail.write_u64(ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE - 12); // size of the record below this field
        tail.write_u16(VERSION_MADE_BY);
        tail.write_u16(VERSION_NEEDED_TO_EXTRACT_ZIP64);
        tail.write_u32(0); // number of this disk
        tail.write_u32(0); // disk with the start of the central directory
        tail.write_u64(num_entries);
        tail.write_u64(num_entries);
        tail.write_u64(central_directory_size);
        tail.write_u64(central_directory_offset);

        tail.write_u32(ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE);
        tail.write_u32(0); // disk with the Zip64 end of central directory
        tail.write_u64(zip64_eocd_offset);
        tail.write_u32(1); // total number of disks
    }

    tail.write_u32(CENTRAL_DIRECTORY_END_SIGNATURE);
    tail.write_u16(0);
    tail.write_u16(0);
    tail.write_u16(saturated_u16(num_entries, zip64));
    tail.write_u16(saturated_u16(num_entries, zip64));
    tail.write_u32(saturated_u32(central_directory_size, zip64));
    tail.write_u32(saturated_u32(central_directory_offset, zip64));
    tail.write_u16(comment.len() as u16);
    tail.write_bytes(comment);
    tail
}

/// Total byte length of the extra-field area in the local file header.
pub fn local_extra_fields_size(entry: &ArchiveEntry) -> u16 {
    let mut size = 0u16;
    if entry.header_requires_zip64() {
        size += 4 + ZIP64_LOCAL_EXTRA_PAYLOAD_SIZE;
    }
    if entry.unix_mtime.is_some() {
        size += 4 + 5;
    }
    size
}

fn local_extra_fields(entry: &ArchiveEntry) -> ArchiveDescriptor {
    let mut extra = ArchiveDescriptor::new(local_extra_fields_size(entry) as u64);
    if entry.header_requires_zip64() {
        let (compressed, uncompressed) = entry.declared_header_sizes();
        extra.write_u16(X0001_ZIP64);
        extra.write_u16(ZIP64_LOCAL_EXTRA_PAYLOAD_SIZE);
        extra.write_u64(uncompressed);
        extra.write_u64(compressed);
    }
    write_extended_timestamp(&mut extra, entry);
    extra
}

fn central_extra_fields(entry: &ArchiveEntry) -> ArchiveDescriptor {
    let mut extra = ArchiveDescriptor::new(64);
    if entry.requires_zip64() {
        extra.write_u16(X0001_ZIP64);
        extra.write_u16(ZIP64_CENTRAL_EXTRA_PAYLOAD_SIZE);
        extra.write_u64(entry.uncompressed_size);
        extra.write_u64(entry.compressed_size);
        extra.write_u64(entry.offset);
        extra.write_u32(0); // disk number start
    }
    write_extended_timestamp(&mut extra, entry);
    extra
}

fn write_extended_timestamp(extra: &mut ArchiveDescriptor, entry: &ArchiveEntry) {
    if let Some(mtime) = entry.unix_mtime {
        extra.write_u16(X5455_EXTENDED_TIMESTAMP);
        extra.write_u16(5);
        extra.write_u8(0b0000_0001); // only the modification time is present
        extra.write_i32(mtime);
    }
}

fn saturated_u32(value: u64, force: bool) -> u32 {
    if force || value > FOUR_BYTE_MAX {
        u32::MAX
    } else {
        value as u32
    }
}

fn saturated_u16(value: u64, force: bool) -> u16 {
    if force || value > TWO_BYTE_MAX {
        u16::MAX
    } else {
        value as u16
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{DateTimeCS, StorageMode};

    fn plain_entry(name: &str) -> ArchiveEntry {
        let mtime = DateTimeCS {
            year: 2016,
            month: 7,
            day: 17,
            hour: 13,
            minute: 48,
            second: 0,
        };
        ArchiveEntry::new(
            name.as_bytes().to_vec(),
            StorageMode::Stored,
            mtime,
            false,
            false,
        )
    }

    #[test]
    fn local_file_header_layout_for_a_small_entry() {
        let mut entry = plain_entry("file1.txt");
        entry.crc32 = 0x8F6B7A11;
        entry.compressed_size = 42;
        entry.uncompressed_size = 42;

        let header = build_local_file_header(&entry);
        let bytes = header.finish();

        assert_eq!(&bytes[0..4], &[0x50, 0x4B, 0x03, 0x04]);
        assert_eq!(&bytes[4..6], &[20, 0]); // version needed
        assert_eq!(&bytes[14..18], &0x8F6B7A11u32.to_le_bytes());
        assert_eq!(&bytes[18..22], &42u32.to_le_bytes());
        assert_eq!(&bytes[22..26], &42u32.to_le_bytes());
        assert_eq!(&bytes[26..28], &9u16.to_le_bytes()); // name length
        assert_eq!(&bytes[28..30], &9u16.to_le_bytes()); // extra: timestamp only
        assert_eq!(&bytes[30..39], b"file1.txt");
        // Extended timestamp: tag, payload size, flags, mtime.
        assert_eq!(&bytes[39..41], &0x5455u16.to_le_bytes());
        assert_eq!(&bytes[41..43], &5u16.to_le_bytes());
        assert_eq!(bytes[43], 1);
        assert_eq!(&bytes[44..48], &1468763280i32.to_le_bytes());
        assert_eq!(bytes.len(), 48);
    }

    #[test]
    fn oversize_entry_gets_the_zip64_header_field_first() {
        let mut entry = plain_entry("big.bin");
        entry.compressed_size = FOUR_BYTE_MAX + 2048;
        entry.uncompressed_size = FOUR_BYTE_MAX + 2048;

        let bytes = build_local_file_header(&entry).finish();

        assert_eq!(&bytes[4..6], &[45, 0]); // Zip64 version needed
        assert_eq!(&bytes[18..22], &u32::MAX.to_le_bytes());
        assert_eq!(&bytes[22..26], &u32::MAX.to_le_bytes());
        let extra = &bytes[30 + 7..];
        assert_eq!(&extra[0..2], &0x0001u16.to_le_bytes());
        assert_eq!(&extra[2..4], &16u16.to_le_bytes());
        assert_eq!(&extra[4..12], &(FOUR_BYTE_MAX + 2048).to_le_bytes());
        assert_eq!(&extra[12..20], &(FOUR_BYTE_MAX + 2048).to_le_bytes());
        // The timestamp field follows the Zip64 one.
        assert_eq!(&extra[20..22], &0x5455u16.to_le_bytes());
    }

    #[test]
    fn data_descriptor_entry_zeroes_the_header_slots() {
        let mut entry = ArchiveEntry::new(
            b"stream.bin".to_vec(),
            StorageMode::Deflated,
            DateTimeCS::default(),
            true,
            false,
        );
        entry.crc32 = 0xA2B2B431;
        entry.compressed_size = 19;
        entry.uncompressed_size = 17;

        let bytes = build_local_file_header(&entry).finish();
        assert_eq!(bytes[6] & (1 << 3), 1 << 3); // gp bit 3
        assert_eq!(&bytes[14..18], &[0; 4]);
        assert_eq!(&bytes[18..22], &[0; 4]);
        assert_eq!(&bytes[22..26], &[0; 4]);
    }

    #[test]
    fn data_descriptor_widens_only_for_actual_overflow() {
        let narrow = build_data_descriptor(0xA2B2B431, 19, 17).finish();
        assert_eq!(narrow.len(), 16);
        assert_eq!(&narrow[0..4], &[0x50, 0x4B, 0x07, 0x08]);
        assert_eq!(&narrow[8..12], &19u32.to_le_bytes());
        assert_eq!(&narrow[12..16], &17u32.to_le_bytes());

        let wide = build_data_descriptor(0, FOUR_BYTE_MAX + 1, FOUR_BYTE_MAX + 1).finish();
        assert_eq!(wide.len(), 24);
        assert_eq!(&wide[8..16], &(FOUR_BYTE_MAX + 1).to_le_bytes());
    }

    #[test]
    fn central_entry_saturates_all_slots_when_any_field_overflows() {
        let mut entry = plain_entry("late.bin");
        entry.crc32 = 7;
        entry.compressed_size = 100;
        entry.uncompressed_size = 100;
        entry.offset = FOUR_BYTE_MAX + 1;

        let bytes = build_central_directory_entry(&entry).finish();

        assert_eq!(&bytes[0..4], &[0x50, 0x4B, 0x01, 0x02]);
        assert_eq!(&bytes[4..6], &VERSION_MADE_BY.to_le_bytes());
        assert_eq!(&bytes[6..8], &[45, 0]);
        assert_eq!(&bytes[20..24], &u32::MAX.to_le_bytes()); // compressed
        assert_eq!(&bytes[24..28], &u32::MAX.to_le_bytes()); // uncompressed
        assert_eq!(&bytes[34..36], &u16::MAX.to_le_bytes()); // disk number
        assert_eq!(&bytes[42..46], &u32::MAX.to_le_bytes()); // header offset

        let extra = &bytes[46 + 8..];
        assert_eq!(&extra[0..2], &0x0001u16.to_le_bytes());
        assert_eq!(&extra[2..4], &28u16.to_le_bytes());
        assert_eq!(&extra[4..12], &100u64.to_le_bytes());
        assert_eq!(&extra[12..20], &100u64.to_le_bytes());
        assert_eq!(&extra[20..28], &(FOUR_BYTE_MAX + 1).to_le_bytes());
        assert_eq!(&extra[28..32], &0u32.to_le_bytes());
    }

    #[test]
    fn small_archive_tail_is_a_classical_record_only() {
        let bytes = build_end_of_central_directory(2, 1000, 160, b"produced here").finish();

        assert_eq!(&bytes[0..4], &[0x50, 0x4B, 0x05, 0x06]);
        assert_eq!(&bytes[8..10], &2u16.to_le_bytes());
        assert_eq!(&bytes[10..12], &2u16.to_le_bytes());
        assert_eq!(&bytes[12..16], &160u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &1000u32.to_le_bytes());
        assert_eq!(&bytes[20..22], &13u16.to_le_bytes());
        assert_eq!(&bytes[22..], b"produced here");
    }

    #[test]
    fn oversize_archive_tail_gains_the_zip64_records() {
        let offset = FOUR_BYTE_MAX + 4096;
        let bytes = build_end_of_central_directory(1, offset, 90, b"").finish();

        assert_eq!(&bytes[0..4], &[0x50, 0x4B, 0x06, 0x06]);
        assert_eq!(&bytes[4..12], &44u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &1u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &1u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &90u64.to_le_bytes());
        assert_eq!(&bytes[48..56], &offset.to_le_bytes());

        let locator = &bytes[56..76];
        assert_eq!(&locator[0..4], &[0x50, 0x4B, 0x06, 0x07]);
        assert_eq!(&locator[8..16], &(offset + 90).to_le_bytes());
        assert_eq!(&locator[16..20], &1u32.to_le_bytes());

        let eocd = &bytes[76..];
        assert_eq!(&eocd[0..4], &[0x50, 0x4B, 0x05, 0x06]);
        assert_eq!(&eocd[8..10], &u16::MAX.to_le_bytes());
        assert_eq!(&eocd[12..16], &u32::MAX.to_le_bytes());
        assert_eq!(&eocd[16..20], &u32::MAX.to_le_bytes());
    }

    #[test]
    fn entry_count_overflow_alone_triggers_zip64() {
        let bytes = build_end_of_central_directory(0x1_0000, 500, 100, b"").finish();
        assert_eq!(&bytes[0..4], &[0x50, 0x4B, 0x06, 0x06]);
    }
}
