//! Byte-level assertions over the records a streamed archive is made of.

mod common;

use common::{crc_of, find_signature, le_u16, le_u32};
use zipflow::constants::{
    CENTRAL_DIRECTORY_ENTRY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE,
    ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE,
};
use zipflow::{ArchiveOptions, DateTimeCS, EntryOptions, FileDateTime, Streamer};

const WAR_AND_PEACE_SIZE: u64 = 3_226_438;
const WAR_AND_PEACE_CRC: u32 = 0x8F6B7A11;

fn july_2016() -> FileDateTime {
    FileDateTime::Custom(DateTimeCS {
        year: 2016,
        month: 7,
        day: 17,
        hour: 13,
        minute: 48,
        second: 0,
    })
}

#[test]
fn single_stored_file_under_4_gib() {
    let mut streamer = Streamer::new(Vec::new());
    let options = EntryOptions::default().last_modified_time(july_2016());
    streamer
        .add_stored_entry(
            "war-and-peace.txt",
            WAR_AND_PEACE_SIZE,
            WAR_AND_PEACE_CRC,
            &options,
        )
        .unwrap();
    streamer.simulate_write(WAR_AND_PEACE_SIZE);
    let (size, bytes) = streamer.close().unwrap();

    // The payload itself was skipped over, everything else is in the buffer.
    assert_eq!(size, bytes.len() as u64 + WAR_AND_PEACE_SIZE);

    // Local file header: signature, version 20, no data descriptor flag.
    assert_eq!(&bytes[0..6], &[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00]);
    assert_eq!(le_u16(&bytes, 6) & (1 << 3), 0);
    assert_eq!(le_u32(&bytes, 14), WAR_AND_PEACE_CRC);
    assert_eq!(le_u32(&bytes, 18), WAR_AND_PEACE_SIZE as u32);
    assert_eq!(le_u32(&bytes, 22), WAR_AND_PEACE_SIZE as u32);
    assert_eq!(le_u16(&bytes, 26), 17); // filename length
    // Extra holds the extended timestamp only, no Zip64 field.
    assert_eq!(le_u16(&bytes, 28), 9);
    assert_eq!(le_u16(&bytes, 47), 0x5455);
    assert_eq!(le_u16(&bytes, 49), 5);
    assert_eq!(bytes[51], 1);
    assert_eq!(le_u32(&bytes, 52), 1468763280); // 2016-07-17T13:48:00Z

    // A single central directory entry follows right after the header in the
    // buffer (the archive offset differs by the simulated payload).
    let cd = 30 + 17 + 9;
    assert_eq!(le_u32(&bytes, cd), CENTRAL_DIRECTORY_ENTRY_SIGNATURE);
    assert_eq!(le_u32(&bytes, cd + 16), WAR_AND_PEACE_CRC);
    assert_eq!(le_u32(&bytes, cd + 20), WAR_AND_PEACE_SIZE as u32);
    assert_eq!(le_u32(&bytes, cd + 24), WAR_AND_PEACE_SIZE as u32);
    assert_eq!(le_u32(&bytes, cd + 42), 0); // local header offset

    // Classical end of central directory only.
    let eocd = cd + 46 + 17 + 9;
    assert_eq!(&bytes[eocd..eocd + 4], &[0x50, 0x4B, 0x05, 0x06]);
    assert_eq!(le_u16(&bytes, eocd + 10), 1);
    assert_eq!(le_u32(&bytes, eocd + 12), (46 + 17 + 9) as u32);
    assert_eq!(
        le_u32(&bytes, eocd + 16) as u64,
        cd as u64 + WAR_AND_PEACE_SIZE
    );
    assert!(find_signature(&bytes, ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE, cd).is_none());
    assert!(find_signature(&bytes, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE, cd).is_none());
}

#[test]
fn utf8_filename_sets_the_efs_bit_in_both_records() {
    let name = "второй-файл.bin";
    let mut streamer = Streamer::new(Vec::new());
    streamer
        .write_stored_file(name, &EntryOptions::default(), |sink| {
            sink.write_bytes(&[1, 2, 3]).map(|_| ())
        })
        .unwrap();
    let (_, bytes) = streamer.close().unwrap();

    assert_eq!(le_u16(&bytes, 6) & (1 << 11), 1 << 11);
    assert_eq!(&bytes[30..30 + name.len()], name.as_bytes());

    let cd = find_signature(&bytes, CENTRAL_DIRECTORY_ENTRY_SIGNATURE, 30).unwrap();
    assert_eq!(le_u16(&bytes, cd + 8) & (1 << 11), 1 << 11);
    assert_eq!(&bytes[cd + 46..cd + 46 + name.len()], name.as_bytes());
}

#[test]
fn deflated_file_through_a_data_descriptor() {
    let payload = b"Experimental data";
    let expected_crc = crc_of(payload);

    let options = ArchiveOptions::default().default_mtime(july_2016());
    let mut streamer = Streamer::with_options(Vec::new(), options);
    let (crc32, compressed_size, uncompressed_size) = streamer
        .write_deflated_file("experiment.bin", &EntryOptions::default(), |sink| {
            sink.write_bytes(payload).map(|_| ())
        })
        .unwrap();
    let (_, bytes) = streamer.close().unwrap();

    assert_eq!(crc32, expected_crc);
    assert_eq!(uncompressed_size, payload.len() as u64);

    // Header: deflate mode, bit 3 set, zeroed CRC and sizes.
    assert_eq!(le_u16(&bytes, 6) & (1 << 3), 1 << 3);
    assert_eq!(le_u16(&bytes, 8), 8);
    assert_eq!(le_u32(&bytes, 14), 0);
    assert_eq!(le_u32(&bytes, 18), 0);
    assert_eq!(le_u32(&bytes, 22), 0);

    // The data descriptor sits right behind the compressed payload.
    let header_size = 30 + "experiment.bin".len() + 9;
    let descriptor = header_size + compressed_size as usize;
    assert_eq!(le_u32(&bytes, descriptor), DATA_DESCRIPTOR_SIGNATURE);
    assert_eq!(le_u32(&bytes, descriptor + 4), expected_crc);
    assert_eq!(le_u32(&bytes, descriptor + 8), compressed_size as u32);
    assert_eq!(le_u32(&bytes, descriptor + 12), payload.len() as u32);

    // The central directory entry carries the final values.
    let cd = descriptor + 16;
    assert_eq!(le_u32(&bytes, cd), CENTRAL_DIRECTORY_ENTRY_SIGNATURE);
    assert_eq!(le_u32(&bytes, cd + 16), expected_crc);
    assert_eq!(le_u32(&bytes, cd + 20), compressed_size as u32);
    assert_eq!(le_u32(&bytes, cd + 24), payload.len() as u32);
}

#[test]
fn empty_directories_carry_directory_attributes() {
    let mut streamer = Streamer::new(Vec::new());
    streamer
        .add_empty_directory("assets", &EntryOptions::default())
        .unwrap();
    let (_, bytes) = streamer.close().unwrap();

    assert_eq!(&bytes[30..37], b"assets/");
    let cd = find_signature(&bytes, CENTRAL_DIRECTORY_ENTRY_SIGNATURE, 30).unwrap();
    // drwxr-xr-x in the upper half of the external attributes.
    assert_eq!(le_u32(&bytes, cd + 38), 0o040755u32 << 16);
    assert_eq!(le_u32(&bytes, cd + 20), 0);
    assert_eq!(le_u32(&bytes, cd + 24), 0);
}

#[test]
fn final_offset_matches_the_bytes_delivered() {
    let mut streamer = Streamer::new(Vec::new());
    streamer
        .write_stored_file("one.txt", &EntryOptions::default(), |sink| {
            sink.write_bytes(b"first").map(|_| ())
        })
        .unwrap();
    streamer
        .write_deflated_file("two.txt", &EntryOptions::default(), |sink| {
            sink.write_bytes(&b"second".repeat(1000)).map(|_| ())
        })
        .unwrap();
    let (size, bytes) = streamer.close().unwrap();
    assert_eq!(size, bytes.len() as u64);
}
