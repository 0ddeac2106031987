pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const CENTRAL_DIRECTORY_ENTRY_SIGNATURE: u32 = 0x02014b50;
pub const CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06054b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06064b50;
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE: u32 = 0x07064b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

pub const FOUR_BYTE_MAX: u64 = u32::MAX as u64;
pub const TWO_BYTE_MAX: u64 = u16::MAX as u64;

pub const LOCAL_FILE_HEADER_BASE_SIZE: u64 = 30;
pub const CENTRAL_DIRECTORY_ENTRY_BASE_SIZE: u64 = 46;
pub const END_OF_CENTRAL_DIRECTORY_SIZE: u64 = 22;
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE: u64 = 56;
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE: u64 = 20;

/// Payload size of the Zip64 extended-information field in a local file
/// header: uncompressed and compressed size only.
pub const ZIP64_LOCAL_EXTRA_PAYLOAD_SIZE: u16 = 16;
/// Payload size of the Zip64 extended-information field in a central
/// directory entry: both sizes, the local header offset and the disk number.
pub const ZIP64_CENTRAL_EXTRA_PAYLOAD_SIZE: u16 = 28;

pub const VERSION_NEEDED_TO_EXTRACT: u16 = 20;
pub const VERSION_NEEDED_TO_EXTRACT_ZIP64: u16 = 45;

pub const MADE_BY_VERSION: u8 = 52;
pub const OS_UNIX: u8 = 3;
pub const VERSION_MADE_BY: u16 = (OS_UNIX as u16) << 8 | MADE_BY_VERSION as u16;

/// General purpose flag bit 3: CRC and sizes follow the payload in a data
/// descriptor record.
pub const GP_FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag bit 11 (EFS): the filename bytes are UTF-8.
pub const GP_FLAG_UTF8_NAME: u16 = 1 << 11;

pub const X5455_EXTENDED_TIMESTAMP: u16 = 0x5455;
pub const X0001_ZIP64: u16 = 0x0001;

/// Regular file, `rw-r--r--`, in the upper half of the external attributes.
pub const FILE_EXTERNAL_ATTRIBUTES: u32 = 0o100644u32 << 16;
/// Directory, `rwxr-xr-x`.
pub const DIRECTORY_EXTERNAL_ATTRIBUTES: u32 = 0o040755u32 << 16;

pub const FILE_NAME_MAX_BYTES: usize = u16::MAX as usize;
pub const ZIP_COMMENT_MAX_BYTES: usize = u16::MAX as usize;
