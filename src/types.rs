use core::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::constants::{
    DIRECTORY_EXTERNAL_ATTRIBUTES, FILE_EXTERNAL_ATTRIBUTES, FOUR_BYTE_MAX,
    GP_FLAG_DATA_DESCRIPTOR, GP_FLAG_UTF8_NAME, LOCAL_FILE_HEADER_BASE_SIZE,
};
use crate::error::ArchiveError;

/// The two storage modes a streamed archive may use for an entry payload.
///
/// `Stored` forwards the payload verbatim, `Deflated` expects a raw DEFLATE
/// bitstream without a zlib wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Stored,
    Deflated,
}

impl StorageMode {
    pub fn code(self) -> u16 {
        match self {
            StorageMode::Stored => 0,
            StorageMode::Deflated => 8,
        }
    }

    pub fn from_code(code: u16) -> Result<StorageMode, ArchiveError> {
        match code {
            0 => Ok(StorageMode::Stored),
            8 => Ok(StorageMode::Deflated),
            other => Err(ArchiveError::UnknownStorageMode(other)),
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StorageMode::Stored => "stored",
            StorageMode::Deflated => "deflated",
        };
        write!(f, "{}", label)
    }
}

/// A calendar date and time with the two-second resolution of the MS-DOS
/// format used inside ZIP records.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DateTimeCS {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl Default for DateTimeCS {
    /// The MS-DOS epoch: 1980, January 1st, midnight.
    fn default() -> Self {
        Self {
            year: 1980,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }
}

impl DateTimeCS {
    pub fn from_chrono_datetime<Tz: TimeZone>(datetime: DateTime<Tz>) -> Self {
        Self {
            year: datetime.year() as u16,
            month: datetime.month() as u16,
            day: datetime.day() as u16,
            hour: datetime.hour() as u16,
            minute: datetime.minute() as u16,
            second: datetime.second() as u16,
        }
    }

    pub fn now() -> Self {
        Self::from_chrono_datetime(Utc::now())
    }

    pub fn from_timestamp(timestamp: i64) -> Self {
        match Utc.timestamp_opt(timestamp, 0) {
            chrono::LocalResult::Single(single) => Self::from_chrono_datetime(single),
            chrono::LocalResult::Ambiguous(first, _) => Self::from_chrono_datetime(first),
            chrono::LocalResult::None => Self::default(),
        }
    }

    pub fn from_msdos(datepart: u16, timepart: u16) -> Self {
        Self {
            year: ((datepart >> 9) & 0x7F) + 1980,
            month: (datepart >> 5) & 0x0F,
            day: datepart & 0x1F,
            hour: (timepart >> 11) & 0x1F,
            minute: (timepart >> 5) & 0x3F,
            second: (timepart & 0x1F) << 1,
        }
    }

    /// Renders the `(date, time)` pair of the DOS format. The year field is
    /// seven bits wide, so representable years are 1980 through 2107; values
    /// outside are clamped to the nearest representable one.
    pub fn ms_dos(&self) -> (u16, u16) {
        let year = self.year.clamp(1980, 2107) - 1980;
        let date = self.day | (self.month << 5) | (year << 9);
        let time = (self.second / 2) | (self.minute << 5) | (self.hour << 11);
        (date, time)
    }

    pub fn to_timestamp(&self) -> i64 {
        match Utc
            .with_ymd_and_hms(
                self.year as i32,
                self.month as u32,
                self.day as u32,
                self.hour as u32,
                self.minute as u32,
                self.second as u32,
            ) {
            chrono::LocalResult::Single(single) => single.timestamp(),
            chrono::LocalResult::Ambiguous(first, _) => first.timestamp(),
            chrono::LocalResult::None => 0,
        }
    }
}

impl fmt::Display for DateTimeCS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// The modification time written alongside an entry, both as DOS date/time
/// words and as the Unix timestamp of the extended-timestamp extra field.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum FileDateTime {
    /// The MS-DOS origin, 1980-01-01T00:00:00.
    Zero,
    /// An explicit calendar date and time.
    Custom(DateTimeCS),
    /// The current date and time.
    #[default]
    Now,
    /// Seconds since the Unix epoch.
    UnixCustom(i64),
}

impl FileDateTime {
    pub fn resolve(&self) -> DateTimeCS {
        match self {
            FileDateTime::Zero => DateTimeCS::default(),
            FileDateTime::Custom(date_time) => *date_time,
            FileDateTime::Now => DateTimeCS::now(),
            FileDateTime::UnixCustom(timestamp) => DateTimeCS::from_timestamp(*timestamp),
        }
    }
}

/// One archive member, as recorded by the producer and as decoded by the
/// parser. Sizes and the local header offset are kept as 64-bit values; the
/// encoder decides per record whether Zip64 spillover fields are needed.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub file_name_as_bytes: Vec<u8>,
    pub storage_mode: StorageMode,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub general_purpose_flags: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    /// Unix mtime carried by the `0x5455` extended-timestamp extra field.
    pub unix_mtime: Option<i32>,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Absolute offset of the local file header.
    pub offset: u64,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub file_disk_number: u32,
    pub file_comment: Option<Vec<u8>>,
    /// Extra fields the parser did not recognize, kept verbatim as
    /// `(header id, payload)` pairs.
    pub unknown_extra_fields: Vec<(u16, Vec<u8>)>,
    /// Absolute offset of the first payload byte. Pending (`None`) until the
    /// local file header has been visited.
    pub compressed_data_offset: Option<u64>,
    pub use_data_descriptor: bool,
}

impl ArchiveEntry {
    /// A fresh entry with derived flags and attributes; sizes, CRC and
    /// offset start at zero and are filled in as the entry is written.
    pub fn new(
        file_name_as_bytes: Vec<u8>,
        storage_mode: StorageMode,
        mtime: DateTimeCS,
        use_data_descriptor: bool,
        is_directory: bool,
    ) -> ArchiveEntry {
        let (date, time) = mtime.ms_dos();
        let mut general_purpose_flags = 0u16;
        if !file_name_as_bytes.is_ascii() {
            general_purpose_flags |= GP_FLAG_UTF8_NAME;
        }
        if use_data_descriptor {
            general_purpose_flags |= GP_FLAG_DATA_DESCRIPTOR;
        }
        let external_file_attributes = if is_directory {
            DIRECTORY_EXTERNAL_ATTRIBUTES
        } else {
            FILE_EXTERNAL_ATTRIBUTES
        };
        let unix_mtime = i32::try_from(mtime.to_timestamp()).ok();

        ArchiveEntry {
            file_name_as_bytes,
            storage_mode,
            version_made_by: crate::constants::VERSION_MADE_BY,
            version_needed: crate::constants::VERSION_NEEDED_TO_EXTRACT,
            general_purpose_flags,
            last_mod_file_time: time,
            last_mod_file_date: date,
            unix_mtime,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            offset: 0,
            internal_file_attributes: 0,
            external_file_attributes,
            file_disk_number: 0,
            file_comment: None,
            unknown_extra_fields: Vec::new(),
            compressed_data_offset: None,
            use_data_descriptor,
        }
    }

    /// The filename, decoded lossily for display purposes. The raw bytes stay
    /// authoritative in `file_name_as_bytes`.
    pub fn file_name(&self) -> String {
        String::from_utf8_lossy(&self.file_name_as_bytes).into_owned()
    }

    pub fn is_directory(&self) -> bool {
        self.file_name_as_bytes.last() == Some(&b'/')
    }

    pub fn has_utf8_name(&self) -> bool {
        self.general_purpose_flags & GP_FLAG_UTF8_NAME != 0
    }

    /// Whether the central directory entry needs the Zip64 extended
    /// information field: any of the sizes or the local header offset
    /// overflow their four-byte slot.
    pub fn requires_zip64(&self) -> bool {
        self.uncompressed_size > FOUR_BYTE_MAX
            || self.compressed_size > FOUR_BYTE_MAX
            || self.offset > FOUR_BYTE_MAX
    }

    /// Whether the local file header needs the Zip64 field. The header only
    /// knows its own declared sizes, never the archive offset.
    pub fn header_requires_zip64(&self) -> bool {
        let (compressed, uncompressed) = self.declared_header_sizes();
        compressed > FOUR_BYTE_MAX || uncompressed > FOUR_BYTE_MAX
    }

    /// Sizes as they appear in the local file header: zeroed when a data
    /// descriptor carries the real values after the payload.
    pub(crate) fn declared_header_sizes(&self) -> (u64, u64) {
        if self.use_data_descriptor {
            (0, 0)
        } else {
            (self.compressed_size, self.uncompressed_size)
        }
    }

    pub fn modification_time(&self) -> DateTimeCS {
        DateTimeCS::from_msdos(self.last_mod_file_date, self.last_mod_file_time)
    }

    /// Byte length of this entry's local file header, extra fields included.
    pub fn local_file_header_size(&self) -> u64 {
        LOCAL_FILE_HEADER_BASE_SIZE
            + self.file_name_as_bytes.len() as u64
            + crate::records::local_extra_fields_size(self) as u64
    }
}
