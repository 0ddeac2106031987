use thiserror::Error;

/// The kind of path collision detected while adding an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A directory was added over a path already occupied by a file.
    DirectoryClobbersFile,
    /// A file was added over a path already occupied by a directory.
    FileClobbersDirectory,
    /// The same file path was added twice.
    DuplicateFile,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConflictKind::DirectoryClobbersFile => "directory clobbers file",
            ConflictKind::FileClobbersDirectory => "file clobbers directory",
            ConflictKind::DuplicateFile => "duplicate file",
        };
        write!(f, "{}", label)
    }
}

/// Errors surfaced while producing an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("write to the output sink failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown storage mode {0}")]
    UnknownStorageMode(u16),

    #[error("file name is {0} bytes long, the format allows at most 65535")]
    FileNameTooLong(usize),

    #[error("invalid entry path {0:?}")]
    InvalidPath(String),

    #[error("path conflict at {path:?}: {kind}")]
    Conflict { path: String, kind: ConflictKind },

    #[error("output offset out of sync: expected {expected}, sink reports {actual}")]
    OffsetOutOfSync { expected: u64, actual: u64 },

    #[error("entry body size mismatch: declared {declared} bytes, {written} written")]
    EntryBodySizeMismatch { declared: u64, written: u64 },

    #[error("the last entry still awaits its data descriptor")]
    DataDescriptorPending,

    #[error("no open data-descriptor entry to update")]
    NoOpenEntry,
}

/// Errors surfaced while parsing an archive.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("read failed at offset {offset}")]
    Read {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid structure at offset {offset}: {reason}")]
    InvalidStructure { offset: u64, reason: &'static str },

    #[error("unsupported archive feature: {0}")]
    UnsupportedFeature(&'static str),

    #[error("no end-of-central-directory record found")]
    MissingEndOfCentralDirectory,

    #[error("compressed data offset not resolved yet, read the local header first")]
    LocalHeaderPending,
}

impl ParseError {
    pub(crate) fn read_at(offset: u64, source: std::io::Error) -> Self {
        ParseError::Read { offset, source }
    }

    pub(crate) fn truncated(offset: u64) -> Self {
        ParseError::Read {
            offset,
            source: std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "record truncated",
            ),
        }
    }
}
