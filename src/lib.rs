//! Stream Zip archives to an append-only sink, and parse them back.
//!
//! ## Features
//!
//! - Single-pass, seek-free archive production: headers, payloads and data
//!   descriptors are emitted strictly in order, so the output can go straight
//!   into a socket or an HTTP response body.
//! - CRC32 and sizes are computed while streaming and sent after each
//!   payload, no buffering of whole entries.
//! - Transparent Zip64 spillover for entries or archives crossing the 4 GiB
//!   and 65535-entry boundaries.
//! - Archive size pre-calculation, useful to set a `Content-Length` header
//!   before streaming starts.
//! - A tail-first parser for complete archives and a straight-ahead salvage
//!   scan for truncated ones.
//!
//! ## Limitations
//!
//! - Storage modes `stored` and `deflated` only.
//! - No encryption and no multi-disk archives.
//!
//! ## Writing
//!
//! ```
//! use zipflow::{EntryOptions, Streamer};
//!
//! let mut streamer = Streamer::new(Vec::new());
//! streamer
//!     .write_deflated_file("hello.txt", &EntryOptions::default(), |sink| {
//!         sink.write_bytes(b"hello world").map(|_| ())
//!     })
//!     .unwrap();
//! let (size, bytes) = streamer.close().unwrap();
//! assert_eq!(size, bytes.len() as u64);
//! ```
//!
//! ## Reading
//!
//! ```no_run
//! use std::fs::File;
//! use zipflow::ArchiveReader;
//!
//! let mut file = File::open("archive.zip").unwrap();
//! let archive = ArchiveReader::read_zip_structure(&mut file, true).unwrap();
//! for entry in &archive.entries {
//!     println!("{}: {} bytes", entry.file_name(), entry.uncompressed_size);
//! }
//! ```

pub mod checksum;
pub mod constants;
pub mod deflate;
pub mod descriptor;
pub mod error;
pub mod path_set;
pub mod reader;
pub mod records;
pub mod streamer;
pub mod tools;
pub mod types;
pub mod write_wrapper;

pub use checksum::Crc32Accumulator;
pub use deflate::{deflate_chunk, DeflateFramer, DEFLATE_TERMINATOR};
pub use error::{ArchiveError, ConflictKind, ParseError};
pub use path_set::PathSet;
pub use reader::{ArchiveReader, EntryExtractor};
pub use streamer::{ArchiveOptions, DeflatedSink, EntryOptions, StoredSink, Streamer};
pub use tools::{estimate_archive_size, SizeEstimator};
pub use types::{ArchiveEntry, DateTimeCS, FileDateTime, StorageMode};
pub use write_wrapper::WriteAndTell;
