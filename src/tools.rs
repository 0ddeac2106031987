//! Archive size pre-calculation, useful to set a `Content-Length` header
//! before the first payload byte exists.

use std::io::Sink;

use crate::error::ArchiveError;
use crate::streamer::{ArchiveOptions, EntryOptions, Streamer};
use crate::types::FileDateTime;

/// Predicts the exact byte size of an archive from entry names and sizes
/// alone, by running the regular [`Streamer`] against a discarding sink and
/// skipping over the payloads instead of materializing them.
///
/// The declared sizes must match what the real run will produce; for
/// deflated entries that means knowing the compressed size up front.
pub struct SizeEstimator {
    streamer: Streamer<Sink>,
}

impl SizeEstimator {
    pub fn new() -> SizeEstimator {
        // A fixed mtime keeps the estimate independent of the clock; the
        // records are the same size either way.
        let options = ArchiveOptions::default().default_mtime(FileDateTime::Zero);
        SizeEstimator {
            streamer: Streamer::with_options(std::io::sink(), options),
        }
    }

    pub fn with_options(options: ArchiveOptions) -> SizeEstimator {
        SizeEstimator {
            streamer: Streamer::with_options(std::io::sink(), options),
        }
    }

    /// Accounts for a stored entry of `size` bytes.
    pub fn add_stored_entry(
        &mut self,
        file_name: &str,
        size: u64,
        use_data_descriptor: bool,
    ) -> Result<&mut Self, ArchiveError> {
        let options = EntryOptions::default().use_data_descriptor(use_data_descriptor);
        self.streamer
            .add_stored_entry(file_name, size, 0, &options)?;
        self.streamer.simulate_write(size);
        if use_data_descriptor {
            self.streamer
                .update_last_entry_and_write_data_descriptor(0, size, size)?;
        }
        Ok(self)
    }

    /// Accounts for a deflated entry with a known compressed size.
    pub fn add_deflated_entry(
        &mut self,
        file_name: &str,
        compressed_size: u64,
        uncompressed_size: u64,
        use_data_descriptor: bool,
    ) -> Result<&mut Self, ArchiveError> {
        let options = EntryOptions::default().use_data_descriptor(use_data_descriptor);
        self.streamer.add_deflated_entry(
            file_name,
            compressed_size,
            uncompressed_size,
            0,
            &options,
        )?;
        self.streamer.simulate_write(compressed_size);
        if use_data_descriptor {
            self.streamer.update_last_entry_and_write_data_descriptor(
                0,
                compressed_size,
                uncompressed_size,
            )?;
        }
        Ok(self)
    }

    pub fn add_empty_directory(&mut self, dir_name: &str) -> Result<&mut Self, ArchiveError> {
        self.streamer
            .add_empty_directory(dir_name, &EntryOptions::default())?;
        Ok(self)
    }

    /// Total size of the archive described so far, central directory and
    /// end records included.
    pub fn size(self) -> Result<u64, ArchiveError> {
        let (size, _) = self.streamer.close()?;
        Ok(size)
    }
}

impl Default for SizeEstimator {
    fn default() -> Self {
        SizeEstimator::new()
    }
}

/// One-shot convenience over [`SizeEstimator`].
///
/// ```
/// use zipflow::estimate_archive_size;
///
/// let size = estimate_archive_size(|estimator| {
///     estimator.add_stored_entry("file1.txt", 6, false)?;
///     estimator.add_stored_entry("file2.txt", 6, false)?;
///     Ok(())
/// })
/// .unwrap();
/// assert!(size > 12);
/// ```
pub fn estimate_archive_size<F>(describe: F) -> Result<u64, ArchiveError>
where
    F: FnOnce(&mut SizeEstimator) -> Result<(), ArchiveError>,
{
    let mut estimator = SizeEstimator::new();
    describe(&mut estimator)?;
    estimator.size()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::streamer::{ArchiveOptions, EntryOptions, Streamer};
    use crate::types::FileDateTime;

    #[test]
    fn estimate_matches_an_actual_run() {
        let estimate = {
            let mut estimator = SizeEstimator::new();
            estimator
                .add_stored_entry("war-and-peace.txt", 1_000, false)
                .unwrap()
                .add_deflated_entry("compressed.bin", 400, 900, true)
                .unwrap()
                .add_empty_directory("assets")
                .unwrap();
            estimator.size().unwrap()
        };

        let options = ArchiveOptions::default().default_mtime(FileDateTime::Zero);
        let mut streamer = Streamer::with_options(Vec::new(), options);
        streamer
            .add_stored_entry("war-and-peace.txt", 1_000, 0xABCD, &EntryOptions::default())
            .unwrap();
        streamer.append(&vec![0u8; 1_000]).unwrap();
        streamer
            .add_deflated_entry(
                "compressed.bin",
                400,
                900,
                0x1234,
                &EntryOptions::default().use_data_descriptor(true),
            )
            .unwrap();
        streamer.append(&vec![0u8; 400]).unwrap();
        streamer
            .update_last_entry_and_write_data_descriptor(0x1234, 400, 900)
            .unwrap();
        streamer
            .add_empty_directory("assets", &EntryOptions::default())
            .unwrap();
        let (actual, _) = streamer.close().unwrap();

        assert_eq!(estimate, actual);
    }

    #[test]
    fn estimate_accounts_for_zip64_spillover() {
        let small = estimate_archive_size(|estimator| {
            estimator.add_stored_entry("a.bin", 1_000, false)?;
            Ok(())
        })
        .unwrap();

        let huge = estimate_archive_size(|estimator| {
            estimator.add_stored_entry("a.bin", 5_000_000_000, false)?;
            Ok(())
        })
        .unwrap();

        // The headers alone differ: Zip64 extras plus the Zip64 end records.
        let payload_difference = 5_000_000_000 - 1_000;
        assert!(huge - small > payload_difference);
    }
}
