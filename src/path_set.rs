use std::collections::HashSet;

use crate::error::{ArchiveError, ConflictKind};

/// Tracks every file and directory path admitted into the archive so that
/// clobbering combinations are rejected before any bytes are emitted.
///
/// Adding `a/b/c.txt` implicitly claims `a` and `a/b` as directories, which
/// keeps the two sets disjoint and prevents a later `a` file entry.
#[derive(Debug, Default)]
pub struct PathSet {
    files: HashSet<String>,
    directories: HashSet<String>,
}

impl PathSet {
    pub fn new() -> PathSet {
        PathSet::default()
    }

    /// Registers a file path along with its chain of parent directories.
    pub fn add_file(&mut self, path: &str) -> Result<(), ArchiveError> {
        let segments = split_segments(path)?;
        self.add_parent_directories(&segments)?;

        let full = segments.join("/");
        if self.directories.contains(&full) {
            return Err(ArchiveError::Conflict {
                path: full,
                kind: ConflictKind::FileClobbersDirectory,
            });
        }
        if !self.files.insert(full.clone()) {
            return Err(ArchiveError::Conflict {
                path: full,
                kind: ConflictKind::DuplicateFile,
            });
        }
        Ok(())
    }

    /// Registers a directory path along with its ancestors.
    pub fn add_directory(&mut self, path: &str) -> Result<(), ArchiveError> {
        let segments = split_segments(path)?;
        self.add_parent_directories(&segments)?;

        let full = segments.join("/");
        if self.files.contains(&full) {
            return Err(ArchiveError::Conflict {
                path: full,
                kind: ConflictKind::DirectoryClobbersFile,
            });
        }
        self.directories.insert(full);
        Ok(())
    }

    /// Membership test across both sets. A trailing `/` is ignored, so the
    /// file and directory spelling of a path both match.
    pub fn contains(&self, path: &str) -> bool {
        match split_segments(path) {
            Ok(segments) => {
                let full = segments.join("/");
                self.files.contains(&full) || self.directories.contains(&full)
            }
            Err(_) => false,
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.directories.clear();
    }

    fn add_parent_directories(&mut self, segments: &[String]) -> Result<(), ArchiveError> {
        let mut prefix = String::new();
        for segment in &segments[..segments.len() - 1] {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if self.files.contains(&prefix) {
                return Err(ArchiveError::Conflict {
                    path: prefix,
                    kind: ConflictKind::DirectoryClobbersFile,
                });
            }
            self.directories.insert(prefix.clone());
        }
        Ok(())
    }
}

/// Splits on `/`, collapsing runs of separators. A trailing separator is
/// accepted as the directory marker; a leading one is not.
fn split_segments(path: &str) -> Result<Vec<String>, ArchiveError> {
    if path.starts_with('/') {
        return Err(ArchiveError::InvalidPath(path.to_owned()));
    }
    let segments: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect();
    if segments.is_empty() {
        return Err(ArchiveError::InvalidPath(path.to_owned()));
    }
    Ok(segments)
}

/// Derives a path that is free in `set` from `proposed` by inserting
/// `" (n)"` right before the extension, the way file managers disambiguate
/// copies. Compound `.tar.gz` / `.tar.zip` extensions stay intact.
pub fn uniquify_filename(proposed: &str, set: &PathSet) -> String {
    if !set.contains(proposed) {
        return proposed.to_owned();
    }

    let (stem, extension) = split_extension(proposed);
    let mut n = 1u32;
    loop {
        let candidate = format!("{} ({}){}", stem, n, extension);
        if !set.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn split_extension(path: &str) -> (&str, &str) {
    for compound in [".tar.gz", ".tar.zip"] {
        if path.len() > compound.len() && path.ends_with(compound) {
            return path.split_at(path.len() - compound.len());
        }
    }

    let basename_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[basename_start..].rfind('.') {
        // A leading dot is a hidden-file marker, not an extension.
        Some(0) | None => (path, ""),
        Some(dot) => path.split_at(basename_start + dot),
    }
}
