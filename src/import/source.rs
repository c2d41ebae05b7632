//! Audio file sources: in-memory files, files on disk, and directory scans

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file-like object that can be analyzed
pub trait AudioSource {
    /// File name, used as the beat title and for extension filtering
    fn name(&self) -> &str;

    /// Read the whole file
    fn read_bytes(&self) -> io::Result<Vec<u8>>;
}

impl<T: AudioSource + ?Sized> AudioSource for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read_bytes(&self) -> io::Result<Vec<u8>> {
        (**self).read_bytes()
    }
}

/// File content already held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    name: String,
    bytes: Vec<u8>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl AudioSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

/// A file on disk, re-openable through its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskFile {
    path: PathBuf,
    name: String,
}

impl DiskFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSource for DiskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// Lazily walk `root` depth-first, yielding every regular file
///
/// Entries in each directory are visited in file-name order. Nothing is
/// filtered by extension here.
pub fn scan_directory(
    root: &Path,
    follow_links: bool,
) -> impl Iterator<Item = Result<DiskFile, walkdir::Error>> {
    WalkDir::new(root)
        .follow_links(follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(Ok(DiskFile::new(entry.into_path()))),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
}
