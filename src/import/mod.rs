//! Batch import of audio files into the beat catalog

mod config;
mod pipeline;
mod source;

pub use config::{ImportConfig, ImportMode, DEFAULT_EXTENSIONS};
pub use pipeline::ImportPipeline;
pub use source::{scan_directory, AudioSource, DiskFile, MemoryFile};
