//! Error types for the analysis and import layers

use std::time::Duration;
use thiserror::Error;

/// The analysis engine could not be brought up.
///
/// Fatal for the whole session: once cached by the extractor it is returned
/// to every later caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineLoadError {
    #[error("engine module could not be fetched: {0}")]
    Fetch(String),

    #[error("engine module failed to instantiate: {0}")]
    Instantiate(String),

    #[error("engine module is missing entry point `{0}`")]
    MissingEntryPoint(String),
}

/// Failure inside the feature extractor
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Load(#[from] EngineLoadError),

    #[error("{algorithm} failed: {message}")]
    Algorithm {
        algorithm: &'static str,
        message: String,
    },
}

/// The file is not valid or supported audio
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read audio bytes: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    #[error("no audio track found")]
    NoTrack,

    #[error("no sample rate in audio track")]
    NoSampleRate,

    #[error("failed to create audio decoder: {0}")]
    Codec(String),

    #[error("no audio samples could be decoded")]
    Empty,
}

/// Errors surfaced by the analysis client
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A second analysis was requested while one is still awaiting its reply
    #[error("Analysis already in progress")]
    Concurrency,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The worker replied with an application-level error
    #[error("{0}")]
    Engine(String),

    /// The worker's execution context failed (crash, closed channel)
    #[error("analysis worker fault: {0}")]
    WorkerFault(String),

    #[error("analysis worker did not reply within {0:?}")]
    Timeout(Duration),
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("beat {0} already exists")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Per-file import failure, recorded in the outcome instead of aborting the batch
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        source: std::io::Error,
    },

    #[error("directory scan failed: {0}")]
    Scan(#[from] walkdir::Error),

    #[error("invalid beat: {0}")]
    InvalidBeat(String),
}
