use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Features extracted from one audio file
///
/// This is also the `result` payload of a successful worker reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    /// Tempo in beats per minute, unrounded
    pub bpm: f64,

    /// Display key, e.g. "C Major"
    pub key: String,

    /// Loudness used as an energy proxy (approximation, not LUFS)
    pub energy: f64,
}

/// Where the original audio of a beat can be found again
#[derive(Debug, Clone, PartialEq)]
pub enum FileRef {
    /// Reusable reference to the file on disk
    Handle(PathBuf),

    /// Captured copy of the file's bytes
    Blob(Vec<u8>),
}

/// A persisted, analyzed audio file
#[derive(Debug, Clone, PartialEq)]
pub struct Beat {
    /// Unique identifier, generated at creation
    pub id: String,

    /// Title, taken from the source file name
    pub title: String,

    /// Tempo rounded to 2 decimal places
    pub bpm: f64,

    /// Key as "<pitch-class> <scale>"
    pub key: String,

    /// User tags (always empty after import)
    pub tags: Vec<String>,

    /// Reference to the original audio
    pub file: FileRef,
}

impl Beat {
    /// Build a new beat from analysis output
    ///
    /// Fails if the title is empty or the tempo is negative or not finite.
    pub fn from_features(
        title: impl Into<String>,
        features: &AudioFeatures,
        file: FileRef,
    ) -> Result<Self, String> {
        let title = title.into();
        if title.is_empty() {
            return Err("beat title must not be empty".to_string());
        }
        if !features.bpm.is_finite() || features.bpm < 0.0 {
            return Err(format!("bpm must be a non-negative number, got {}", features.bpm));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title,
            bpm: round_bpm(features.bpm),
            key: features.key.clone(),
            tags: Vec::new(),
            file,
        })
    }

    /// Path of the original file, if this beat stores a handle
    pub fn file_path(&self) -> Option<&PathBuf> {
        match &self.file {
            FileRef::Handle(path) => Some(path),
            FileRef::Blob(_) => None,
        }
    }
}

/// Round a tempo to 2 decimal places for storage
pub fn round_bpm(bpm: f64) -> f64 {
    (bpm * 100.0).round() / 100.0
}
