//! Analysis trait definitions and data structures

use crate::error::{AnalysisError, EngineLoadError};
use crate::import::AudioSource;
use crate::model::AudioFeatures;

/// Entry points every engine must provide, checked once at load time
pub const REQUIRED_ALGORITHMS: [&str; 3] = ["RhythmExtractor", "KeyExtractor", "Loudness"];

/// Audio analyzer trait - allows swapping the worker-backed client for fakes
pub trait AudioAnalyzer {
    /// Analyze one audio file and return its features
    fn analyze(&self, file: &dyn AudioSource) -> Result<AudioFeatures, AnalysisError>;
}

/// Handle to an engine-side sample vector
///
/// Vectors live outside Rust's ownership model and must be handed back with
/// [`FeatureEngine::release_vector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorId(pub u64);

/// Key estimate as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEstimate {
    /// Pitch class, e.g. "C" or "F#"
    pub key: String,

    /// Scale, e.g. "Major"
    pub scale: String,
}

impl KeyEstimate {
    /// Display form: "<pitch-class> <scale>"
    pub fn display(&self) -> String {
        format!("{} {}", self.key, self.scale)
    }
}

/// Fixed function surface of a loaded analysis engine
///
/// Errors from the extraction functions are plain messages; the extractor
/// wraps them with the algorithm name.
pub trait FeatureEngine: Send + Sync {
    /// Names of the algorithms this engine exports
    fn algorithms(&self) -> Vec<&'static str>;

    /// Copy samples into a new engine-side vector
    fn create_vector(&self, samples: &[f32]) -> Result<VectorId, String>;

    /// Free an engine-side vector
    fn release_vector(&self, vector: VectorId);

    fn extract_tempo(&self, vector: VectorId, sample_rate: u32) -> Result<f32, String>;

    fn extract_key(&self, vector: VectorId, sample_rate: u32) -> Result<KeyEstimate, String>;

    fn extract_energy(&self, vector: VectorId) -> Result<f32, String>;
}

/// Loads an engine module
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn FeatureEngine>, EngineLoadError>;
}
