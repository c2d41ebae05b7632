//! Analysis engine backed by stratum-dsp
//!
//! Tempo and key come from a single `analyze_audio` run per vector, cached
//! in the vector's slot so the key lookup does not analyze twice. Energy is
//! a power-law loudness over the raw samples.

use super::traits::{EngineLoader, FeatureEngine, KeyEstimate, VectorId, REQUIRED_ALGORITHMS};
use crate::error::EngineLoadError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stratum_dsp::{analyze_audio, AnalysisConfig, Key};

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Exponent of the Stevens power law used for loudness
const LOUDNESS_EXPONENT: f32 = 0.67;

/// Tempo and key of one analyzed vector
#[derive(Debug, Clone)]
struct StratumResult {
    bpm: f32,
    key: KeyEstimate,
}

struct Slot {
    samples: Arc<Vec<f32>>,
    analysis: Option<StratumResult>,
}

/// [`FeatureEngine`] implementation using stratum-dsp
pub struct StratumEngine {
    vectors: Mutex<HashMap<VectorId, Slot>>,
    next_id: AtomicU64,
    bpm_range: Option<(f32, f32)>,
}

impl StratumEngine {
    pub fn new(bpm_range: Option<(f32, f32)>) -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            bpm_range,
        }
    }

    /// Number of vectors created and not yet released
    pub fn live_vectors(&self) -> usize {
        self.lock_vectors().len()
    }

    fn samples(&self, vector: VectorId) -> Result<Arc<Vec<f32>>, String> {
        self.lock_vectors()
            .get(&vector)
            .map(|slot| Arc::clone(&slot.samples))
            .ok_or_else(|| format!("unknown vector {:?}", vector))
    }

    /// Run (or reuse) the stratum-dsp analysis for a vector
    fn analysis(&self, vector: VectorId, sample_rate: u32) -> Result<StratumResult, String> {
        if let Some(cached) = self
            .lock_vectors()
            .get(&vector)
            .and_then(|slot| slot.analysis.clone())
        {
            return Ok(cached);
        }

        // Analyze without holding the lock
        let samples = self.samples(vector)?;
        if samples.len() < sample_rate as usize {
            return Err(format!(
                "audio too short for analysis ({} samples at {}Hz, need at least 1s)",
                samples.len(),
                sample_rate
            ));
        }
        let result = analyze_audio(&samples, sample_rate, AnalysisConfig::default())
            .map_err(|e| format!("audio analysis failed: {:?}", e))?;

        let analysis = StratumResult {
            bpm: self.normalize_bpm(result.bpm),
            key: key_estimate(&result.key),
        };

        if let Some(slot) = self.lock_vectors().get_mut(&vector) {
            slot.analysis = Some(analysis.clone());
        }
        Ok(analysis)
    }

    /// Fold the tempo into the configured range by doubling or halving
    fn normalize_bpm(&self, detected: f32) -> f32 {
        let Some((min_bpm, max_bpm)) = self.bpm_range else {
            return detected;
        };

        let mut bpm = detected;
        if bpm > 0.0 {
            while bpm < min_bpm && bpm * 2.0 <= max_bpm {
                bpm *= 2.0;
                log::debug!("BPM doubled to {:.1} (was below minimum {})", bpm, min_bpm);
            }
            while bpm > max_bpm && bpm / 2.0 >= min_bpm {
                bpm /= 2.0;
                log::debug!("BPM halved to {:.1} (was above maximum {})", bpm, max_bpm);
            }
        }
        bpm
    }

    fn lock_vectors(&self) -> MutexGuard<'_, HashMap<VectorId, Slot>> {
        self.vectors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FeatureEngine for StratumEngine {
    fn algorithms(&self) -> Vec<&'static str> {
        REQUIRED_ALGORITHMS.to_vec()
    }

    fn create_vector(&self, samples: &[f32]) -> Result<VectorId, String> {
        if samples.is_empty() {
            return Err("cannot create a vector from an empty buffer".to_string());
        }
        let id = VectorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_vectors().insert(
            id,
            Slot {
                samples: Arc::new(samples.to_vec()),
                analysis: None,
            },
        );
        Ok(id)
    }

    fn release_vector(&self, vector: VectorId) {
        if self.lock_vectors().remove(&vector).is_none() {
            log::warn!("Release of unknown vector {:?}", vector);
        }
    }

    fn extract_tempo(&self, vector: VectorId, sample_rate: u32) -> Result<f32, String> {
        Ok(self.analysis(vector, sample_rate)?.bpm)
    }

    fn extract_key(&self, vector: VectorId, sample_rate: u32) -> Result<KeyEstimate, String> {
        Ok(self.analysis(vector, sample_rate)?.key)
    }

    fn extract_energy(&self, vector: VectorId) -> Result<f32, String> {
        let samples = self.samples(vector)?;
        Ok(loudness(&samples))
    }
}

/// Stevens power-law loudness: (sum of squares) ^ 0.67
pub fn loudness(samples: &[f32]) -> f32 {
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    energy.powf(LOUDNESS_EXPONENT)
}

/// Split a stratum-dsp key into pitch class and scale
fn key_estimate(key: &Key) -> KeyEstimate {
    let (index, scale) = match key {
        Key::Major(pitch) => (*pitch as usize, "Major"),
        Key::Minor(pitch) => (*pitch as usize, "Minor"),
    };
    KeyEstimate {
        key: PITCH_CLASSES[index % PITCH_CLASSES.len()].to_string(),
        scale: scale.to_string(),
    }
}

/// Loads a [`StratumEngine`]
#[derive(Debug, Clone, Default)]
pub struct StratumLoader {
    bpm_range: Option<(f32, f32)>,
}

impl StratumLoader {
    pub fn new() -> Self {
        Self { bpm_range: None }
    }

    /// Fold detected tempos into `[min, max]` BPM
    pub fn with_bpm_range(mut self, min: f32, max: f32) -> Self {
        self.bpm_range = Some((min, max));
        self
    }
}

impl EngineLoader for StratumLoader {
    fn load(&self) -> Result<Box<dyn FeatureEngine>, EngineLoadError> {
        if let Some((min, max)) = self.bpm_range {
            if !(min > 0.0 && min < max) {
                return Err(EngineLoadError::Instantiate(format!(
                    "invalid BPM range {}-{}",
                    min, max
                )));
            }
            log::info!("BPM detection range: {}-{} BPM", min, max);
        }
        Ok(Box::new(StratumEngine::new(self.bpm_range)))
    }
}
