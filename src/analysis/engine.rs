//! Feature extractor: lazy engine loading and one-shot extraction
//!
//! The extractor owns the engine lifecycle. The first caller of
//! [`FeatureExtractor::initialize`] runs the loader; concurrent callers wait
//! for that same load, and every later caller gets the cached engine or the
//! cached load failure.

use super::traits::{EngineLoader, FeatureEngine, VectorId, REQUIRED_ALGORITHMS};
use crate::error::{EngineLoadError, ExtractError};
use crate::model::AudioFeatures;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Observable lifecycle of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Loading,
    Ready,
    Failed,
}

enum LoadState {
    NotStarted,
    Loading,
    Ready(Arc<dyn FeatureEngine>),
    Failed(EngineLoadError),
}

/// Wraps an engine loader and turns sample buffers into [`AudioFeatures`]
pub struct FeatureExtractor {
    loader: Arc<dyn EngineLoader>,
    state: Mutex<LoadState>,
    loaded: Condvar,
}

impl FeatureExtractor {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            loader,
            state: Mutex::new(LoadState::NotStarted),
            loaded: Condvar::new(),
        }
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        match *self.lock_state() {
            LoadState::NotStarted => EngineState::NotStarted,
            LoadState::Loading => EngineState::Loading,
            LoadState::Ready(_) => EngineState::Ready,
            LoadState::Failed(_) => EngineState::Failed,
        }
    }

    /// Load the engine once and return it
    pub fn initialize(&self) -> Result<Arc<dyn FeatureEngine>, EngineLoadError> {
        let mut state = self.lock_state();
        loop {
            match &*state {
                LoadState::Ready(engine) => return Ok(Arc::clone(engine)),
                LoadState::Failed(err) => return Err(err.clone()),
                LoadState::Loading => {
                    state = self
                        .loaded
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                LoadState::NotStarted => {
                    *state = LoadState::Loading;
                    break;
                }
            }
        }
        drop(state);

        log::info!("Initializing analysis engine...");
        let result = self.load_and_validate();

        let mut state = self.lock_state();
        *state = match &result {
            Ok(engine) => {
                log::info!("Analysis engine initialized");
                LoadState::Ready(Arc::clone(engine))
            }
            Err(e) => {
                log::error!("Analysis engine failed to load: {}", e);
                LoadState::Failed(e.clone())
            }
        };
        self.loaded.notify_all();

        result
    }

    /// Extract tempo, key and energy from a mono sample buffer
    ///
    /// Runs tempo, key and energy in that order. The engine-side vector is
    /// released on every exit path.
    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<AudioFeatures, ExtractError> {
        let engine = self.initialize()?;

        let vector = NativeVector::create(engine.as_ref(), samples)?;

        let bpm = engine
            .extract_tempo(vector.id(), sample_rate)
            .map_err(|message| ExtractError::Algorithm {
                algorithm: "RhythmExtractor",
                message,
            })?;
        log::debug!("Tempo: {:.2} BPM", bpm);

        let key = engine
            .extract_key(vector.id(), sample_rate)
            .map_err(|message| ExtractError::Algorithm {
                algorithm: "KeyExtractor",
                message,
            })?;
        log::debug!("Key: {}", key.display());

        let energy = engine
            .extract_energy(vector.id())
            .map_err(|message| ExtractError::Algorithm {
                algorithm: "Loudness",
                message,
            })?;
        log::debug!("Energy: {:.4}", energy);

        drop(vector);

        Ok(AudioFeatures {
            bpm: bpm as f64,
            key: key.display(),
            energy: energy as f64,
        })
    }

    fn load_and_validate(&self) -> Result<Arc<dyn FeatureEngine>, EngineLoadError> {
        let loader = Arc::clone(&self.loader);
        let engine = panic::catch_unwind(AssertUnwindSafe(move || loader.load()))
            .map_err(|_| EngineLoadError::Instantiate("engine loader panicked".to_string()))??;

        let exported = engine.algorithms();
        if let Some(missing) = REQUIRED_ALGORITHMS
            .iter()
            .find(|name| !exported.contains(*name))
        {
            return Err(EngineLoadError::MissingEntryPoint(missing.to_string()));
        }

        Ok(Arc::from(engine))
    }

    fn lock_state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Engine-side vector, released when dropped
struct NativeVector<'a> {
    engine: &'a dyn FeatureEngine,
    id: VectorId,
}

impl<'a> NativeVector<'a> {
    fn create(engine: &'a dyn FeatureEngine, samples: &[f32]) -> Result<Self, ExtractError> {
        let id = engine
            .create_vector(samples)
            .map_err(|message| ExtractError::Algorithm {
                algorithm: "arrayToVector",
                message,
            })?;
        Ok(Self { engine, id })
    }

    fn id(&self) -> VectorId {
        self.id
    }
}

impl Drop for NativeVector<'_> {
    fn drop(&mut self) {
        self.engine.release_vector(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fakes::{CountingEngine, SharedLoader};
    use crate::analysis::traits::KeyEstimate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct FailingLoader {
        loads: AtomicUsize,
    }

    impl EngineLoader for FailingLoader {
        fn load(&self) -> Result<Box<dyn FeatureEngine>, EngineLoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Err(EngineLoadError::Fetch("essentia-wasm.web.wasm: 404".to_string()))
        }
    }

    struct IncompleteEngine;

    impl FeatureEngine for IncompleteEngine {
        fn algorithms(&self) -> Vec<&'static str> {
            vec!["RhythmExtractor", "KeyExtractor"]
        }
        fn create_vector(&self, _samples: &[f32]) -> Result<VectorId, String> {
            Ok(VectorId(0))
        }
        fn release_vector(&self, _vector: VectorId) {}
        fn extract_tempo(&self, _vector: VectorId, _sample_rate: u32) -> Result<f32, String> {
            Ok(0.0)
        }
        fn extract_key(&self, _vector: VectorId, _sample_rate: u32) -> Result<KeyEstimate, String> {
            Err("unused".to_string())
        }
        fn extract_energy(&self, _vector: VectorId) -> Result<f32, String> {
            Ok(0.0)
        }
    }

    struct IncompleteLoader;

    impl EngineLoader for IncompleteLoader {
        fn load(&self) -> Result<Box<dyn FeatureEngine>, EngineLoadError> {
            Ok(Box::new(IncompleteEngine))
        }
    }

    #[test]
    fn test_extract_combines_features() {
        let loader = Arc::new(SharedLoader::new(CountingEngine::default()));
        let extractor = FeatureExtractor::new(loader);
        assert_eq!(extractor.state(), EngineState::NotStarted);

        let features = extractor.extract(&[0.0; 16], 44100).unwrap();

        assert_eq!(extractor.state(), EngineState::Ready);
        assert_eq!(features.bpm, 120.5);
        assert_eq!(features.key, "C Major");
        assert!((features.energy - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_concurrent_initialize_loads_once() {
        let mut loader = SharedLoader::new(CountingEngine::default());
        loader.delay = Duration::from_millis(50);
        let loader = Arc::new(loader);
        let extractor = Arc::new(FeatureExtractor::new(loader.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let extractor = Arc::clone(&extractor);
                thread::spawn(move || extractor.initialize().is_ok())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.state(), EngineState::Ready);
    }

    #[test]
    fn test_load_failure_is_cached() {
        let loader = Arc::new(FailingLoader {
            loads: AtomicUsize::new(0),
        });
        let extractor = FeatureExtractor::new(loader.clone());

        let first = extractor.initialize().err().unwrap();
        let second = extractor.extract(&[0.0; 4], 44100).unwrap_err();

        assert!(matches!(first, EngineLoadError::Fetch(_)));
        assert!(matches!(second, ExtractError::Load(EngineLoadError::Fetch(_))));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.state(), EngineState::Failed);
    }

    #[test]
    fn test_missing_entry_point_is_load_error() {
        let extractor = FeatureExtractor::new(Arc::new(IncompleteLoader));

        let err = extractor.initialize().err().unwrap();

        assert_eq!(err, EngineLoadError::MissingEntryPoint("Loudness".to_string()));
    }

    #[test]
    fn test_vectors_released_on_every_path() {
        let ok_loader = Arc::new(SharedLoader::new(CountingEngine::default()));
        let ok_extractor = FeatureExtractor::new(ok_loader.clone());
        for _ in 0..3 {
            ok_extractor.extract(&[0.1; 8], 44100).unwrap();
        }
        let engine = &ok_loader.engine;
        assert_eq!(engine.created.load(Ordering::SeqCst), 3);
        assert_eq!(engine.released.load(Ordering::SeqCst), 3);

        let failing_loader = Arc::new(SharedLoader::new(CountingEngine {
            fail_key: true,
            ..Default::default()
        }));
        let failing_extractor = FeatureExtractor::new(failing_loader.clone());
        for _ in 0..2 {
            let err = failing_extractor.extract(&[0.1; 8], 44100).unwrap_err();
            assert!(err.to_string().contains("KeyExtractor"));
        }
        let engine = &failing_loader.engine;
        assert_eq!(engine.created.load(Ordering::SeqCst), 2);
        assert_eq!(engine.released.load(Ordering::SeqCst), 2);
    }
}
