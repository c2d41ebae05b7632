//! In-crate test doubles for the engine and decoder seams

use super::decoder::{AudioDecoder, PcmBuffer};
use super::traits::{EngineLoader, FeatureEngine, KeyEstimate, VectorId, REQUIRED_ALGORITHMS};
use crate::error::{DecodeError, EngineLoadError};
use crossbeam::channel::{Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Engine with fixed outputs (120.5 BPM, "C Major", 0.9) that counts vector traffic
#[derive(Default)]
pub(crate) struct CountingEngine {
    pub created: AtomicUsize,
    pub released: AtomicUsize,
    pub fail_key: bool,
    pub panic_tempo: bool,
    /// Signalled on entry to tempo extraction
    pub entered: Option<Sender<()>>,
    /// Tempo extraction blocks until this yields (or disconnects)
    pub gate: Option<Receiver<()>>,
}

impl FeatureEngine for CountingEngine {
    fn algorithms(&self) -> Vec<&'static str> {
        REQUIRED_ALGORITHMS.to_vec()
    }

    fn create_vector(&self, _samples: &[f32]) -> Result<VectorId, String> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(VectorId(n as u64))
    }

    fn release_vector(&self, _vector: VectorId) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn extract_tempo(&self, _vector: VectorId, _sample_rate: u32) -> Result<f32, String> {
        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if self.panic_tempo {
            panic!("tempo tracker blew up");
        }
        Ok(120.5)
    }

    fn extract_key(&self, _vector: VectorId, _sample_rate: u32) -> Result<KeyEstimate, String> {
        if self.fail_key {
            return Err("no tonal content".to_string());
        }
        Ok(KeyEstimate {
            key: "C".to_string(),
            scale: "Major".to_string(),
        })
    }

    fn extract_energy(&self, _vector: VectorId) -> Result<f32, String> {
        Ok(0.9)
    }
}

impl FeatureEngine for Arc<CountingEngine> {
    fn algorithms(&self) -> Vec<&'static str> {
        self.as_ref().algorithms()
    }

    fn create_vector(&self, samples: &[f32]) -> Result<VectorId, String> {
        self.as_ref().create_vector(samples)
    }

    fn release_vector(&self, vector: VectorId) {
        self.as_ref().release_vector(vector)
    }

    fn extract_tempo(&self, vector: VectorId, sample_rate: u32) -> Result<f32, String> {
        self.as_ref().extract_tempo(vector, sample_rate)
    }

    fn extract_key(&self, vector: VectorId, sample_rate: u32) -> Result<KeyEstimate, String> {
        self.as_ref().extract_key(vector, sample_rate)
    }

    fn extract_energy(&self, vector: VectorId) -> Result<f32, String> {
        self.as_ref().extract_energy(vector)
    }
}

/// Hands out one shared [`CountingEngine`] and counts loads
pub(crate) struct SharedLoader {
    pub engine: Arc<CountingEngine>,
    pub loads: AtomicUsize,
    pub delay: Duration,
}

impl SharedLoader {
    pub fn new(engine: CountingEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            loads: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }
}

impl EngineLoader for SharedLoader {
    fn load(&self) -> Result<Box<dyn FeatureEngine>, EngineLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(Box::new(Arc::clone(&self.engine)))
    }
}

/// Decoder producing a short constant buffer; names containing "corrupt" fail
pub(crate) struct ToneDecoder;

impl AudioDecoder for ToneDecoder {
    fn decode(&self, name: &str, _bytes: &[u8]) -> Result<PcmBuffer, DecodeError> {
        if name.contains("corrupt") {
            return Err(DecodeError::Unsupported(format!("{}: not audio", name)));
        }
        Ok(PcmBuffer {
            samples: vec![0.25; 1024],
            sample_rate: 44100,
        })
    }
}
