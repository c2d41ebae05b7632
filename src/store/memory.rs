use super::BeatStore;
use crate::error::StorageError;
use crate::model::Beat;
use std::sync::{Mutex, PoisonError};

/// Beat store kept in memory, in insertion order
#[derive(Debug, Default)]
pub struct MemoryBeatStore {
    beats: Mutex<Vec<Beat>>,
}

impl MemoryBeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored beats
    pub fn beats(&self) -> Vec<Beat> {
        self.beats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.beats.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BeatStore for MemoryBeatStore {
    fn put(&self, beat: &Beat) -> Result<String, StorageError> {
        let mut beats = self.beats.lock().unwrap_or_else(PoisonError::into_inner);
        if beats.iter().any(|b| b.id == beat.id) {
            return Err(StorageError::Duplicate(beat.id.clone()));
        }
        beats.push(beat.clone());
        Ok(beat.id.clone())
    }
}
