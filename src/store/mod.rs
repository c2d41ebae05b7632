//! Beat persistence
//!
//! The import pipeline only ever calls [`BeatStore::put`].

mod memory;
mod sqlite;

pub use memory::MemoryBeatStore;
pub use sqlite::SqliteBeatStore;

use crate::error::StorageError;
use crate::model::Beat;

/// Write side of the beat database
pub trait BeatStore {
    /// Insert a new beat and return its id
    fn put(&self, beat: &Beat) -> Result<String, StorageError>;
}

impl<S: BeatStore + ?Sized> BeatStore for &S {
    fn put(&self, beat: &Beat) -> Result<String, StorageError> {
        (**self).put(beat)
    }
}
