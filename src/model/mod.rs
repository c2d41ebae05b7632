//! Data model for the beat catalog
//!
//! These types are independent of both the analysis engine and the storage
//! backend.

mod beat;
mod outcome;

pub use beat::{round_bpm, AudioFeatures, Beat, FileRef};
pub use outcome::{ImportFailure, ImportOutcome, ImportProgress};
