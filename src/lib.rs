//! Beat Catalog - audio analysis and batch import for a beat library
//!
//! Audio files are decoded, analyzed for tempo, key and energy on a
//! dedicated worker thread, and stored as beats.

pub mod analysis;
pub mod error;
pub mod import;
pub mod model;
pub mod store;
pub mod worker;

pub use import::{ImportConfig, ImportMode, ImportPipeline};
pub use model::{Beat, ImportOutcome};
pub use worker::AnalysisClient;
