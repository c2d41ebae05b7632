//! Audio analysis layer
//!
//! The engine sits behind the [`FeatureEngine`] trait and is loaded lazily by
//! the [`FeatureExtractor`]. The shipped engine is powered by stratum-dsp;
//! decoding is done with symphonia.

mod decoder;
mod engine;
mod stratum;
mod traits;

#[cfg(test)]
pub(crate) mod fakes;

pub use decoder::{AudioDecoder, PcmBuffer, SymphoniaDecoder};
pub use engine::{EngineState, FeatureExtractor};
pub use stratum::{loudness, StratumEngine, StratumLoader};
pub use traits::{
    AudioAnalyzer, EngineLoader, FeatureEngine, KeyEstimate, VectorId, REQUIRED_ALGORITHMS,
};
