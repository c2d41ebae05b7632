//! Analysis worker and its client
//!
//! The worker runs feature extraction on its own thread so the importing
//! thread only decodes and waits. At most one request is in flight per
//! worker.

mod client;
pub mod protocol;
mod service;

pub use client::AnalysisClient;
pub use protocol::{Envelope, WorkerReply, WorkerRequest};
pub use service::{handle_request, handle_wire, AnalysisWorker, WorkerHandle, WorkerState};
