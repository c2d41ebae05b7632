//! Analysis worker: an isolated thread that owns the feature extractor
//!
//! ```text
//! ┌────────────────┐  Envelope<WorkerRequest>  ┌──────────────────┐
//! │ AnalysisClient │ ────────────────────────► │  AnalysisWorker  │
//! │                │ ◄──────────────────────── │ FeatureExtractor │
//! └────────────────┘  Envelope<WorkerReply>    └──────────────────┘
//! ```
//!
//! Every request gets exactly one reply. Errors and panics raised while
//! analyzing are turned into error replies; the loop only ends when the
//! request channel closes or the reply channel has no receiver left.

use super::protocol::{self, Envelope, WorkerReply, WorkerRequest};
use crate::analysis::{EngineState, FeatureExtractor};
use crossbeam::channel::{self, Receiver, Sender};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Worker lifecycle as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl From<EngineState> for WorkerState {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::NotStarted => WorkerState::Uninitialized,
            EngineState::Loading => WorkerState::Initializing,
            EngineState::Ready => WorkerState::Ready,
            EngineState::Failed => WorkerState::Failed,
        }
    }
}

/// Channels and thread of a running worker
pub struct WorkerHandle {
    pub(crate) request_tx: Sender<Envelope<WorkerRequest>>,
    pub(crate) reply_rx: Receiver<Envelope<WorkerReply>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    #[cfg(test)]
    pub(crate) fn from_channels(
        request_tx: Sender<Envelope<WorkerRequest>>,
        reply_rx: Receiver<Envelope<WorkerReply>>,
    ) -> Self {
        Self {
            request_tx,
            reply_rx,
            thread: None,
        }
    }

    /// Close the request channel and wait for the worker thread to exit
    pub fn shutdown(mut self) {
        let thread = self.thread.take();
        drop(self);
        if let Some(thread) = thread {
            if thread.join().is_err() {
                log::warn!("Analysis worker thread panicked during shutdown");
            }
        }
    }
}

/// Spawns and runs analysis workers
pub struct AnalysisWorker;

impl AnalysisWorker {
    /// Start a worker thread around `extractor`
    pub fn spawn(extractor: Arc<FeatureExtractor>) -> io::Result<WorkerHandle> {
        let (request_tx, request_rx) = channel::unbounded();
        let (reply_tx, reply_rx) = channel::unbounded();

        let thread = thread::Builder::new()
            .name("analysis-worker".to_string())
            .spawn(move || Self::run(&extractor, request_rx, reply_tx))?;

        Ok(WorkerHandle {
            request_tx,
            reply_rx,
            thread: Some(thread),
        })
    }

    /// Main worker loop
    fn run(
        extractor: &FeatureExtractor,
        request_rx: Receiver<Envelope<WorkerRequest>>,
        reply_tx: Sender<Envelope<WorkerReply>>,
    ) {
        log::debug!("Analysis worker started");

        while let Ok(Envelope { id, body }) = request_rx.recv() {
            let reply = handle_request(extractor, body);
            if reply_tx.send(Envelope { id, body: reply }).is_err() {
                log::debug!("Reply receiver gone, analysis worker exiting");
                break;
            }
        }

        log::debug!("Analysis worker stopped");
    }
}

/// Process one request into its reply
pub fn handle_request(extractor: &FeatureExtractor, request: WorkerRequest) -> WorkerReply {
    match request {
        WorkerRequest::Analyze {
            audio_buffer,
            sample_rate,
        } => {
            if sample_rate == 0 {
                return WorkerReply::error("sample rate must be a positive integer");
            }
            if audio_buffer.is_empty() {
                return WorkerReply::error("audio buffer is empty");
            }

            log::debug!(
                "Analyzing {} samples at {}Hz",
                audio_buffer.len(),
                sample_rate
            );

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                extractor.extract(&audio_buffer, sample_rate)
            }));

            match outcome {
                Ok(Ok(result)) => WorkerReply::Success { result },
                Ok(Err(e)) => {
                    log::error!("Analysis worker error: {}", e);
                    WorkerReply::error(e.to_string())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("Analysis worker panicked: {}", message);
                    WorkerReply::error(message)
                }
            }
        }
    }
}

/// Process one JSON-encoded request into a JSON-encoded reply
///
/// A request that cannot be decoded still gets an error reply.
pub fn handle_wire(extractor: &FeatureExtractor, bytes: &[u8]) -> Vec<u8> {
    let reply = match protocol::decode_request(bytes) {
        Ok(request) => handle_request(extractor, request),
        Err(e) => WorkerReply::error(format!("malformed request: {}", e)),
    };

    protocol::encode_reply(&reply).unwrap_or_else(|e| {
        let fallback = WorkerReply::error(format!("unencodable reply: {}", e));
        protocol::encode_reply(&fallback).unwrap_or_default()
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "analysis panicked".to_string()
    }
}
