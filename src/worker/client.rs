//! Analysis client: decode on the calling thread, analyze on the worker
//!
//! The client enforces single-flight on behalf of the worker: while one
//! request is awaiting its reply, any other call fails immediately with
//! [`AnalysisError::Concurrency`].

use super::protocol::{Envelope, WorkerReply, WorkerRequest};
use super::service::{AnalysisWorker, WorkerHandle, WorkerState};
use crate::analysis::{AudioAnalyzer, AudioDecoder, EngineLoader, FeatureExtractor};
use crate::error::{AnalysisError, DecodeError};
use crate::import::AudioSource;
use crate::model::AudioFeatures;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Worker-backed [`AudioAnalyzer`]
pub struct AnalysisClient {
    extractor: Arc<FeatureExtractor>,
    decoder: Arc<dyn AudioDecoder>,
    worker: Mutex<Option<WorkerHandle>>,
    pending: Mutex<Option<u64>>,
    next_id: AtomicU64,
    reply_timeout: Option<Duration>,
}

impl AnalysisClient {
    /// Create a client; the engine is loaded and the worker spawned on first use
    pub fn new(loader: Arc<dyn EngineLoader>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self {
            extractor: Arc::new(FeatureExtractor::new(loader)),
            decoder,
            worker: Mutex::new(None),
            pending: Mutex::new(None),
            next_id: AtomicU64::new(1),
            reply_timeout: None,
        }
    }

    /// Give up on a reply after `timeout` and reset the worker
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Analyze an audio file and return its BPM, key and energy
    pub fn analyze_audio_file(&self, file: &dyn AudioSource) -> Result<AudioFeatures, AnalysisError> {
        let bytes = file.read_bytes().map_err(DecodeError::Io)?;
        let pcm = self.decoder.decode(file.name(), &bytes)?;
        drop(bytes);

        self.analyze_samples(pcm.samples, pcm.sample_rate)
    }

    /// Send decoded samples to the worker and wait for its reply
    pub fn analyze_samples(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Result<AudioFeatures, AnalysisError> {
        let pending = self.begin_request()?;
        let id = pending.id;

        let (request_tx, reply_rx) = self.worker_channels()?;

        let request = WorkerRequest::Analyze {
            audio_buffer: samples,
            sample_rate,
        };
        if request_tx.send(Envelope { id, body: request }).is_err() {
            self.reset_worker();
            return Err(AnalysisError::WorkerFault(
                "analysis worker is not running".to_string(),
            ));
        }

        match self.await_reply(id, &reply_rx) {
            Ok(WorkerReply::Success { result }) => Ok(result),
            Ok(WorkerReply::Error { error }) => {
                log::debug!("Worker returned error: {}", error);
                Err(AnalysisError::Engine(error))
            }
            Err(e) => {
                log::debug!("Analysis worker error: {}", e);
                self.reset_worker();
                Err(e)
            }
        }
    }

    /// Lifecycle of the worker's engine
    pub fn worker_state(&self) -> WorkerState {
        self.extractor.state().into()
    }

    /// Whether a request is currently awaiting a reply
    pub fn is_busy(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Stop the worker thread, if one is running
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.worker).take() {
            handle.shutdown();
        }
    }

    fn begin_request(&self) -> Result<PendingRequest<'_>, AnalysisError> {
        let mut pending = lock(&self.pending);
        if pending.is_some() {
            return Err(AnalysisError::Concurrency);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *pending = Some(id);
        Ok(PendingRequest {
            slot: &self.pending,
            id,
        })
    }

    /// Channels of the current worker, spawning it on first use
    #[allow(clippy::type_complexity)]
    fn worker_channels(
        &self,
    ) -> Result<(Sender<Envelope<WorkerRequest>>, Receiver<Envelope<WorkerReply>>), AnalysisError>
    {
        let mut worker = lock(&self.worker);
        if worker.is_none() {
            log::debug!("Spawning analysis worker");
            let handle = AnalysisWorker::spawn(Arc::clone(&self.extractor)).map_err(|e| {
                AnalysisError::WorkerFault(format!("failed to spawn analysis worker: {}", e))
            })?;
            *worker = Some(handle);
        }

        match worker.as_ref() {
            Some(handle) => Ok((handle.request_tx.clone(), handle.reply_rx.clone())),
            None => Err(AnalysisError::WorkerFault(
                "analysis worker unavailable".to_string(),
            )),
        }
    }

    fn await_reply(
        &self,
        id: u64,
        reply_rx: &Receiver<Envelope<WorkerReply>>,
    ) -> Result<WorkerReply, AnalysisError> {
        let deadline = self.reply_timeout.map(|t| (t, Instant::now() + t));

        loop {
            let envelope = match deadline {
                None => reply_rx.recv().map_err(|_| {
                    AnalysisError::WorkerFault("analysis worker terminated".to_string())
                })?,
                Some((timeout, at)) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    match reply_rx.recv_timeout(remaining) {
                        Ok(envelope) => envelope,
                        Err(RecvTimeoutError::Timeout) => {
                            return Err(AnalysisError::Timeout(timeout))
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(AnalysisError::WorkerFault(
                                "analysis worker terminated".to_string(),
                            ))
                        }
                    }
                }
            };

            if envelope.id == id {
                return Ok(envelope.body);
            }
            log::warn!(
                "Discarding stale worker reply {} while waiting for {}",
                envelope.id,
                id
            );
        }
    }

    /// Drop the current worker so the next call spawns a fresh one
    fn reset_worker(&self) {
        if lock(&self.worker).take().is_some() {
            log::warn!("Analysis worker reset");
        }
    }
}

impl AudioAnalyzer for AnalysisClient {
    fn analyze(&self, file: &dyn AudioSource) -> Result<AudioFeatures, AnalysisError> {
        self.analyze_audio_file(file)
    }
}

/// Occupies the single pending-request slot until dropped
struct PendingRequest<'a> {
    slot: &'a Mutex<Option<u64>>,
    id: u64,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if *slot == Some(self.id) {
            *slot = None;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fakes::{CountingEngine, SharedLoader, ToneDecoder};
    use crate::import::MemoryFile;
    use crossbeam::channel;
    use std::thread;

    fn client_with(engine: CountingEngine) -> (Arc<SharedLoader>, AnalysisClient) {
        let loader = Arc::new(SharedLoader::new(engine));
        let client = AnalysisClient::new(loader.clone(), Arc::new(ToneDecoder));
        (loader, client)
    }

    #[test]
    fn test_analyze_reuses_one_worker() {
        let (loader, client) = client_with(CountingEngine::default());
        assert_eq!(client.worker_state(), WorkerState::Uninitialized);

        for name in ["a.wav", "b.wav", "c.mp3"] {
            let features = client.analyze(&MemoryFile::new(name, vec![0u8; 8])).unwrap();
            assert_eq!(features.bpm, 120.5);
            assert_eq!(features.key, "C Major");
        }

        assert_eq!(client.worker_state(), WorkerState::Ready);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(!client.is_busy());
        client.shutdown();
    }

    #[test]
    fn test_decode_error_leaves_client_idle() {
        let (loader, client) = client_with(CountingEngine::default());

        let err = client
            .analyze(&MemoryFile::new("corrupt.wav", vec![0u8; 8]))
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Decode(_)));
        assert!(!client.is_busy());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_engine_error_reply_clears_pending() {
        let (_, client) = client_with(CountingEngine {
            fail_key: true,
            ..Default::default()
        });

        let err = client.analyze(&MemoryFile::new("a.wav", vec![0u8; 8])).unwrap_err();

        match err {
            AnalysisError::Engine(message) => assert!(message.contains("no tonal content")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!client.is_busy());
    }

    #[test]
    fn test_second_call_while_in_flight_is_rejected() {
        let (entered_tx, entered_rx) = channel::unbounded();
        let (gate_tx, gate_rx) = channel::unbounded();
        let (_, client) = client_with(CountingEngine {
            entered: Some(entered_tx),
            gate: Some(gate_rx),
            ..Default::default()
        });
        let client = Arc::new(client);

        let first = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.analyze(&MemoryFile::new("first.wav", vec![0u8; 8])))
        };
        entered_rx.recv().unwrap();
        assert!(client.is_busy());

        let second = client.analyze(&MemoryFile::new("second.wav", vec![0u8; 8]));
        assert!(matches!(second, Err(AnalysisError::Concurrency)));
        assert_eq!(
            second.unwrap_err().to_string(),
            "Analysis already in progress"
        );

        gate_tx.send(()).unwrap();
        assert!(first.join().unwrap().is_ok());
        assert!(!client.is_busy());

        // Slot is free again
        gate_tx.send(()).unwrap();
        assert!(client.analyze(&MemoryFile::new("third.wav", vec![0u8; 8])).is_ok());
    }

    #[test]
    fn test_timeout_resets_worker() {
        let (gate_tx, gate_rx) = channel::unbounded::<()>();
        let (loader, client) = client_with(CountingEngine {
            gate: Some(gate_rx),
            ..Default::default()
        });
        let client = client.with_reply_timeout(Duration::from_millis(50));

        let err = client.analyze(&MemoryFile::new("slow.wav", vec![0u8; 8])).unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout(_)));
        assert!(!client.is_busy());
        assert!(lock(&client.worker).is_none());

        // Unblock the abandoned request, then the next call uses a fresh worker
        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        assert!(client.analyze(&MemoryFile::new("next.wav", vec![0u8; 8])).is_ok());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_fault_rejects_and_resets() {
        let (_, client) = client_with(CountingEngine::default());

        // A worker whose thread is gone: requests are accepted, replies never come
        let (request_tx, request_rx) = channel::unbounded();
        let (reply_tx, reply_rx) = channel::unbounded::<Envelope<WorkerReply>>();
        drop(reply_tx);
        *lock(&client.worker) = Some(WorkerHandle::from_channels(request_tx, reply_rx));

        let err = client.analyze(&MemoryFile::new("a.wav", vec![0u8; 8])).unwrap_err();

        assert!(matches!(err, AnalysisError::WorkerFault(_)));
        assert!(!client.is_busy());
        assert!(lock(&client.worker).is_none());
        drop(request_rx);

        assert!(client.analyze(&MemoryFile::new("b.wav", vec![0u8; 8])).is_ok());
    }

    #[test]
    fn test_stale_replies_are_discarded() {
        let (_, client) = client_with(CountingEngine::default());

        let (request_tx, request_rx) = channel::unbounded::<Envelope<WorkerRequest>>();
        let (reply_tx, reply_rx) = channel::unbounded();
        *lock(&client.worker) = Some(WorkerHandle::from_channels(request_tx, reply_rx));

        let responder = thread::spawn(move || {
            let request = request_rx.recv().unwrap();
            reply_tx
                .send(Envelope {
                    id: request.id + 100,
                    body: WorkerReply::error("stale"),
                })
                .unwrap();
            reply_tx
                .send(Envelope {
                    id: request.id,
                    body: WorkerReply::Success {
                        result: AudioFeatures {
                            bpm: 99.0,
                            key: "A Minor".to_string(),
                            energy: 0.1,
                        },
                    },
                })
                .unwrap();
        });

        let features = client.analyze_samples(vec![0.1; 16], 44100).unwrap();
        assert_eq!(features.key, "A Minor");
        responder.join().unwrap();
    }
}
