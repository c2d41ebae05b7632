//! Worker message protocol
//!
//! Wire shapes (JSON):
//!
//! ```text
//! request:  {"cmd":"analyze","audioBuffer":[f32, ...],"sampleRate":44100}
//! success:  {"status":"success","result":{"bpm":f,"key":"C Major","energy":f}}
//! error:    {"status":"error","error":"message"}
//! ```
//!
//! Request correlation is carried outside the wire message, in [`Envelope`].

use crate::model::AudioFeatures;
use serde::{Deserialize, Serialize};

/// Command sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum WorkerRequest {
    #[serde(rename_all = "camelCase")]
    Analyze {
        audio_buffer: Vec<f32>,
        sample_rate: u32,
    },
}

/// Exactly one reply is sent per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum WorkerReply {
    Success { result: AudioFeatures },
    Error { error: String },
}

impl WorkerReply {
    pub fn error(message: impl Into<String>) -> Self {
        WorkerReply::Error {
            error: message.into(),
        }
    }
}

/// A message tagged with the id of the request it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub id: u64,
    pub body: T,
}

pub fn encode_request(request: &WorkerRequest) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(request)
}

pub fn decode_request(bytes: &[u8]) -> serde_json::Result<WorkerRequest> {
    serde_json::from_slice(bytes)
}

pub fn encode_reply(reply: &WorkerReply) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(reply)
}

pub fn decode_reply(bytes: &[u8]) -> serde_json::Result<WorkerReply> {
    serde_json::from_slice(bytes)
}
