//! Audio decoding to PCM using symphonia
//!
//! Each call opens its own decode session (probe + codec) which is released
//! when the call returns, on success or failure.

use crate::error::DecodeError;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded samples of a single channel
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Turns encoded audio bytes into PCM
pub trait AudioDecoder: Send + Sync {
    /// Decode `bytes`; `name` is only used as a format hint and for messages
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<PcmBuffer, DecodeError>;
}

/// Decoder backed by symphonia's default codec registry
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder {
    /// Stop after this many seconds of audio (None = whole file)
    max_seconds: Option<u32>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self { max_seconds: None }
    }

    /// Only decode the first `seconds` of each file
    pub fn with_max_seconds(mut self, seconds: u32) -> Self {
        self.max_seconds = Some(seconds);
        self
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<PcmBuffer, DecodeError> {
        let mut session = DecodeSession::open(name, bytes.to_vec())?;
        let pcm = session.read_first_channel(self.max_seconds)?;

        log::debug!(
            "Decoded {} samples ({:.1}s) at {}Hz from {}",
            pcm.samples.len(),
            pcm.duration_secs(),
            pcm.sample_rate,
            name
        );
        Ok(pcm)
    }
}

/// Format reader and codec for one file
struct DecodeSession {
    name: String,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

impl DecodeSession {
    fn open(name: &str, bytes: Vec<u8>) -> Result<Self, DecodeError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Unsupported(format!("{}: {}", name, e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoTrack)?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(DecodeError::NoSampleRate)?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Codec(e.to_string()))?;

        log::trace!("Decode session opened for {}", name);

        Ok(Self {
            name: name.to_string(),
            format,
            decoder,
            track_id,
            sample_rate,
        })
    }

    /// Decode packets until end of stream, keeping only channel 0
    fn read_first_channel(&mut self, max_seconds: Option<u32>) -> Result<PcmBuffer, DecodeError> {
        let max_samples = max_seconds.map(|s| s as usize * self.sample_rate as usize);
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    log::warn!("Error reading packet from {}: {:?}", self.name, e);
                    break;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("Error decoding packet from {}: {:?}", self.name, e);
                    continue;
                }
            };

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            let channels = spec.channels.count().max(1);
            samples.extend(sample_buf.samples().iter().step_by(channels));

            if let Some(max) = max_samples {
                if samples.len() >= max {
                    samples.truncate(max);
                    break;
                }
            }
        }

        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }

        Ok(PcmBuffer {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        log::trace!("Decode session closed for {}", self.name);
    }
}
