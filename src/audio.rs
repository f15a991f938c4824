//! Microphone capture and phrase segmentation.
//!
//! This module owns the cpal input stream and splits the incoming sample
//! stream into phrases with a simple energy gate: after a short ambient
//! calibration period it waits for the signal to rise above the ambient
//! threshold, collects samples until a configured run of silence, and hands
//! the finished phrase to the consumer over a channel. This is the moral
//! equivalent of a blocking `listen()` call with ambient-noise adjustment;
//! everything smarter than that is the transcription service's job.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfig;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::config::AudioConfig;
use crate::error::Error;

/// Samples per gate decision.
const CHUNK: usize = 512;

/// Ratio applied to the measured ambient energy to get the speech threshold.
const AMBIENT_RATIO: f32 = 1.5;

/// Lower bound on the threshold so a dead-silent room still gates properly.
const THRESHOLD_FLOOR: f32 = 0.01;

/// Mean absolute amplitude of a chunk, normalized to `0.0..=1.0`.
fn chunk_energy(chunk: &[i16]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum: f32 = chunk
        .iter()
        .map(|&s| (s as f32 / i16::MAX as f32).abs())
        .sum();
    sum / chunk.len() as f32
}

#[derive(Debug, PartialEq)]
enum GateState {
    Calibrating,
    Waiting,
    Talking,
}

/// Energy-gate state machine, fed fixed-size chunks of mono samples.
///
/// Kept free of any audio-device concerns so the gating behavior is unit
/// testable with synthetic signals.
struct PhraseGate {
    state: GateState,
    threshold: f32,
    calibration_chunks: usize,
    silence_chunks: usize,
    limit_samples: usize,
    calibration_energies: Vec<f32>,
    silence_run: usize,
    phrase: Vec<i16>,
    // One chunk of pre-roll so phrase onsets are not clipped.
    preroll: Vec<i16>,
}

impl PhraseGate {
    fn new(sample_rate: u32, config: &AudioConfig) -> Self {
        let chunks_per_sec = sample_rate as f32 / CHUNK as f32;
        let calibration_chunks =
            ((config.calibration_secs * chunks_per_sec).ceil() as usize).max(1);
        let silence_chunks = ((config.silence_duration * chunks_per_sec).ceil() as usize).max(1);
        let limit_samples =
            ((config.phrase_time_limit * sample_rate as f32) as usize).max(CHUNK);
        Self {
            state: GateState::Calibrating,
            threshold: THRESHOLD_FLOOR,
            calibration_chunks,
            silence_chunks,
            limit_samples,
            calibration_energies: Vec::new(),
            silence_run: 0,
            phrase: Vec::new(),
            preroll: Vec::new(),
        }
    }

    /// Feeds one chunk; returns a finished phrase when one completes.
    fn push_chunk(&mut self, chunk: &[i16]) -> Option<Vec<i16>> {
        let energy = chunk_energy(chunk);
        match self.state {
            GateState::Calibrating => {
                self.calibration_energies.push(energy);
                if self.calibration_energies.len() >= self.calibration_chunks {
                    let ambient = self.calibration_energies.iter().sum::<f32>()
                        / self.calibration_energies.len() as f32;
                    self.threshold = (ambient * AMBIENT_RATIO).max(THRESHOLD_FLOOR);
                    self.calibration_energies.clear();
                    self.state = GateState::Waiting;
                    info!("Microphone calibrated, energy threshold {:.4}", self.threshold);
                }
                None
            }
            GateState::Waiting => {
                if energy > self.threshold {
                    debug!("Speech detected");
                    self.phrase.clear();
                    self.phrase.extend_from_slice(&self.preroll);
                    self.phrase.extend_from_slice(chunk);
                    self.silence_run = 0;
                    self.state = GateState::Talking;
                } else {
                    self.preroll.clear();
                    self.preroll.extend_from_slice(chunk);
                }
                None
            }
            GateState::Talking => {
                self.phrase.extend_from_slice(chunk);
                if energy > self.threshold {
                    self.silence_run = 0;
                } else {
                    self.silence_run += 1;
                }
                if self.silence_run >= self.silence_chunks || self.phrase.len() >= self.limit_samples
                {
                    debug!("Speech finished ({} samples)", self.phrase.len());
                    self.state = GateState::Waiting;
                    self.silence_run = 0;
                    self.preroll.clear();
                    return Some(std::mem::take(&mut self.phrase));
                }
                None
            }
        }
    }
}

/// Continuous microphone listener that yields one phrase at a time.
pub struct PhraseListener {
    // Held for its Drop side effect; the callback feeds the channel.
    _stream: cpal::Stream,
    rx: UnboundedReceiver<Vec<i16>>,
    sample_rate: u32,
}

impl PhraseListener {
    /// Opens the input device and starts capturing immediately.
    ///
    /// Fails with [`Error::AudioDevice`] when no usable microphone exists;
    /// that is a fatal condition for every front-end.
    pub fn new(config: &AudioConfig) -> Result<Self, Error> {
        let host = cpal::default_host();
        debug!("Available hosts: {:?}", cpal::available_hosts());
        debug!("Default host: {:?}", host.id());

        let devices = host
            .input_devices()
            .map_err(|e| Error::AudioDevice(e.to_string()))?;
        let names: HashSet<_> = devices.into_iter().flat_map(|d| d.name()).collect();
        debug!("Available input devices: {names:?}");

        let mut devices = host
            .input_devices()
            .map_err(|e| Error::AudioDevice(e.to_string()))?;
        // Find the requested device or use default
        let device = if let Some(device_name) = &config.device {
            devices
                .find(|d| d.name().map(|n| n == *device_name).unwrap_or(false))
                .ok_or_else(|| {
                    Error::AudioDevice(format!(
                        "Requested audio device '{}' not found, available: {:?}",
                        device_name, names
                    ))
                })?
        } else {
            host.default_input_device()
                .ok_or_else(|| Error::AudioDevice("No default input device found".to_string()))?
        };

        info!(
            "Using input device: {}",
            device.name().map_err(|e| Error::AudioDevice(e.to_string()))?
        );

        // Try to find a supported configuration that matches what we want
        let stream_config = device
            .supported_input_configs()
            .ok()
            .and_then(|supported_configs| {
                let sample_rate = cpal::SampleRate(config.sample_rate);
                supported_configs
                    .filter(|range| {
                        range.min_sample_rate() <= sample_rate
                            && range.max_sample_rate() >= sample_rate
                            && range.channels() == config.channels
                            && range.sample_format() == cpal::SampleFormat::I16
                    })
                    .map(|range| range.with_sample_rate(sample_rate))
                    .next()
            });

        // If we can't find an exact match, use the desired config anyway
        let stream_config = stream_config.unwrap_or_else(|| {
            warn!("No exact match for the requested format, forcing it. It might not work");
            SupportedStreamConfig::new(
                config.channels,
                cpal::SampleRate(config.sample_rate),
                cpal::SupportedBufferSize::Unknown,
                cpal::SampleFormat::I16,
            )
        });
        debug!("Using stream config: {:?}", stream_config);

        let sample_rate = stream_config.sample_rate().0;
        let channels = stream_config.channels() as usize;
        let (tx, rx) = unbounded_channel();
        let mut gate = PhraseGate::new(sample_rate, config);
        // Partial chunk carried between callbacks.
        let mut pending: Vec<i16> = Vec::with_capacity(CHUNK);

        let err_fn = move |err| {
            error!("Audio stream error: {}", err);
        };
        let stream = device
            .build_input_stream(
                &stream_config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    feed_samples(data, channels, &mut pending, &mut gate, &tx);
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioStream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| Error::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            rx,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Waits for the next complete phrase. Returns `None` if the stream died.
    pub async fn next_phrase(&mut self) -> Option<Vec<i16>> {
        self.rx.recv().await
    }
}

/// Downmixes to mono, chunks, and runs the gate; sends finished phrases.
fn feed_samples(
    data: &[i16],
    channels: usize,
    pending: &mut Vec<i16>,
    gate: &mut PhraseGate,
    tx: &UnboundedSender<Vec<i16>>,
) {
    if channels <= 1 {
        pending.extend_from_slice(data);
    } else {
        for frame in data.chunks_exact(channels) {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            pending.push((sum / channels as i32) as i16);
        }
    }
    while pending.len() >= CHUNK {
        let chunk: Vec<i16> = pending.drain(..CHUNK).collect();
        if let Some(phrase) = gate.push_chunk(&chunk) {
            if tx.send(phrase).is_err() {
                // Consumer is gone; nothing useful left to do in the callback.
                error!("Phrase receiver dropped");
            }
        }
    }
}
