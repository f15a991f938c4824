//! Remote speech recognition client.
//!
//! All transcription is delegated to an OpenAI-compatible
//! `audio/transcriptions` endpoint: phrases are WAV-encoded in memory and
//! posted as multipart form data, and the service's `{"text": ...}` reply is
//! the transcription. An empty reply means the service heard nothing usable,
//! which callers treat as a skip rather than a failure.

use log::debug;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;

use crate::config::RecognizerConfig;
use crate::error::RecognizeError;

/// Environment variable consulted when no API key is configured.
const API_KEY_ENV: &str = "VOXD_API_KEY";

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for the remote transcription service.
pub struct Recognizer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    language: Option<String>,
}

impl Recognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self, RecognizeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RecognizeError::Service(e.to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok());
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }

    /// Submits one phrase of mono PCM samples and returns the recognized text.
    pub async fn recognize(
        &self,
        samples: &[i16],
        sample_rate: u32,
    ) -> Result<String, RecognizeError> {
        let wav = wav_bytes(samples, sample_rate)
            .map_err(|e| RecognizeError::Service(format!("wav encoding: {e}")))?;
        debug!("Submitting {} samples ({} bytes)", samples.len(), wav.len());

        let part = Part::bytes(wav)
            .file_name("phrase.wav")
            .mime_str("audio/wav")
            .map_err(|e| RecognizeError::Service(e.to_string()))?;
        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecognizeError::Service(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RecognizeError::Service(e.to_string()))?;
        if !status.is_success() {
            return Err(RecognizeError::Service(format!("{status}: {body}")));
        }

        parse_response(&body)
    }
}

/// Extracts the transcription from a service reply.
///
/// Empty or whitespace-only text maps to [`RecognizeError::NoSpeech`]; the
/// endpoint has no dedicated status code for "nothing understood".
fn parse_response(body: &str) -> Result<String, RecognizeError> {
    let parsed: TranscriptionResponse = serde_json::from_str(body)
        .map_err(|e| RecognizeError::Service(format!("unexpected response: {e}")))?;
    let text = parsed.text.trim();
    if text.is_empty() {
        return Err(RecognizeError::NoSpeech);
    }
    Ok(text.to_string())
}

/// Encodes mono PCM samples as a 16-bit WAV in memory.
pub fn wav_bytes(samples: &[i16], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
