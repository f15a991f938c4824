//! Web front-end: use a browser's microphone from any device.
//!
//! One embedded page plus two JSON endpoints. The page records audio in the
//! browser and posts it to `/transcribe` as multipart form data; the body is
//! expected to be raw 16 kHz, 16-bit, mono PCM (the page takes care of
//! that). `/history` returns everything this process has accepted.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use log::{error, info};
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::RecognizeError;
use crate::recognize::Recognizer;
use crate::transcript::{Transcription, TranscriptLog};

/// Uploads are raw PCM with fixed assumptions, matching the embedded page.
const UPLOAD_SAMPLE_RATE: u32 = 16_000;

/// Shared state behind the three routes.
#[derive(Clone)]
pub struct AppState {
    recognizer: Arc<Recognizer>,
    transcript: Arc<TranscriptLog>,
    history: Arc<Mutex<Vec<Transcription>>>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            recognizer: Arc::new(Recognizer::new(&config.recognizer)?),
            transcript: Arc::new(
                TranscriptLog::new(&config.paths.transcript).context("Opening transcript file")?,
            ),
            history: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/transcribe", post(transcribe))
        .route("/history", get(history))
        .with_state(state)
}

/// Binds the server and runs it until Ctrl+C.
pub async fn run(config: &Config) -> Result<()> {
    let state = AppState::new(config)?;
    let app = router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Binding {addr}"))?;

    println!();
    println!("{}", "=".repeat(60));
    println!("  WEB VOICE TERMINAL");
    println!("{}", "=".repeat(60));
    println!();
    println!("Open in your browser:");
    println!("   http://localhost:{}", config.server.port);
    println!();
    println!("Use your browser's microphone to transcribe speech.");
    println!("Transcriptions appear both in the browser AND this terminal.");
    println!();
    println!("Press Ctrl+C to stop");
    info!("Serving on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Receives audio from the browser and transcribes it.
async fn transcribe(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut audio: Option<Vec<u8>> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("audio") {
            audio = field.bytes().await.ok().map(|b| b.to_vec());
            break;
        }
    }
    let Some(bytes) = audio else {
        return error_response(StatusCode::BAD_REQUEST, "No audio data received");
    };

    let samples = pcm16_from_bytes(&bytes);
    match state
        .recognizer
        .recognize(&samples, UPLOAD_SAMPLE_RATE)
        .await
    {
        Ok(text) => {
            let transcription = Transcription::now(text);
            if let Err(err) = state.transcript.append(&transcription) {
                error!("Could not save transcription: {err:#}");
            }
            if let Ok(mut history) = state.history.lock() {
                history.push(transcription.clone());
            }
            println!("\n{}", transcription.log_line());
            Json(json!({
                "success": true,
                "text": transcription.text,
                "timestamp": transcription.timestamp,
            }))
            .into_response()
        }
        Err(RecognizeError::NoSpeech) => {
            error_response(StatusCode::BAD_REQUEST, "Could not understand audio")
        }
        Err(err) => {
            error!("Transcription failed: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Service error: {err}"),
            )
        }
    }
}

/// Returns the transcription history accumulated by this process.
async fn history(State(state): State<AppState>) -> Json<Vec<Transcription>> {
    let history = state
        .history
        .lock()
        .map(|h| h.clone())
        .unwrap_or_default();
    Json(history)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Interprets an upload as little-endian 16-bit mono PCM.
fn pcm16_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Web Voice Terminal</title>
<style>
  body { font-family: monospace; background: #111; color: #ddd; max-width: 640px; margin: 2rem auto; padding: 0 1rem; }
  h1 { color: #8f8; font-size: 1.2rem; }
  button { font-family: inherit; font-size: 1rem; padding: 0.5rem 1.5rem; margin-right: 0.5rem; cursor: pointer; }
  #status { margin: 1rem 0; color: #888; }
  .entry { border-left: 2px solid #8f8; padding-left: 0.5rem; margin: 0.5rem 0; }
  .entry .ts { color: #888; }
  .error { color: #f88; }
</style>
</head>
<body>
<h1>WEB VOICE TERMINAL</h1>
<button id="start">Start recording</button>
<button id="stop" disabled>Stop &amp; transcribe</button>
<div id="status">Ready.</div>
<div id="log"></div>
<script>
const SAMPLE_RATE = 16000;
let audioContext = null;
let source = null;
let processor = null;
let stream = null;
let chunks = [];

const statusEl = document.getElementById("status");
const logEl = document.getElementById("log");
const startBtn = document.getElementById("start");
const stopBtn = document.getElementById("stop");

function addEntry(timestamp, text, isError) {
  const div = document.createElement("div");
  div.className = isError ? "entry error" : "entry";
  div.innerHTML = '<span class="ts">[' + timestamp + ']</span> ' + text;
  logEl.prepend(div);
}

startBtn.onclick = async () => {
  try {
    stream = await navigator.mediaDevices.getUserMedia({ audio: true });
  } catch (e) {
    statusEl.textContent = "Microphone access denied: " + e;
    return;
  }
  audioContext = new AudioContext({ sampleRate: SAMPLE_RATE });
  source = audioContext.createMediaStreamSource(stream);
  processor = audioContext.createScriptProcessor(4096, 1, 1);
  chunks = [];
  processor.onaudioprocess = (e) => {
    chunks.push(new Float32Array(e.inputBuffer.getChannelData(0)));
  };
  source.connect(processor);
  processor.connect(audioContext.destination);
  startBtn.disabled = true;
  stopBtn.disabled = false;
  statusEl.textContent = "Recording... speak now.";
};

stopBtn.onclick = async () => {
  processor.disconnect();
  source.disconnect();
  stream.getTracks().forEach((t) => t.stop());
  await audioContext.close();
  startBtn.disabled = false;
  stopBtn.disabled = true;
  statusEl.textContent = "Transcribing...";

  const total = chunks.reduce((n, c) => n + c.length, 0);
  const pcm = new Int16Array(total);
  let offset = 0;
  for (const chunk of chunks) {
    for (let i = 0; i < chunk.length; i++) {
      const s = Math.max(-1, Math.min(1, chunk[i]));
      pcm[offset++] = s < 0 ? s * 0x8000 : s * 0x7fff;
    }
  }

  const form = new FormData();
  form.append("audio", new Blob([pcm.buffer]), "audio.pcm");
  try {
    const resp = await fetch("/transcribe", { method: "POST", body: form });
    const data = await resp.json();
    if (resp.ok && data.success) {
      addEntry(data.timestamp, data.text, false);
      statusEl.textContent = "Ready.";
    } else {
      addEntry(new Date().toLocaleTimeString(), data.error || "unknown error", true);
      statusEl.textContent = "Ready.";
    }
  } catch (e) {
    statusEl.textContent = "Request failed: " + e;
  }
};

(async () => {
  const resp = await fetch("/history");
  if (resp.ok) {
    for (const entry of await resp.json()) {
      addEntry(entry.timestamp, entry.text, false);
    }
  }
})();
</script>
</body>
</html>
"##;
