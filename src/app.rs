//! Terminal front-end: speak and see your words appear in the terminal.
//!
//! A sequential loop over the shared building blocks: wait for a phrase,
//! submit it to the transcription service, print the result, and append it
//! to the transcript file. Ctrl+C ends the session with a short summary.

use anyhow::{Context, Result};
use log::{error, info};
use std::time::{Duration, Instant};

use crate::audio::PhraseListener;
use crate::config::Config;
use crate::recognize::Recognizer;
use crate::transcript::{Transcription, TranscriptLog};

/// Runs the interactive transcription loop until Ctrl+C.
pub async fn run(config: Config) -> Result<()> {
    println!();
    println!("{}", "=".repeat(60));
    println!("  VOICE-TO-TEXT TERMINAL");
    println!("{}", "=".repeat(60));
    println!();

    println!("Calibrating microphone for ambient noise...");
    let mut listener =
        PhraseListener::new(&config.audio).context("Could not access microphone")?;
    let recognizer = Recognizer::new(&config.recognizer)?;
    let transcript =
        TranscriptLog::new(&config.paths.transcript).context("Opening transcript file")?;

    println!("{}", "=".repeat(60));
    println!("  VOICE TERMINAL - Ready to listen!");
    println!("{}", "=".repeat(60));
    println!("- Speak clearly into your microphone");
    println!("- Press Ctrl+C to stop");

    let session_start = Instant::now();
    let mut transcription_count: u32 = 0;

    loop {
        println!("\nListening... (speak now)");
        let phrase = tokio::select! {
            phrase = listener.next_phrase() => match phrase {
                Some(phrase) => phrase,
                // Stream died; treat like an interrupt so the summary prints.
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        println!("Processing...");
        match recognizer.recognize(&phrase, listener.sample_rate()).await {
            Ok(text) => {
                let transcription = Transcription::now(text);
                transcription_count += 1;
                println!();
                println!(
                    "┌─ [{}] Transcription #{}",
                    transcription.timestamp, transcription_count
                );
                println!("│");
                println!("│  {}", transcription.text);
                println!("└─");
                if let Err(err) = transcript.append(&transcription) {
                    error!("Could not save transcription: {err:#}");
                }
            }
            Err(crate::error::RecognizeError::NoSpeech) => {
                println!("Could not understand audio - please speak more clearly");
            }
            Err(err) => {
                println!("Could not request results: {err}");
                tokio::time::sleep(Duration::from_secs(config.daemon.retry_backoff_secs)).await;
            }
        }
    }

    let elapsed = session_start.elapsed();
    println!("\n\n{}", "=".repeat(60));
    println!("  Session Summary");
    println!("{}", "=".repeat(60));
    println!(
        "Duration: {}m{}s",
        elapsed.as_secs() / 60,
        elapsed.as_secs() % 60
    );
    println!("Transcriptions: {transcription_count}");
    println!("Saved to: {}", transcript.path().display());
    println!("\nGoodbye!\n");
    info!("Session ended after {transcription_count} transcriptions");
    Ok(())
}
