//! Error types for voxd.
//!
//! This module defines the custom error types used throughout the application.
//! It uses the `thiserror` crate to derive error implementations and provides
//! convenient conversions from common error types.

use thiserror::Error;

/// Outcome of a transcription request that did not produce text.
///
/// The two variants mirror the two ways a recognition attempt fails in
/// practice: the service answered but heard nothing usable, or the request
/// itself failed. Callers treat them very differently (skip vs. back off),
/// so they are kept as a dedicated enum rather than folded into [`Error`].
#[derive(Error, Debug)]
pub enum RecognizeError {
    /// The service returned no usable text for the submitted audio.
    #[error("could not understand audio")]
    NoSpeech,

    /// The request to the transcription service failed (transport, HTTP
    /// status, or an unparseable response body).
    #[error("transcription service error: {0}")]
    Service(String),
}

/// Failure modes when injecting text into the focused window.
#[derive(Error, Debug)]
pub enum InjectError {
    /// The injection tool could not be spawned.
    #[error("failed to launch {0}: {1}")]
    Launch(String, String),

    /// The injection tool ran but exited with a non-zero status.
    #[error("{0} exited with status {1}")]
    Failed(String, String),

    /// The injection tool did not finish within the configured timeout.
    #[error("injection tool timed out")]
    Timeout,

    /// Neither the primary nor the fallback tool is installed.
    #[error("no injection tool available (tried {0} and {1})")]
    MissingTools(String, String),
}

/// Custom error type for the voxd application.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to audio device initialization or configuration
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// Error related to audio stream operation
    #[error("Audio stream error: {0}")]
    AudioStream(String),

    /// Error related to the remote transcription service
    #[error(transparent)]
    Recognize(#[from] RecognizeError),

    /// Error related to keystroke injection
    #[error(transparent)]
    Inject(#[from] InjectError),

    /// Error related to daemon lifecycle management
    #[error("Daemon error: {0}")]
    Daemon(String),

    /// Error related to file system operations
    #[error("File system error: {0}")]
    FileSystem(String),

    /// Error related to application configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::FileSystem(err.to_string())
    }
}
