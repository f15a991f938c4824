//! The transcription record and the append-only transcript file.
//!
//! Every front-end produces the same single entity: a `(timestamp, text)`
//! pair appended to a flat text file as `[HH:MM:SS] text`. The web front-end
//! additionally keeps records in memory for its history endpoint.

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A single recognized phrase with the wall-clock time it was produced.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Transcription {
    /// Local time formatted as `HH:MM:SS`
    pub timestamp: String,
    /// Recognized text
    pub text: String,
}

impl Transcription {
    /// Creates a record stamped with the current local time.
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            text: text.into(),
        }
    }

    /// The transcript file representation: `[HH:MM:SS] text`.
    pub fn log_line(&self) -> String {
        format!("[{}] {}", self.timestamp, self.text)
    }
}

/// Append-only transcript file.
///
/// Lines are appended in the order transcriptions arrive; nothing is ever
/// rewritten or removed.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    path: PathBuf,
}

impl TranscriptLog {
    /// Opens a transcript log at `path`, creating parent directories.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Creating transcript directory {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a single line.
    pub fn append(&self, transcription: &Transcription) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!("Opening transcript file {}", self.path.display()))?;
        writeln!(file, "{}", transcription.log_line())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_line_format() {
        let t = Transcription {
            timestamp: "12:34:56".to_string(),
            text: "hello world".to_string(),
        };
        assert_eq!(t.log_line(), "[12:34:56] hello world");
    }

    #[test]
    fn test_now_timestamp_shape() {
        let t = Transcription::now("hi");
        // HH:MM:SS
        assert_eq!(t.timestamp.len(), 8);
        assert_eq!(t.timestamp.as_bytes()[2], b':');
        assert_eq!(t.timestamp.as_bytes()[5], b':');
    }

    #[test]
    fn test_append_one_line_per_transcription() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transcriptions.txt");
        let log = TranscriptLog::new(&path).unwrap();

        log.append(&Transcription {
            timestamp: "01:02:03".to_string(),
            text: "first".to_string(),
        })
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "[01:02:03] first\n");
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transcriptions.txt");
        let log = TranscriptLog::new(&path).unwrap();

        for (ts, text) in [("01:00:00", "one"), ("01:00:05", "two"), ("01:00:09", "three")] {
            log.append(&Transcription {
                timestamp: ts.to_string(),
                text: text.to_string(),
            })
            .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[01:00:00] one",
                "[01:00:05] two",
                "[01:00:09] three",
            ]
        );
    }

    #[test]
    fn test_new_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("t.txt");
        let log = TranscriptLog::new(&path).unwrap();
        log.append(&Transcription::now("x")).unwrap();
        assert!(path.exists());
    }
}
