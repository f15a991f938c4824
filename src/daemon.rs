//! Voice-to-keyboard daemon: listen in the background, type into the
//! focused window.
//!
//! Classic fork/PID-file/signal lifecycle: `start` detaches from the
//! controlling terminal and redirects stdio to the daemon log, `stop` sends
//! SIGTERM to the recorded PID, `status` probes liveness with a null signal.
//! The termination signal only sets a flag; the loop notices it between
//! blocking calls, never mid-transcription.

use anyhow::{Context, Result, bail};
use log::{error, info};
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::audio::PhraseListener;
use crate::config::{Config, DaemonConfig};
use crate::inject::Injector;
use crate::recognize::Recognizer;

/// Set from the signal handler, read between blocking calls in the loop.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// What the PID file says about a previous daemon instance.
#[derive(Debug, PartialEq)]
pub enum DaemonState {
    /// No PID file (or an unreadable one)
    NotRunning,
    /// PID file present and the process is alive
    Running(i32),
    /// PID file present but the process is gone
    Stale(i32),
}

/// Reads the PID file and probes the recorded process.
pub fn daemon_state(pid_file: &Path) -> DaemonState {
    match read_pid(pid_file) {
        None => DaemonState::NotRunning,
        Some(pid) if pid_alive(pid) => DaemonState::Running(pid),
        Some(pid) => DaemonState::Stale(pid),
    }
}

fn read_pid(pid_file: &Path) -> Option<i32> {
    let contents = std::fs::read_to_string(pid_file).ok()?;
    contents.trim().parse().ok()
}

/// Null-signal liveness probe, the PID-file idiom.
fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Sends SIGTERM; false when the signal could not be delivered.
fn send_term(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

/// Removes the PID file when the daemon loop exits, however it exits.
struct PidGuard {
    path: PathBuf,
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Starts the daemon, forking to the background.
///
/// The parent process prints where the daemon went and exits; only the
/// detached child returns into the capture loop. Refuses to start when a
/// live instance is recorded in the PID file.
pub fn start(config: &Config) -> Result<()> {
    match daemon_state(&config.daemon.pid_file) {
        DaemonState::Running(pid) => {
            bail!("Daemon already running (PID {pid})");
        }
        DaemonState::Stale(pid) => {
            info!("Removing stale PID file (PID {pid} is gone)");
            std::fs::remove_file(&config.daemon.pid_file)
                .context("Removing stale PID file")?;
        }
        DaemonState::NotRunning => {}
    }

    daemonize(&config.daemon)?;

    // Only the detached child gets here.
    let pid = std::process::id();
    std::fs::write(&config.daemon.pid_file, format!("{pid}\n"))
        .context("Writing PID file")?;
    let _pid_guard = PidGuard {
        path: config.daemon.pid_file.clone(),
    };

    let handler = on_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }

    info!("Daemon started (PID {pid})");
    let runtime = tokio::runtime::Runtime::new().context("Creating tokio runtime")?;
    let result = runtime.block_on(run_loop(config));
    info!("Daemon exiting");
    result
}

/// Detaches from the controlling terminal.
///
/// Fork, let the parent exit after printing the usual hints, then start a
/// new session, move to `/`, clear the umask, and point stdin at /dev/null
/// and stdout/stderr at the daemon log.
fn daemonize(config: &DaemonConfig) -> Result<()> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        bail!("Fork failed: {}", std::io::Error::last_os_error());
    }
    if pid > 0 {
        // Parent
        println!("Daemon started (PID {pid})");
        println!("Logs: {}", config.log_file.display());
        println!("Stop: voxd daemon stop");
        std::process::exit(0);
    }

    unsafe {
        if libc::setsid() < 0 {
            bail!("setsid failed: {}", std::io::Error::last_os_error());
        }
        libc::umask(0);
    }
    std::env::set_current_dir("/").context("chdir to / failed")?;

    let devnull = File::open("/dev/null").context("Opening /dev/null")?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .context(format!("Opening daemon log {}", config.log_file.display()))?;
    unsafe {
        if libc::dup2(devnull.as_raw_fd(), libc::STDIN_FILENO) < 0
            || libc::dup2(log.as_raw_fd(), libc::STDOUT_FILENO) < 0
            || libc::dup2(log.as_raw_fd(), libc::STDERR_FILENO) < 0
        {
            bail!("stdio redirect failed: {}", std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// The daemon loop: capture, recognize, type.
async fn run_loop(config: &Config) -> Result<()> {
    info!("Adjusting for ambient noise...");
    let mut listener =
        PhraseListener::new(&config.audio).context("Could not access microphone")?;
    let recognizer = Recognizer::new(&config.recognizer)?;
    let injector = Injector::new(&config.injection);
    info!("Ready - listening for voice input...");

    while !SHUTDOWN.load(Ordering::SeqCst) {
        let phrase = tokio::select! {
            phrase = listener.next_phrase() => match phrase {
                Some(phrase) => phrase,
                None => {
                    error!("Audio stream closed");
                    break;
                }
            },
            // Periodic wakeup so the shutdown flag is noticed while idle.
            _ = tokio::time::sleep(Duration::from_millis(500)) => continue,
        };

        match recognizer.recognize(&phrase, listener.sample_rate()).await {
            Ok(text) => match injector.type_text(&text).await {
                Ok(()) => info!("Typed: {text}"),
                // Missing tool or tool failure: log, no retry.
                Err(err) => error!("Injection failed: {err}"),
            },
            Err(crate::error::RecognizeError::NoSpeech) => {
                // Couldn't understand - just skip silently
            }
            Err(err) => {
                error!("API error: {err}");
                tokio::time::sleep(Duration::from_secs(config.daemon.retry_backoff_secs)).await;
            }
        }
    }

    info!("Received shutdown signal, stopping");
    Ok(())
}

/// Stops a running daemon by signalling the recorded PID.
pub fn stop(config: &DaemonConfig) -> Result<()> {
    match daemon_state(&config.pid_file) {
        DaemonState::NotRunning => {
            println!("Daemon not running");
        }
        DaemonState::Running(pid) => {
            // The process can die between the liveness probe and here.
            if send_term(pid) {
                println!("Daemon stopped (PID {pid})");
            } else {
                println!("Daemon not running (stale PID file)");
            }
            let _ = std::fs::remove_file(&config.pid_file);
        }
        DaemonState::Stale(_) => {
            println!("Daemon not running (stale PID file)");
            let _ = std::fs::remove_file(&config.pid_file);
        }
    }
    Ok(())
}

/// Reports daemon liveness and shows recent log activity.
pub fn status(config: &DaemonConfig) -> Result<()> {
    match daemon_state(&config.pid_file) {
        DaemonState::NotRunning => {
            println!("Daemon not running");
        }
        DaemonState::Running(pid) => {
            println!("Daemon running (PID {pid})");
            println!("Logs: {}", config.log_file.display());
            match tail_lines(&config.log_file, 5) {
                Ok(lines) if !lines.is_empty() => {
                    println!("\nRecent activity:");
                    for line in lines {
                        println!("{line}");
                    }
                }
                Ok(_) => {}
                Err(err) => println!("(could not read log: {err:#})"),
            }
        }
        DaemonState::Stale(_) => {
            println!("Daemon not running (stale PID file)");
            let _ = std::fs::remove_file(&config.pid_file);
        }
    }
    Ok(())
}

/// Stops any running instance, waits a beat, and starts a fresh one.
pub fn restart(config: &Config) -> Result<()> {
    stop(&config.daemon)?;
    std::thread::sleep(Duration::from_secs(1));
    start(config)
}

/// Last `n` lines of a text file.
fn tail_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pid_alive_self() {
        assert!(pid_alive(std::process::id() as i32));
    }

    #[test]
    fn test_pid_alive_bogus() {
        assert!(!pid_alive(i32::MAX));
        assert!(!pid_alive(0));
        assert!(!pid_alive(-5));
    }

    #[test]
    fn test_daemon_state_no_pid_file() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("voxd.pid");
        assert_eq!(daemon_state(&pid_file), DaemonState::NotRunning);
    }

    #[test]
    fn test_daemon_state_running() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("voxd.pid");
        std::fs::write(&pid_file, format!("{}\n", std::process::id())).unwrap();
        assert_eq!(
            daemon_state(&pid_file),
            DaemonState::Running(std::process::id() as i32)
        );
    }

    #[test]
    fn test_daemon_state_stale() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("voxd.pid");
        std::fs::write(&pid_file, format!("{}\n", i32::MAX)).unwrap();
        assert_eq!(daemon_state(&pid_file), DaemonState::Stale(i32::MAX));
    }

    #[test]
    fn test_daemon_state_garbage_pid_file() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("voxd.pid");
        std::fs::write(&pid_file, "not a pid").unwrap();
        assert_eq!(daemon_state(&pid_file), DaemonState::NotRunning);
    }

    #[test]
    fn test_status_removes_stale_pid_file() {
        let dir = tempdir().unwrap();
        let config = DaemonConfig {
            pid_file: dir.path().join("voxd.pid"),
            log_file: dir.path().join("voxd.log"),
            retry_backoff_secs: 1,
        };
        std::fs::write(&config.pid_file, format!("{}\n", i32::MAX)).unwrap();
        status(&config).unwrap();
        assert!(!config.pid_file.exists());
    }

    #[test]
    fn test_send_term_dead_pid_reports_failure() {
        assert!(!send_term(i32::MAX));
        assert!(!send_term(0));
        assert!(!send_term(-5));
    }

    #[test]
    fn test_stop_signals_recorded_pid_and_removes_file() {
        use std::os::unix::process::ExitStatusExt;

        let dir = tempdir().unwrap();
        let config = DaemonConfig {
            pid_file: dir.path().join("voxd.pid"),
            log_file: dir.path().join("voxd.log"),
            retry_backoff_secs: 1,
        };

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        std::fs::write(&config.pid_file, format!("{}\n", child.id())).unwrap();

        stop(&config).unwrap();
        assert!(!config.pid_file.exists());

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[test]
    fn test_stop_when_not_running_is_ok() {
        let dir = tempdir().unwrap();
        let config = DaemonConfig {
            pid_file: dir.path().join("voxd.pid"),
            log_file: dir.path().join("voxd.log"),
            retry_backoff_secs: 1,
        };
        stop(&config).unwrap();
    }

    #[test]
    fn test_tail_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        std::fs::write(&path, "a\nb\nc\nd\ne\nf\n").unwrap();
        assert_eq!(tail_lines(&path, 5).unwrap(), vec!["b", "c", "d", "e", "f"]);
        assert_eq!(tail_lines(&path, 100).unwrap().len(), 6);
    }

    #[test]
    fn test_pid_guard_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voxd.pid");
        std::fs::write(&path, "123\n").unwrap();
        {
            let _guard = PidGuard { path: path.clone() };
        }
        assert!(!path.exists());
    }
}
