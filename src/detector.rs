use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::{SerialConfig, constants};
use crate::error::WatchError;
use crate::printer::LineSource;

/// Shared flag asking a running watcher to stop.
///
/// Clones share the same flag, so one clone can live in a signal handler
/// while the watcher holds another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    finished: AtomicBool,
}

/// What an interrupt (Ctrl+C) should do at this point of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The watcher is still waiting and will stop at its next poll.
    StopWatching,
    /// Nothing is listening for cancellation any more; exit the process.
    Terminate,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The watcher stops at its next poll.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Mark the watch phase as over. Later interrupts terminate.
    pub fn finish(&self) {
        self.state.finished.store(true, Ordering::SeqCst);
    }

    /// Handle an interrupt request.
    ///
    /// The first interrupt during the watch cancels it. A second interrupt, or
    /// any interrupt after [`CancelToken::finish`], asks for termination.
    pub fn interrupt(&self) -> Interrupt {
        if self.state.finished.load(Ordering::SeqCst)
            || self.state.cancelled.swap(true, Ordering::SeqCst)
        {
            Interrupt::Terminate
        } else {
            Interrupt::StopWatching
        }
    }
}

/// The serial line that carried the completion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionLine {
    /// Line text with the trailing line terminator removed.
    pub text: String,
    /// Number of lines read, including this one.
    pub lines_read: u64,
}

/// Print completion detection on the printer's serial output.
///
/// Reads the line stream one line at a time and stops at the first line that
/// contains the marker. After every other line the pending input is
/// discarded, so only fresh output from the printer is inspected.
#[derive(Debug, Clone)]
pub struct CompletionWatcher {
    marker: String,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl CompletionWatcher {
    /// Create a watcher for `marker` with no deadline and its own cancel token.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            timeout: None,
            cancel: CancelToken::new(),
        }
    }

    /// Create a watcher from the serial section of the configuration.
    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(config.marker.clone()).with_timeout(config.timeout)
    }

    /// Give up with [`WatchError::TimedOut`] once `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use `token` to stop the watcher from another thread.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether `line` signals the end of the print.
    pub fn is_completion_line(&self, line: &str) -> bool {
        line.contains(&self.marker)
    }

    /// Block until a line containing the marker is read from `source`.
    ///
    /// # Errors
    ///
    /// - [`WatchError::Cancelled`] if the cancel token fires
    /// - [`WatchError::TimedOut`] if the configured timeout elapses
    /// - [`WatchError::Disconnected`] if the stream ends
    /// - [`WatchError::Io`] on any other read or reset failure
    pub fn wait_for_completion<S>(&self, source: &mut S) -> Result<CompletionLine, WatchError>
    where
        S: LineSource + ?Sized,
    {
        let started = Instant::now();
        let mut pending = Vec::new();
        let mut lines_read: u64 = 0;

        info!("Waiting for '{}' on the serial line", self.marker);

        loop {
            if self.cancel.is_cancelled() {
                return Err(WatchError::Cancelled);
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    return Err(WatchError::TimedOut { after: limit });
                }
            }

            match source.read_line_into(&mut pending) {
                Ok(0) if pending.is_empty() => return Err(WatchError::Disconnected),
                Ok(_) => {}
                Err(e) if is_poll_timeout(&e) => continue,
                Err(e) => return Err(WatchError::Io(e)),
            }

            lines_read += 1;
            if pending.len() >= constants::MAX_LINE_BYTES && !pending.ends_with(b"\n") {
                warn!(
                    "Dropping {} bytes without a line break (baud rate mismatch?)",
                    pending.len()
                );
                pending.clear();
                source.discard_input()?;
                continue;
            }

            let text = String::from_utf8_lossy(&pending)
                .trim_end_matches(['\r', '\n'])
                .to_string();
            pending.clear();

            if self.is_completion_line(&text) {
                info!("{} found in: {}", self.marker, text);
                return Ok(CompletionLine { text, lines_read });
            }

            debug!("serial: {}", text);
            source.discard_input()?;
        }
    }
}

fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_matches_anywhere_in_the_line() {
        let watcher = CompletionWatcher::new("M31");
        assert!(watcher.is_completion_line("ok T:200 M31 done"));
        assert!(watcher.is_completion_line("M31"));
        assert!(watcher.is_completion_line("echo:M31 Print time: 1h 2m"));
        assert!(!watcher.is_completion_line("ok T:200"));
        assert!(!watcher.is_completion_line("m31"));
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let watcher = CompletionWatcher::new("M31").with_cancel_token(token.clone());
        assert!(!watcher.cancel_token().is_cancelled());
        token.cancel();
        assert!(watcher.cancel_token().is_cancelled());
    }

    #[test]
    fn interrupts_cancel_the_watch_then_terminate() {
        let token = CancelToken::new();
        assert_eq!(token.interrupt(), Interrupt::StopWatching);
        assert!(token.is_cancelled());
        assert_eq!(token.interrupt(), Interrupt::Terminate);
    }

    #[test]
    fn interrupts_after_the_watch_terminate() {
        let token = CancelToken::new();
        token.finish();
        assert_eq!(token.clone().interrupt(), Interrupt::Terminate);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn poll_timeouts_are_not_fatal() {
        assert!(is_poll_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_poll_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_poll_timeout(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }
}
