//! Typing-effect playback.
//!
//! Network arrival and on-screen reveal run on independent clocks: deltas are
//! appended to the raw buffer as soon as they arrive, while a single reveal
//! timer grows the displayed prefix by one character per tick.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Receives the displayed text on every reveal.
///
/// Called with the scheduler's buffer lock held, so reveals are delivered in
/// order. Implementations must not call back into the scheduler.
pub trait RevealTarget: Send + Sync + 'static {
    fn reveal(&self, displayed: &str);
}

impl<F> RevealTarget for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn reveal(&self, displayed: &str) {
        self(displayed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No tick scheduled; displayed has caught up with raw
    Idle,
    /// Reveal timer active
    Running,
    /// Stream ended and displayed was flushed to raw
    Finished,
}

struct RevealTimer {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

impl RevealTimer {
    fn cancel(self) {
        self.token.cancel();
    }
}

struct Buffers {
    raw: String,
    /// Byte length of the displayed prefix, always on a char boundary
    displayed_len: usize,
    state: PlaybackState,
    timer: Option<RevealTimer>,
}

impl Buffers {
    fn displayed(&self) -> &str {
        &self.raw[..self.displayed_len]
    }
}

pub struct PlaybackScheduler {
    interval: Duration,
    target: Arc<dyn RevealTarget>,
    buffers: Arc<Mutex<Buffers>>,
}

impl PlaybackScheduler {
    pub fn new(interval: Duration, target: Arc<dyn RevealTarget>) -> Self {
        Self {
            interval,
            target,
            buffers: Arc::new(Mutex::new(Buffers {
                raw: String::new(),
                displayed_len: 0,
                state: PlaybackState::Idle,
                timer: None,
            })),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Append arriving text. Starts the reveal timer when idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_delta(&self, text: &str) {
        if text.is_empty() {
            return;
        }

        let mut buffers = self.buffers.lock();
        if buffers.state == PlaybackState::Finished {
            debug!(len = text.len(), "delta after stream end ignored");
            return;
        }

        buffers.raw.push_str(text);

        if buffers.state == PlaybackState::Idle {
            buffers.state = PlaybackState::Running;
            let token = CancellationToken::new();
            let handle = tokio::spawn(run_reveal(
                self.interval,
                token.clone(),
                Arc::clone(&self.buffers),
                Arc::clone(&self.target),
            ));
            if let Some(previous) = buffers.timer.replace(RevealTimer {
                token,
                _handle: handle,
            }) {
                previous.cancel();
            }
        }
    }

    /// Stop the timer and flush: displayed becomes raw immediately.
    ///
    /// Returns the full raw text.
    pub fn on_stream_end(&self) -> String {
        let mut buffers = self.buffers.lock();
        if let Some(timer) = buffers.timer.take() {
            timer.cancel();
        }

        buffers.displayed_len = buffers.raw.len();
        buffers.state = PlaybackState::Finished;
        if !buffers.raw.is_empty() {
            self.target.reveal(buffers.displayed());
        }
        buffers.raw.clone()
    }

    /// Stop the timer without flushing. Safe to call any number of times.
    pub fn cancel(&self) {
        let mut buffers = self.buffers.lock();
        if let Some(timer) = buffers.timer.take() {
            timer.cancel();
        }
        if buffers.state == PlaybackState::Running {
            buffers.state = PlaybackState::Idle;
        }
    }

    pub fn raw_text(&self) -> String {
        self.buffers.lock().raw.clone()
    }

    pub fn displayed_text(&self) -> String {
        self.buffers.lock().displayed().to_string()
    }

    pub fn state(&self) -> PlaybackState {
        self.buffers.lock().state
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.buffers.lock().timer.take() {
            timer.cancel();
        }
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffers = self.buffers.lock();
        f.debug_struct("PlaybackScheduler")
            .field("interval", &self.interval)
            .field("state", &buffers.state)
            .field("raw_len", &buffers.raw.len())
            .field("displayed_len", &buffers.displayed_len)
            .finish()
    }
}

async fn run_reveal(
    interval: Duration,
    token: CancellationToken,
    buffers: Arc<Mutex<Buffers>>,
    target: Arc<dyn RevealTarget>,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let mut guard = buffers.lock();
        // cancelled between the wakeup and taking the lock
        if token.is_cancelled() || guard.state != PlaybackState::Running {
            return;
        }

        let step = guard.raw[guard.displayed_len..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(0);
        guard.displayed_len += step;
        target.reveal(guard.displayed());
        trace!(displayed = guard.displayed_len, raw = guard.raw.len(), "reveal tick");

        if guard.displayed_len >= guard.raw.len() {
            guard.state = PlaybackState::Idle;
            guard.timer = None;
            return;
        }
    }
}
