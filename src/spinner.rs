//! Terminal progress indicator shown while the completion request is in flight.
//!
//! The animation runs on its own tokio task. Stopping is two-phase: the owner
//! cancels the `done` token and then awaits the task's `JoinHandle`, so no frame
//! can be written after [`SpinnerHandle::stop`] returns.

use std::io::Write;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const MOON_FRAMES: &[&str] = &["🌑", "🌘", "🌗", "🌕", "🌔", "🌓", "🌒"];
pub const FRAME_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) const HIDE_CURSOR: &str = "\x1b[?25l";
pub(crate) const SHOW_CURSOR: &str = "\x1b[?25h";
pub(crate) const CLEAR_LINE: &str = "\r                      \r";

#[derive(Debug, Clone)]
pub struct Spinner {
    frames: &'static [&'static str],
    interval: Duration,
    enabled: bool,
}

impl Spinner {
    pub fn new(enabled: bool) -> Self {
        Self::with_frames(MOON_FRAMES, FRAME_INTERVAL, enabled)
    }

    pub fn with_frames(frames: &'static [&'static str], interval: Duration, enabled: bool) -> Self {
        Self {
            frames,
            interval,
            enabled: enabled && !frames.is_empty(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Starts animating on `writer` until the returned handle is stopped or
    /// `shutdown` is cancelled.
    pub fn start<W>(&self, writer: W, shutdown: CancellationToken) -> SpinnerHandle
    where
        W: Write + Send + 'static,
    {
        let done = CancellationToken::new();
        if !self.enabled {
            return SpinnerHandle { done, task: None };
        }

        let task = tokio::spawn(animate(
            writer,
            self.frames,
            self.interval,
            done.clone(),
            shutdown,
        ));
        SpinnerHandle {
            done,
            task: Some(task),
        }
    }
}

pub struct SpinnerHandle {
    done: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SpinnerHandle {
    /// Halts the animation and waits until the line has been cleared.
    pub async fn stop(self) {
        self.done.cancel();
        if let Some(task) = self.task
            && let Err(err) = task.await
        {
            debug!(error = %err, "spinner task ended abnormally");
        }
    }
}

async fn animate<W: Write>(
    mut writer: W,
    frames: &'static [&'static str],
    interval: Duration,
    done: CancellationToken,
    shutdown: CancellationToken,
) {
    let _ = writer.write_all(HIDE_CURSOR.as_bytes());
    let _ = writer.flush();

    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut index = 0;

    loop {
        tokio::select! {
            biased;
            _ = done.cancelled() => break,
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let _ = write!(writer, "\r{}", frames[index]);
                let _ = writer.flush();
                index = (index + 1) % frames.len();
            }
        }
    }

    let _ = writer.write_all(CLEAR_LINE.as_bytes());
    let _ = writer.write_all(SHOW_CURSOR.as_bytes());
    let _ = writer.flush();
}
