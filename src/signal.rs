use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Error;

/// Process shutdown request raised by SIGINT/SIGTERM.
///
/// Components that must tidy up (the spinner, the in-flight request) observe
/// `token()`; the signal name is kept for the final report.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    signal: Arc<OnceLock<&'static str>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The first signal wins; later triggers only re-cancel.
    pub fn trigger(&self, signal: &'static str) {
        let _ = self.signal.set(signal);
        self.token.cancel();
    }

    pub fn signal(&self) -> Option<&'static str> {
        self.signal.get().copied()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Fails with [`Error::Interrupted`] once a signal has arrived.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_triggered() {
            return Err(self.interrupted());
        }
        Ok(())
    }

    pub fn interrupted(&self) -> Error {
        Error::Interrupted {
            signal: self.signal().unwrap_or("unknown"),
        }
    }

    /// Spawns the listener. Keep the returned handle alive for as long as a
    /// signal must turn into [`Error::Interrupted`]; aborting it leaves tokio's
    /// handler installed and later signals are dropped.
    pub fn listen(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            if let Some(signal) = wait_for_signal().await {
                warn!(signal, "received termination signal");
                shutdown.trigger(signal);
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            None
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => Some("SIGINT"),
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGINT");
                None
            }
        },
        Some(_) = async {
            match terminate.as_mut() {
                Some(stream) => stream.recv().await,
                None => std::future::pending().await,
            }
        } => Some("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<&'static str> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some("SIGINT"),
        Err(err) => {
            warn!(error = %err, "failed to listen for Ctrl+C");
            None
        }
    }
}
