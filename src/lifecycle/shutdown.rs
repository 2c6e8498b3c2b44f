//! Shutdown trigger: OS signals raced against an external cancellation token.
//!
//! Exactly one source resolves [`ShutdownTrigger::wait`]; the other is
//! dropped and has no further effect.

use std::future::Future;
use std::io;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::signals::ShutdownSignals;

/// What ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// An OS signal, by name.
    Signal(&'static str),
    /// The external token was cancelled.
    Cancelled,
}

pub struct ShutdownTrigger {
    signal: Option<BoxFuture<'static, &'static str>>,
    token: CancellationToken,
}

impl ShutdownTrigger {
    /// Arm the trigger. Signal handlers are installed only when
    /// `listen_for_signals` is set; the token is always watched.
    pub fn arm(listen_for_signals: bool, token: CancellationToken) -> io::Result<Self> {
        let signal = if listen_for_signals {
            let signals = ShutdownSignals::register()?;
            Some(Box::pin(signals.recv()) as BoxFuture<'static, &'static str>)
        } else {
            None
        };
        Ok(Self { signal, token })
    }

    /// Use `signal` in place of OS signals.
    pub fn from_future<F>(signal: F, token: CancellationToken) -> Self
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        Self {
            signal: Some(Box::pin(signal)),
            token,
        }
    }

    /// Wait for the first of the two sources.
    pub async fn wait(self) -> Trigger {
        let Self { signal, token } = self;
        let signal = async move {
            match signal {
                Some(signal) => signal.await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            name = signal => {
                tracing::info!(signal = name, "Received signal");
                Trigger::Signal(name)
            }
            _ = token.cancelled() => {
                tracing::info!("Context cancelled");
                Trigger::Cancelled
            }
        }
    }
}

impl std::fmt::Debug for ShutdownTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownTrigger")
            .field("signals", &self.signal.is_some())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
