//! Shutdown signal handling
//!
//! Handlers are registered when [`ShutdownSignals::install`] returns, not
//! when the future is first polled, so a signal that arrives while the
//! startup claim is still running is held until the loop looks for it.

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

pub struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolve on the first SIGINT or SIGTERM
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("SIGNAL: SIGINT received"),
            _ = self.terminate.recv() => info!("SIGNAL: SIGTERM received"),
        }
    }
}
