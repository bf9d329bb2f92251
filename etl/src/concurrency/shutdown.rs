use tokio::sync::watch;

use crate::concurrency::signal::{SignalRx, SignalTx, create_signal, wait_for_signal};

/// Triggers a graceful shutdown of a running replication.
#[derive(Debug, Clone)]
pub struct ShutdownTx(SignalTx);

impl ShutdownTx {
    pub fn wrap(tx: SignalTx) -> Self {
        Self(tx)
    }

    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

pub type ShutdownRx = SignalRx;

/// Returns `true` if a shutdown was requested since `rx` last observed the channel.
pub fn shutdown_requested(rx: &ShutdownRx) -> bool {
    rx.has_changed().unwrap_or(true)
}

/// Waits for the shutdown signal.
pub async fn wait_for_shutdown(rx: &mut ShutdownRx) {
    wait_for_signal(rx).await
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = create_signal();
    (ShutdownTx::wrap(tx), rx)
}
