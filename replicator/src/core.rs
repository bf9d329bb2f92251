use std::sync::Arc;

use config::shared::ReplicatorConfig;
use etl::concurrency::shutdown::create_shutdown_channel;
use etl::pipeline::ReplicationSession;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

/// Connects a session for `config` and runs its replication until it finishes or the process
/// is asked to stop.
pub async fn start_replicator_with_config(config: ReplicatorConfig) -> anyhow::Result<()> {
    info!(table = %config.table, mode = %config.mode, workspace = %config.workspace, "starting replicator");

    install_crypto_provider();

    let config = Arc::new(config);
    let session = ReplicationSession::connect(&config).await?;
    let pipeline = session.into_pipeline(config.clone())?;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let shutdown_handle = tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler, only ctrl+c stops the replication");
                let _ = tokio::signal::ctrl_c().await;
                let _ = shutdown_tx.shutdown();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down replication");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down replication");
            }
        }

        if let Err(err) = shutdown_tx.shutdown() {
            warn!(error = ?err, "failed to send shutdown signal");
        }
    });

    let result = pipeline.run(shutdown_rx).await;

    // The replication may finish on its own, in which case the signal listener is still waiting.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    pipeline.close().await;
    result?;

    info!("replicator stopped");

    Ok(())
}

fn install_crypto_provider() {
    // Fails when a provider was installed already, which is fine.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
