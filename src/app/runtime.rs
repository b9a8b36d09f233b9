use super::orchestrator::send_shutdown;
use super::{KioskcamOrchestrator, ShutdownReason};
use crate::error::{KioskcamError, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

impl KioskcamOrchestrator {
    /// Run until a signal or an in-process shutdown request, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Kioskcam is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| KioskcamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| KioskcamError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Kioskcam shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self) {
        #[cfg(unix)]
        {
            let shutdown_sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_shutdown(&shutdown_sender, ShutdownReason::Signal("SIGTERM".into()));
                }
            });
        }

        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(&shutdown_sender, ShutdownReason::Signal("SIGINT".into()));
            }
        });
    }
}
