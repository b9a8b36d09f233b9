use super::startup::{ACTIVITY_LOG_COMPONENT, SERVICE_COMPONENT};
use super::{ComponentState, KioskcamOrchestrator};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl KioskcamOrchestrator {
    /// Cancel background work and wait for the coordinator to stop its engines.
    /// Returns the process exit code.
    pub async fn shutdown(&mut self) -> crate::error::Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();
        self.handle = None;

        let mut exit_code = 0;

        let service_task = self.service_task.take();
        if !self.stop_component(SERVICE_COMPONENT, service_task).await {
            exit_code = 1;
        }

        let activity_task = self.activity_log_task.take();
        if !self.stop_component(ACTIVITY_LOG_COMPONENT, activity_task).await {
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&self, component: &'static str, task: Option<JoinHandle<()>>) -> bool {
        let Some(task) = task else {
            self.set_component_state(component, ComponentState::Stopped);
            return true;
        };

        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping);

        match timeout(STOP_TIMEOUT, task).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped);
                info!("{} component stopped", component);
                true
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed);
                error!("{} component task failed: {}", component, e);
                false
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed);
                error!("{} component stop timeout", component);
                false
            }
        }
    }
}
