use super::service::DetectionService;
use super::{ComponentState, KioskcamOrchestrator};
use crate::error::{EventBusError, KioskcamError, Result};
use crate::events::{DetectionEvent, EventFilter};
use tracing::{debug, error, info, warn};

pub(super) const SERVICE_COMPONENT: &str = "detection_service";
pub(super) const ACTIVITY_LOG_COMPONENT: &str = "activity_log";

impl KioskcamOrchestrator {
    /// Spawn the coordinating task and start detection with the current
    /// settings
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting Kioskcam detection");

        let coordinator = self
            .coordinator
            .take()
            .ok_or_else(|| KioskcamError::system("Detection service already started"))?;

        self.set_component_state(SERVICE_COMPONENT, ComponentState::Starting);

        let (handle, task) = DetectionService::spawn(
            coordinator,
            self.config.system.command_channel_capacity,
            self.cancellation_token.child_token(),
        )
        .map_err(|e| {
            self.set_component_state(SERVICE_COMPONENT, ComponentState::Failed);
            error!("Failed to spawn detection service: {}", e);
            e
        })?;
        self.service_task = Some(task);

        let mut activity = handle.filtered_events(
            EventFilter::EventTypes(vec![
                "wake_requested",
                "activity_recorded",
                "authorization_changed",
                "engine_error",
            ]),
            ACTIVITY_LOG_COMPONENT,
        );
        let token = self.cancellation_token.child_token();
        self.activity_log_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = activity.recv() => match event {
                        Ok(DetectionEvent::ActivityRecorded { source, .. }) => {
                            debug!("Idle timer reset by {}", source);
                        }
                        Ok(event) => info!("{}", event.description()),
                        Err(EventBusError::ChannelClosed) => break,
                        Err(e) => warn!("Activity log: {}", e),
                    },
                }
            }
        }));
        self.set_component_state(ACTIVITY_LOG_COMPONENT, ComponentState::Running);

        handle.start().await?;
        self.handle = Some(handle);
        self.set_component_state(SERVICE_COMPONENT, ComponentState::Running);

        info!("Kioskcam detection started");
        Ok(())
    }
}
