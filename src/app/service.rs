use super::types::{DetectionCommand, LifecycleAction};
use crate::analyzer::EngineMessage;
use crate::coordinator::{DetectionCoordinator, DetectionStatus, SensorReport};
use crate::error::{KioskcamError, Result};
use crate::events::{DetectionEvent, EventBus, EventFilter, EventReceiver};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const SERVICE_NAME: &str = "detection_service";

/// Runs a [`DetectionCoordinator`] on its own task.
///
/// That task is the only place the coordinator is touched: commands from
/// [`DetectionHandle`]s and messages from the engines' background work are
/// applied one at a time, in arrival order.
pub struct DetectionService;

impl DetectionService {
    pub fn spawn(
        coordinator: DetectionCoordinator,
        command_capacity: usize,
        cancellation_token: CancellationToken,
    ) -> Result<(DetectionHandle, JoinHandle<()>)> {
        let mut coordinator = coordinator;
        let inbox = coordinator
            .take_inbox()
            .ok_or_else(|| KioskcamError::system("Coordinator inbox already taken"))?;

        let (command_tx, command_rx) = mpsc::channel(command_capacity);
        let handle = DetectionHandle {
            commands: command_tx,
            status: coordinator.subscribe_status(),
            event_bus: coordinator.event_bus().clone(),
        };

        let task = tokio::spawn(run_service(
            coordinator,
            inbox,
            command_rx,
            cancellation_token,
        ));

        Ok((handle, task))
    }
}

async fn run_service(
    mut coordinator: DetectionCoordinator,
    mut inbox: mpsc::UnboundedReceiver<EngineMessage>,
    mut commands: mpsc::Receiver<DetectionCommand>,
    cancellation_token: CancellationToken,
) {
    info!("Detection service started");

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!("Detection service cancelled");
                break;
            }
            Some(command) = commands.recv() => {
                apply_command(&mut coordinator, command).await;
            }
            Some(message) = inbox.recv() => {
                coordinator.handle_message(message).await;
            }
            else => break,
        }
    }

    coordinator.stop().await;
    info!("Detection service stopped");
}

async fn apply_command(coordinator: &mut DetectionCoordinator, command: DetectionCommand) {
    match command {
        DetectionCommand::Lifecycle(action, done) => {
            debug!("Applying {:?}", action);
            match action {
                LifecycleAction::Start => coordinator.start().await,
                LifecycleAction::Stop => coordinator.stop().await,
                LifecycleAction::Restart => coordinator.restart().await,
                LifecycleAction::EnablePrivacyMode => coordinator.enable_privacy_mode().await,
                LifecycleAction::DisablePrivacyMode => coordinator.disable_privacy_mode().await,
                LifecycleAction::UpdateSensitivity => coordinator.update_sensitivity(),
            }
            let _ = done.send(());
        }
        DetectionCommand::RequestAuthorization(reply) => {
            let granted = coordinator.request_authorization().await;
            let _ = reply.send(granted);
        }
        DetectionCommand::SensorReports(reply) => {
            let _ = reply.send(coordinator.sensor_reports());
        }
    }
}

/// Cloneable front end to a running [`DetectionService`]
#[derive(Clone)]
pub struct DetectionHandle {
    commands: mpsc::Sender<DetectionCommand>,
    status: watch::Receiver<DetectionStatus>,
    event_bus: EventBus,
}

impl DetectionHandle {
    pub async fn start(&self) -> Result<()> {
        self.lifecycle(LifecycleAction::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.lifecycle(LifecycleAction::Stop).await
    }

    pub async fn restart(&self) -> Result<()> {
        self.lifecycle(LifecycleAction::Restart).await
    }

    pub async fn enable_privacy_mode(&self) -> Result<()> {
        self.lifecycle(LifecycleAction::EnablePrivacyMode).await
    }

    pub async fn disable_privacy_mode(&self) -> Result<()> {
        self.lifecycle(LifecycleAction::DisablePrivacyMode).await
    }

    pub async fn update_sensitivity(&self) -> Result<()> {
        self.lifecycle(LifecycleAction::UpdateSensitivity).await
    }

    /// Resolves once the user has answered any permission prompt
    pub async fn request_authorization(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(DetectionCommand::RequestAuthorization(tx)).await?;
        rx.await.map_err(|_| service_gone())
    }

    pub async fn sensor_reports(&self) -> Result<Vec<SensorReport>> {
        let (tx, rx) = oneshot::channel();
        self.send(DetectionCommand::SensorReports(tx)).await?;
        rx.await.map_err(|_| service_gone())
    }

    /// Latest published status
    pub fn status(&self) -> DetectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DetectionStatus> {
        self.status.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<DetectionEvent> {
        self.event_bus.subscribe()
    }

    pub fn filtered_events(&self, filter: EventFilter, name: &str) -> EventReceiver {
        self.event_bus.subscribe_filtered(filter, name)
    }

    async fn lifecycle(&self, action: LifecycleAction) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(DetectionCommand::Lifecycle(action, tx)).await?;
        rx.await.map_err(|_| service_gone())
    }

    async fn send(&self, command: DetectionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| service_gone())
    }
}

fn service_gone() -> KioskcamError {
    KioskcamError::component(SERVICE_NAME, "coordinating task is not running")
}
