use super::service::DetectionHandle;
use super::types::{ComponentState, ShutdownReason};
use crate::camera::CameraProvider;
use crate::config::KioskcamConfig;
use crate::coordinator::{DetectionCoordinator, DetectionObserver, IdleController};
use crate::error::Result;
use crate::settings::SharedSettings;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Main application coordinator that owns the detection service lifecycle
pub struct KioskcamOrchestrator {
    pub(super) config: KioskcamConfig,
    pub(super) settings: SharedSettings,

    // Components
    pub(super) coordinator: Option<DetectionCoordinator>,
    pub(super) handle: Option<DetectionHandle>,
    pub(super) service_task: Option<JoinHandle<()>>,
    pub(super) activity_log_task: Option<JoinHandle<()>>,

    // Lifecycle management
    pub(super) component_states: Mutex<HashMap<&'static str, ComponentState>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl KioskcamOrchestrator {
    /// Assemble the coordinator around the given camera backend and idle sink
    pub fn new(
        config: KioskcamConfig,
        camera: Arc<dyn CameraProvider>,
        idle: Arc<dyn IdleController>,
    ) -> Result<Self> {
        let settings = SharedSettings::new(config.detection);
        let coordinator = DetectionCoordinator::builder(config.clone())
            .camera(camera)
            .settings(Arc::new(settings.clone()))
            .idle_controller(idle)
            .build()?;
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            settings,
            coordinator: Some(coordinator),
            handle: None,
            service_task: None,
            activity_log_task: None,
            component_states: Mutex::new(HashMap::new()),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Settings store the settings UI writes to
    pub fn settings(&self) -> SharedSettings {
        self.settings.clone()
    }

    /// Register an observer; only possible before `start`
    pub fn add_observer(&mut self, observer: Arc<dyn DetectionObserver>) -> bool {
        match self.coordinator.as_mut() {
            Some(coordinator) => {
                coordinator.add_observer(observer);
                true
            }
            None => false,
        }
    }

    /// Handle to the running service, once started
    pub fn handle(&self) -> Option<DetectionHandle> {
        self.handle.clone()
    }

    /// Request a shutdown from inside the process
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        send_shutdown(&self.shutdown_sender, reason)
    }

    pub fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().get(component).cloned()
    }

    pub(super) fn set_component_state(&self, component: &'static str, state: ComponentState) {
        debug!("Component '{}' -> {:?}", component, state);
        self.component_states.lock().insert(component, state);
    }
}

/// Deliver the first shutdown reason; later ones are dropped
pub(super) fn send_shutdown(
    sender: &Mutex<Option<oneshot::Sender<ShutdownReason>>>,
    reason: ShutdownReason,
) -> bool {
    match sender.lock().take() {
        Some(sender) => sender.send(reason).is_ok(),
        None => false,
    }
}
