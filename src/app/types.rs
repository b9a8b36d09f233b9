use crate::coordinator::SensorReport;
use tokio::sync::oneshot;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// Coordinator operations that take no input and return nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    Restart,
    EnablePrivacyMode,
    DisablePrivacyMode,
    UpdateSensitivity,
}

/// Requests carried to the coordinating task
#[derive(Debug)]
pub(crate) enum DetectionCommand {
    Lifecycle(LifecycleAction, oneshot::Sender<()>),
    RequestAuthorization(oneshot::Sender<bool>),
    SensorReports(oneshot::Sender<Vec<SensorReport>>),
}
