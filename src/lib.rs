pub mod analyzer;
pub mod app;
pub mod camera;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod frame;
pub mod settings;
pub mod timer;

pub use analyzer::{
    DetectionSignal, DetectorKind, EngineKind, EngineMessage, MotionDetectionEngine, MotionState,
    PresenceInferenceEngine, PresenceState, Region, RegionDetector,
};
pub use app::{ComponentState, DetectionHandle, DetectionService, KioskcamOrchestrator, ShutdownReason};
pub use camera::{
    AuthorizationState, CameraProvider, CaptureSession, CaptureSessionConfig, MockCameraProvider,
    ResolutionPreset,
};
pub use config::KioskcamConfig;
pub use coordinator::{
    DetectionCoordinator, DetectionCoordinatorBuilder, DetectionObserver, DetectionStatus,
    IdleController, LoggingIdleController, SensorReport,
};
pub use error::{KioskcamError, Result};
pub use events::{DetectionEvent, EventBus, EventFilter, EventReceiver};
pub use frame::{FrameData, FrameFormat};
pub use settings::{MotionSensitivity, SettingsProvider, SettingsSnapshot, SharedSettings};
pub use timer::{CancellableTimer, TimerFired, TimerKind};

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use camera::GStreamerCameraProvider;
