use crate::config::{CameraConfig, CameraPosition};
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Frames buffered between a capture backend and its consumer. Backends drop
/// new frames once this many are waiting.
pub const FRAME_QUEUE_DEPTH: usize = 2;

/// Platform camera permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    #[default]
    NotDetermined,
    Denied,
    Restricted,
    Authorized,
}

impl AuthorizationState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationState::Authorized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationState::NotDetermined => "not_determined",
            AuthorizationState::Denied => "denied",
            AuthorizationState::Restricted => "restricted",
            AuthorizationState::Authorized => "authorized",
        }
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture resolution class requested by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreset {
    /// Motion scoring
    Low,
    /// Person and face inference
    Medium,
}

/// Parameters of a capture session handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSessionConfig {
    pub preset: ResolutionPreset,
    pub resolution: (u32, u32),
    pub fps: u32,
    pub position: CameraPosition,
    pub device_index: u32,
}

impl CaptureSessionConfig {
    /// Resolve a preset against the configured camera
    pub fn for_preset(camera: &CameraConfig, preset: ResolutionPreset, fps: u32) -> Self {
        let resolution = match preset {
            ResolutionPreset::Low => camera.low_resolution,
            ResolutionPreset::Medium => camera.medium_resolution,
        };

        Self {
            preset,
            resolution,
            fps,
            position: camera.position,
            device_index: camera.device_index,
        }
    }
}

/// Source of capture sessions and camera permission
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Query the current permission state without prompting
    fn authorization_status(&self) -> AuthorizationState;

    /// Prompt for camera access; suspends until the prompt resolves
    async fn request_access(&self) -> bool;

    /// Open a capture pipeline delivering frames at the requested preset
    async fn open_session(
        &self,
        config: CaptureSessionConfig,
    ) -> Result<Box<dyn CaptureSession>, CameraError>;
}

/// An open video input pipeline, owned by exactly one engine
#[async_trait]
pub trait CaptureSession: Send {
    fn id(&self) -> Uuid;

    fn config(&self) -> &CaptureSessionConfig;

    /// Hand out the frame receiver. Only the first call returns it.
    fn take_frames(&mut self) -> Option<mpsc::Receiver<FrameData>>;

    /// Tear the pipeline down; frame delivery ends
    async fn close(&mut self);
}
