use crate::camera::AuthorizationState;
use serde::Serialize;
use std::time::SystemTime;

/// Unified sensor-facing state published by the coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionStatus {
    /// Some detection feature is enabled and not stopped
    pub is_active: bool,
    pub motion_detected: bool,
    pub presence_detected: bool,
    pub face_detected: bool,
    pub face_count: usize,
    pub authorization_status: AuthorizationState,
    pub last_motion_time: Option<SystemTime>,
    pub last_presence_time: Option<SystemTime>,
    pub motion_level: f32,
    /// Last device or session failure, for diagnostic display only
    pub error_message: Option<String>,
}

/// Callback hooks, always invoked on the coordinating task
pub trait DetectionObserver: Send + Sync {
    fn on_motion_detected(&self) {}

    fn on_presence_changed(&self, _present: bool) {}

    fn on_face_detection_changed(&self, _detected: bool, _count: usize) {}

    fn on_motion_level_changed(&self, _level: f32) {}
}
