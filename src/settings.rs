use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Motion detection sensitivity selected in the kiosk settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionSensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl MotionSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionSensitivity::Low => "low",
            MotionSensitivity::Medium => "medium",
            MotionSensitivity::High => "high",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MotionSensitivity::Low => "Low",
            MotionSensitivity::Medium => "Medium",
            MotionSensitivity::High => "High",
        }
    }
}

impl fmt::Display for MotionSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the detection settings owned by the kiosk settings UI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Run the frame-difference motion engine
    #[serde(default)]
    pub motion_enabled: bool,

    /// Run human-region inference
    #[serde(default)]
    pub presence_enabled: bool,

    /// Run face-region inference
    #[serde(default)]
    pub face_detection_enabled: bool,

    #[serde(default)]
    pub motion_sensitivity: MotionSensitivity,

    /// Ask the idle controller to wake the screen on motion
    #[serde(default)]
    pub wake_on_motion: bool,

    /// Ask the idle controller to wake the screen on presence and keep it awake
    #[serde(default)]
    pub wake_on_presence: bool,

    /// Publish the motion binary sensor to the telemetry reporter
    #[serde(default = "default_report")]
    pub report_motion: bool,

    /// Publish the presence binary sensor to the telemetry reporter
    #[serde(default = "default_report")]
    pub report_presence: bool,
}

fn default_report() -> bool {
    true
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            motion_enabled: false,
            presence_enabled: false,
            face_detection_enabled: false,
            motion_sensitivity: MotionSensitivity::Medium,
            wake_on_motion: false,
            wake_on_presence: false,
            report_motion: default_report(),
            report_presence: default_report(),
        }
    }
}

impl SettingsSnapshot {
    /// Whether any camera detection feature is switched on
    pub fn any_detection_enabled(&self) -> bool {
        self.motion_enabled || self.presence_enabled || self.face_detection_enabled
    }

    /// Whether the presence engine has work to do
    pub fn presence_engine_enabled(&self) -> bool {
        self.presence_enabled || self.face_detection_enabled
    }
}

/// Polled accessor for the current settings
pub trait SettingsProvider: Send + Sync {
    fn snapshot(&self) -> SettingsSnapshot;
}

/// Settings store shared between the settings UI and the detection core
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<SettingsSnapshot>>,
}

impl SharedSettings {
    pub fn new(initial: SettingsSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Replace the whole snapshot
    pub fn replace(&self, snapshot: SettingsSnapshot) {
        *self.inner.write() = snapshot;
        debug!("Detection settings replaced: {:?}", snapshot);
    }

    /// Mutate the snapshot in place
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SettingsSnapshot),
    {
        let mut guard = self.inner.write();
        f(&mut guard);
        debug!("Detection settings updated: {:?}", *guard);
    }
}

impl SettingsProvider for SharedSettings {
    fn snapshot(&self) -> SettingsSnapshot {
        *self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_disables_detection() {
        let snapshot = SettingsSnapshot::default();
        assert!(!snapshot.any_detection_enabled());
        assert!(!snapshot.presence_engine_enabled());
        assert_eq!(snapshot.motion_sensitivity, MotionSensitivity::Medium);
        assert!(snapshot.report_motion);
        assert!(snapshot.report_presence);
    }

    #[test]
    fn test_face_detection_alone_enables_presence_engine() {
        let snapshot = SettingsSnapshot {
            face_detection_enabled: true,
            ..SettingsSnapshot::default()
        };
        assert!(snapshot.presence_engine_enabled());
        assert!(snapshot.any_detection_enabled());
    }

    #[test]
    fn test_shared_settings_update_is_visible_to_readers() {
        let settings = SharedSettings::default();
        let reader = settings.clone();

        settings.update(|s| {
            s.motion_enabled = true;
            s.motion_sensitivity = MotionSensitivity::High;
        });

        let snapshot = reader.snapshot();
        assert!(snapshot.motion_enabled);
        assert_eq!(snapshot.motion_sensitivity, MotionSensitivity::High);
    }

    #[test]
    fn test_sensitivity_serializes_lowercase() {
        let json = serde_json::to_string(&MotionSensitivity::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: MotionSensitivity = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, MotionSensitivity::Low);
    }
}
