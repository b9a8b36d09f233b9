use crate::settings::{MotionSensitivity, SettingsSnapshot};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct KioskcamConfig {
    pub camera: CameraConfig,
    pub motion: MotionConfig,
    pub presence: PresenceConfig,
    pub coordinator: CoordinatorConfig,
    /// Initial detection settings; the settings UI owns them afterwards
    pub detection: SettingsSnapshot,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub device_index: u32,

    /// Which camera to open; kiosks face the viewer
    #[serde(default)]
    pub position: CameraPosition,

    /// Resolution used for the low preset (motion)
    #[serde(default = "default_low_resolution")]
    pub low_resolution: (u32, u32),

    /// Resolution used for the medium preset (presence)
    #[serde(default = "default_medium_resolution")]
    pub medium_resolution: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MotionConfig {
    /// Capture frame rate for motion scoring
    #[serde(default = "default_motion_fps")]
    pub fps: u32,

    /// Score threshold for low sensitivity
    #[serde(default = "default_threshold_low")]
    pub threshold_low: f32,

    /// Score threshold for medium sensitivity
    #[serde(default = "default_threshold_medium")]
    pub threshold_medium: f32,

    /// Score threshold for high sensitivity
    #[serde(default = "default_threshold_high")]
    pub threshold_high: f32,

    /// Dead time after a trigger, in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PresenceConfig {
    /// Capture frame rate when face detection is enabled
    #[serde(default = "default_face_fps")]
    pub face_fps: u32,

    /// Capture frame rate for person detection only
    #[serde(default = "default_person_fps")]
    pub person_fps: u32,

    /// Consecutive positive frames needed to confirm presence
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: u32,

    /// Consecutive negative frames after which absence is suspected.
    /// Absence itself is only declared by the timeout.
    #[serde(default = "default_miss_threshold")]
    pub miss_threshold: u32,

    /// Time without a positive frame before presence is cleared, in milliseconds
    #[serde(default = "default_absence_timeout_ms")]
    pub absence_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Period of activity ticks while someone is present, in milliseconds
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Pending command capacity of the coordinating task
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    #[default]
    Front,
    Back,
}

impl CameraPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraPosition::Front => "front",
            CameraPosition::Back => "back",
        }
    }
}

impl MotionConfig {
    /// Map a sensitivity level to a score threshold; lower is more sensitive
    pub fn threshold_for(&self, sensitivity: MotionSensitivity) -> f32 {
        match sensitivity {
            MotionSensitivity::Low => self.threshold_low,
            MotionSensitivity::Medium => self.threshold_medium,
            MotionSensitivity::High => self.threshold_high,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl PresenceConfig {
    pub fn absence_timeout(&self) -> Duration {
        Duration::from_millis(self.absence_timeout_ms)
    }

    /// Capture rate for the presence session given the face detection flag
    pub fn fps_for(&self, face_detection_enabled: bool) -> u32 {
        if face_detection_enabled {
            self.face_fps
        } else {
            self.person_fps
        }
    }
}

impl CoordinatorConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}

impl KioskcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("kioskcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let low = default_low_resolution();
        let medium = default_medium_resolution();
        let detection = SettingsSnapshot::default();

        let settings = Config::builder()
            .set_default("camera.device_index", default_camera_index())?
            .set_default("camera.position", CameraPosition::default().as_str())?
            .set_default("camera.low_resolution", vec![low.0, low.1])?
            .set_default("camera.medium_resolution", vec![medium.0, medium.1])?
            .set_default("motion.fps", default_motion_fps())?
            .set_default("motion.threshold_low", default_threshold_low() as f64)?
            .set_default("motion.threshold_medium", default_threshold_medium() as f64)?
            .set_default("motion.threshold_high", default_threshold_high() as f64)?
            .set_default("motion.cooldown_ms", default_cooldown_ms())?
            .set_default("presence.face_fps", default_face_fps())?
            .set_default("presence.person_fps", default_person_fps())?
            .set_default("presence.detection_threshold", default_detection_threshold())?
            .set_default("presence.miss_threshold", default_miss_threshold())?
            .set_default("presence.absence_timeout_ms", default_absence_timeout_ms())?
            .set_default(
                "coordinator.keep_alive_interval_ms",
                default_keep_alive_interval_ms(),
            )?
            .set_default("detection.motion_enabled", detection.motion_enabled)?
            .set_default("detection.presence_enabled", detection.presence_enabled)?
            .set_default(
                "detection.face_detection_enabled",
                detection.face_detection_enabled,
            )?
            .set_default(
                "detection.motion_sensitivity",
                detection.motion_sensitivity.as_str(),
            )?
            .set_default("detection.wake_on_motion", detection.wake_on_motion)?
            .set_default("detection.wake_on_presence", detection.wake_on_presence)?
            .set_default("detection.report_motion", detection.report_motion)?
            .set_default("detection.report_presence", detection.report_presence)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.command_channel_capacity",
                default_command_channel_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // KIOSKCAM_MOTION__COOLDOWN_MS style overrides
            .add_source(
                Environment::with_prefix("KIOSKCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: KioskcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let resolutions = [
            ("low_resolution", self.camera.low_resolution),
            ("medium_resolution", self.camera.medium_resolution),
        ];
        for (name, (width, height)) in resolutions {
            if width == 0 || height == 0 {
                return Err(ConfigError::Message(format!(
                    "Camera {} must be greater than 0",
                    name
                )));
            }
        }

        if self.motion.fps == 0 || self.presence.face_fps == 0 || self.presence.person_fps == 0 {
            return Err(ConfigError::Message(
                "Capture fps must be greater than 0".to_string(),
            ));
        }

        let thresholds = [
            self.motion.threshold_low,
            self.motion.threshold_medium,
            self.motion.threshold_high,
        ];
        if thresholds.iter().any(|t| !(*t > 0.0 && *t < 1.0)) {
            return Err(ConfigError::Message(
                "Motion thresholds must be within (0, 1)".to_string(),
            ));
        }

        if !(self.motion.threshold_high < self.motion.threshold_medium
            && self.motion.threshold_medium < self.motion.threshold_low)
        {
            return Err(ConfigError::Message(
                "Motion thresholds must satisfy high < medium < low".to_string(),
            ));
        }

        if self.motion.cooldown_ms == 0 {
            return Err(ConfigError::Message(
                "Motion cooldown_ms must be greater than 0".to_string(),
            ));
        }

        if self.presence.detection_threshold == 0 {
            return Err(ConfigError::Message(
                "Presence detection_threshold must be greater than 0".to_string(),
            ));
        }

        if self.presence.absence_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Presence absence_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.coordinator.keep_alive_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Coordinator keep_alive_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 || self.system.command_channel_capacity == 0 {
            return Err(ConfigError::Message(
                "Channel capacities must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for KioskcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                device_index: default_camera_index(),
                position: CameraPosition::default(),
                low_resolution: default_low_resolution(),
                medium_resolution: default_medium_resolution(),
            },
            motion: MotionConfig {
                fps: default_motion_fps(),
                threshold_low: default_threshold_low(),
                threshold_medium: default_threshold_medium(),
                threshold_high: default_threshold_high(),
                cooldown_ms: default_cooldown_ms(),
            },
            presence: PresenceConfig {
                face_fps: default_face_fps(),
                person_fps: default_person_fps(),
                detection_threshold: default_detection_threshold(),
                miss_threshold: default_miss_threshold(),
                absence_timeout_ms: default_absence_timeout_ms(),
            },
            coordinator: CoordinatorConfig {
                keep_alive_interval_ms: default_keep_alive_interval_ms(),
            },
            detection: SettingsSnapshot::default(),
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                command_channel_capacity: default_command_channel_capacity(),
            },
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_low_resolution() -> (u32, u32) {
    (320, 240)
}
fn default_medium_resolution() -> (u32, u32) {
    (640, 480)
}

fn default_motion_fps() -> u32 {
    5
}
fn default_threshold_low() -> f32 {
    0.05
}
fn default_threshold_medium() -> f32 {
    0.02
}
fn default_threshold_high() -> f32 {
    0.008
}
fn default_cooldown_ms() -> u64 {
    2_000
}

fn default_face_fps() -> u32 {
    10
}
fn default_person_fps() -> u32 {
    3
}
fn default_detection_threshold() -> u32 {
    2
}
fn default_miss_threshold() -> u32 {
    5
}
fn default_absence_timeout_ms() -> u64 {
    10_000
}

fn default_keep_alive_interval_ms() -> u64 {
    5_000
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_command_channel_capacity() -> usize {
    32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = KioskcamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.motion.fps, 5);
        assert_eq!(config.presence.detection_threshold, 2);
        assert_eq!(config.presence.absence_timeout(), Duration::from_secs(10));
        assert_eq!(config.motion.cooldown(), Duration::from_secs(2));
        assert_eq!(
            config.coordinator.keep_alive_interval(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_sensitivity_threshold_mapping() {
        let motion = KioskcamConfig::default().motion;
        assert_eq!(motion.threshold_for(MotionSensitivity::Low), 0.05);
        assert_eq!(motion.threshold_for(MotionSensitivity::Medium), 0.02);
        assert_eq!(motion.threshold_for(MotionSensitivity::High), 0.008);
    }

    #[test]
    fn test_presence_fps_follows_face_flag() {
        let presence = KioskcamConfig::default().presence;
        assert_eq!(presence.fps_for(true), 10);
        assert_eq!(presence.fps_for(false), 3);
    }

    #[test]
    fn test_config_validation() {
        let mut config = KioskcamConfig::default();

        config.camera.low_resolution = (0, 240);
        assert!(config.validate().is_err());
        config.camera.low_resolution = (320, 240);

        config.motion.threshold_high = 0.03;
        assert!(config.validate().is_err());
        config.motion.threshold_high = 0.008;

        config.presence.detection_threshold = 0;
        assert!(config.validate().is_err());
        config.presence.detection_threshold = 2;

        config.coordinator.keep_alive_interval_ms = 0;
        assert!(config.validate().is_err());
        config.coordinator.keep_alive_interval_ms = 5_000;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[motion]
fps = 7
cooldown_ms = 1500

[detection]
motion_enabled = true
motion_sensitivity = "high"
wake_on_motion = true
"#
        )
        .unwrap();

        let config = KioskcamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.motion.fps, 7);
        assert_eq!(config.motion.cooldown_ms, 1500);
        assert_eq!(config.motion.threshold_medium, 0.02);
        assert!(config.detection.motion_enabled);
        assert!(config.detection.wake_on_motion);
        assert_eq!(config.detection.motion_sensitivity, MotionSensitivity::High);
        assert!(config.detection.report_presence);
        assert_eq!(config.presence.person_fps, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = KioskcamConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, KioskcamConfig::default());
    }

    #[test]
    fn test_toml_rendering() {
        let rendered = KioskcamConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[motion]"));
        assert!(rendered.contains("absence_timeout_ms = 10000"));
    }
}
