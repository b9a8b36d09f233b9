use super::status::DetectionStatus;
use crate::settings::SettingsSnapshot;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::SystemTime;

pub const MOTION_SENSOR_ID: &str = "kiosk_motion_detected";
pub const PRESENCE_SENSOR_ID: &str = "kiosk_presence_detected";

/// Binary sensor descriptor handed to the telemetry reporter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub unique_id: &'static str,
    pub name: &'static str,
    pub device_class: &'static str,
    pub icon: &'static str,
    pub state: &'static str,
    pub attributes: Map<String, Value>,
    pub entity_category: &'static str,
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn iso8601(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn motion_sensor_state(status: &DetectionStatus) -> &'static str {
    on_off(status.motion_detected)
}

pub fn presence_sensor_state(status: &DetectionStatus) -> &'static str {
    on_off(status.presence_detected)
}

pub fn motion_sensor_attributes(
    status: &DetectionStatus,
    settings: &SettingsSnapshot,
) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert(
        "detection_active".into(),
        Value::Bool(status.is_active && settings.motion_enabled),
    );
    attrs.insert(
        "sensitivity".into(),
        Value::String(settings.motion_sensitivity.as_str().to_string()),
    );

    if let Some(last) = status.last_motion_time {
        attrs.insert("last_motion".into(), Value::String(iso8601(last)));
    }

    attrs
}

pub fn presence_sensor_attributes(
    status: &DetectionStatus,
    settings: &SettingsSnapshot,
) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert(
        "detection_active".into(),
        Value::Bool(status.is_active && settings.presence_enabled),
    );
    attrs.insert(
        "face_detection_enabled".into(),
        Value::Bool(settings.face_detection_enabled),
    );

    if settings.face_detection_enabled {
        attrs.insert("face_detected".into(), Value::Bool(status.face_detected));
        attrs.insert("face_count".into(), Value::from(status.face_count));
    }

    if let Some(last) = status.last_presence_time {
        attrs.insert("last_presence".into(), Value::String(iso8601(last)));
    }

    attrs
}

/// Sensors to publish given the current settings
pub fn sensor_reports(status: &DetectionStatus, settings: &SettingsSnapshot) -> Vec<SensorReport> {
    let mut reports = Vec::new();

    if settings.motion_enabled && settings.report_motion {
        reports.push(SensorReport {
            unique_id: MOTION_SENSOR_ID,
            name: "Kiosk Motion",
            device_class: "motion",
            icon: if status.motion_detected {
                "mdi:motion-sensor"
            } else {
                "mdi:motion-sensor-off"
            },
            state: motion_sensor_state(status),
            attributes: motion_sensor_attributes(status, settings),
            entity_category: "diagnostic",
        });
    }

    if settings.presence_enabled && settings.report_presence {
        reports.push(SensorReport {
            unique_id: PRESENCE_SENSOR_ID,
            name: "Kiosk Presence",
            device_class: "occupancy",
            icon: if status.presence_detected {
                "mdi:account-check"
            } else {
                "mdi:account-off"
            },
            state: presence_sensor_state(status),
            attributes: presence_sensor_attributes(status, settings),
            entity_category: "diagnostic",
        });
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MotionSensitivity;
    use std::time::{Duration, UNIX_EPOCH};

    fn all_enabled() -> SettingsSnapshot {
        SettingsSnapshot {
            motion_enabled: true,
            presence_enabled: true,
            face_detection_enabled: true,
            motion_sensitivity: MotionSensitivity::High,
            ..SettingsSnapshot::default()
        }
    }

    #[test]
    fn test_motion_attributes() {
        let status = DetectionStatus {
            is_active: true,
            last_motion_time: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            ..DetectionStatus::default()
        };

        let attrs = motion_sensor_attributes(&status, &all_enabled());
        assert_eq!(attrs["detection_active"], Value::Bool(true));
        assert_eq!(attrs["sensitivity"], Value::String("high".into()));
        assert_eq!(
            attrs["last_motion"],
            Value::String("2023-11-14T22:13:20Z".into())
        );
    }

    #[test]
    fn test_presence_attributes_hide_faces_when_disabled() {
        let status = DetectionStatus {
            is_active: true,
            face_detected: true,
            face_count: 2,
            ..DetectionStatus::default()
        };

        let with_faces = presence_sensor_attributes(&status, &all_enabled());
        assert_eq!(with_faces["face_count"], Value::from(2));
        assert_eq!(with_faces["face_detected"], Value::Bool(true));
        assert!(!with_faces.contains_key("last_presence"));

        let settings = SettingsSnapshot {
            face_detection_enabled: false,
            ..all_enabled()
        };
        let without_faces = presence_sensor_attributes(&status, &settings);
        assert!(!without_faces.contains_key("face_count"));
        assert!(!without_faces.contains_key("face_detected"));
        assert_eq!(without_faces["face_detection_enabled"], Value::Bool(false));
    }

    #[test]
    fn test_detection_active_requires_coordinator_active() {
        let status = DetectionStatus::default();
        let attrs = motion_sensor_attributes(&status, &all_enabled());
        assert_eq!(attrs["detection_active"], Value::Bool(false));
    }

    #[test]
    fn test_sensor_reports_follow_flags() {
        let status = DetectionStatus {
            presence_detected: true,
            ..DetectionStatus::default()
        };

        let reports = sensor_reports(&status, &all_enabled());
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].unique_id, MOTION_SENSOR_ID);
        assert_eq!(reports[0].icon, "mdi:motion-sensor-off");
        assert_eq!(reports[0].state, "off");
        assert_eq!(reports[1].device_class, "occupancy");
        assert_eq!(reports[1].icon, "mdi:account-check");
        assert_eq!(reports[1].state, "on");

        let settings = SettingsSnapshot {
            report_motion: false,
            ..all_enabled()
        };
        let reports = sensor_reports(&status, &settings);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "Kiosk Presence");

        // face detection alone does not publish a presence sensor
        let face_only = SettingsSnapshot {
            face_detection_enabled: true,
            ..SettingsSnapshot::default()
        };
        assert!(sensor_reports(&status, &face_only).is_empty());
    }
}
