//! Unified detection state, observer fan-out and wake/keep-alive side effects

mod manager;
mod sensors;
mod sinks;
mod status;


pub use manager::{DetectionCoordinator, DetectionCoordinatorBuilder};
pub use sensors::{
    motion_sensor_attributes, motion_sensor_state, presence_sensor_attributes,
    presence_sensor_state, sensor_reports, SensorReport, MOTION_SENSOR_ID, PRESENCE_SENSOR_ID,
};
pub use sinks::{IdleController, LoggingIdleController};
pub use status::{DetectionObserver, DetectionStatus};
