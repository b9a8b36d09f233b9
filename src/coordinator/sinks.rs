use tracing::{debug, info};

/// External idle/display controller. Both calls are fire-and-forget.
pub trait IdleController: Send + Sync {
    /// Wake the display
    fn request_wake(&self, source: &str);

    /// Reset the idle countdown
    fn record_activity(&self, source: &str);
}

/// Idle controller for running standalone; logs each request
#[derive(Debug, Default, Clone)]
pub struct LoggingIdleController;

impl IdleController for LoggingIdleController {
    fn request_wake(&self, source: &str) {
        info!("Wake requested (source: {})", source);
    }

    fn record_activity(&self, source: &str) {
        debug!("Activity recorded (source: {})", source);
    }
}
