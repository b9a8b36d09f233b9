use crate::camera::AuthorizationState;
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Notifications broadcast by the detection coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DetectionEvent {
    /// Sensor-facing state changed; reporters should re-read it
    SensorUpdate { timestamp: SystemTime },
    /// Debounced motion trigger
    MotionDetected { level: f32, timestamp: SystemTime },
    /// Confirmed presence or absence
    PresenceChanged { present: bool, timestamp: SystemTime },
    /// Face count or visibility changed
    FaceDetectionChanged {
        detected: bool,
        count: usize,
        timestamp: SystemTime,
    },
    /// Wake request sent to the idle controller
    WakeRequested { source: String, timestamp: SystemTime },
    /// Keep-alive activity sent to the idle controller
    ActivityRecorded { source: String, timestamp: SystemTime },
    /// Camera permission state changed
    AuthorizationChanged {
        status: AuthorizationState,
        timestamp: SystemTime,
    },
    /// Unified detection activity toggled
    DetectionStateChanged { active: bool, timestamp: SystemTime },
    /// An engine failed to start or lost its session
    EngineError { component: String, error: String },
}

impl DetectionEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            DetectionEvent::SensorUpdate { timestamp } => *timestamp,
            DetectionEvent::MotionDetected { timestamp, .. } => *timestamp,
            DetectionEvent::PresenceChanged { timestamp, .. } => *timestamp,
            DetectionEvent::FaceDetectionChanged { timestamp, .. } => *timestamp,
            DetectionEvent::WakeRequested { timestamp, .. } => *timestamp,
            DetectionEvent::ActivityRecorded { timestamp, .. } => *timestamp,
            DetectionEvent::AuthorizationChanged { timestamp, .. } => *timestamp,
            DetectionEvent::DetectionStateChanged { timestamp, .. } => *timestamp,
            DetectionEvent::EngineError { .. } => SystemTime::now(),
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            DetectionEvent::SensorUpdate { .. } => "Sensor update".to_string(),
            DetectionEvent::MotionDetected { level, .. } => {
                format!("Motion detected with level: {:.4}", level)
            }
            DetectionEvent::PresenceChanged { present, .. } => format!(
                "Presence {}",
                if *present { "detected" } else { "absent" }
            ),
            DetectionEvent::FaceDetectionChanged {
                detected, count, ..
            } => format!("Face detected: {} (count: {})", detected, count),
            DetectionEvent::WakeRequested { source, .. } => {
                format!("Wake requested by {}", source)
            }
            DetectionEvent::ActivityRecorded { source, .. } => {
                format!("Activity recorded from {}", source)
            }
            DetectionEvent::AuthorizationChanged { status, .. } => {
                format!("Camera authorization: {}", status)
            }
            DetectionEvent::DetectionStateChanged { active, .. } => format!(
                "Camera detection {}",
                if *active { "active" } else { "inactive" }
            ),
            DetectionEvent::EngineError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            DetectionEvent::SensorUpdate { .. } => "sensor_update",
            DetectionEvent::MotionDetected { .. } => "motion_detected",
            DetectionEvent::PresenceChanged { .. } => "presence_changed",
            DetectionEvent::FaceDetectionChanged { .. } => "face_detection_changed",
            DetectionEvent::WakeRequested { .. } => "wake_requested",
            DetectionEvent::ActivityRecorded { .. } => "activity_recorded",
            DetectionEvent::AuthorizationChanged { .. } => "authorization_changed",
            DetectionEvent::DetectionStateChanged { .. } => "detection_state_changed",
            DetectionEvent::EngineError { .. } => "engine_error",
        }
    }
}

/// Broadcast bus for detection notifications
pub struct EventBus {
    sender: broadcast::Sender<DetectionEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DetectionEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            DetectionEvent::WakeRequested { source, .. } => {
                info!("Wake requested by {}", source);
            }
            DetectionEvent::EngineError { component, error } => {
                error!("Detection error in {}: {}", component, error);
            }
            DetectionEvent::AuthorizationChanged { status, .. } => {
                if status.is_authorized() {
                    info!("Camera access authorized");
                } else {
                    warn!("Camera access {}", status);
                }
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&DetectionEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &DetectionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<DetectionEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<DetectionEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<DetectionEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<DetectionEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
