use super::sensors::{self, SensorReport};
use super::sinks::{IdleController, LoggingIdleController};
use super::status::{DetectionObserver, DetectionStatus};
use crate::analyzer::{
    DetectionSignal, DetectorKind, EngineKind, EngineMessage, MotionDetectionEngine, NullDetector,
    PresenceInferenceEngine, RegionDetector,
};
use crate::camera::{AuthorizationState, CameraProvider};
use crate::config::KioskcamConfig;
use crate::error::{KioskcamError, Result};
use crate::events::{DetectionEvent, EventBus};
use crate::settings::{SettingsProvider, SharedSettings};
use crate::timer::{CancellableTimer, TimerFired, TimerKind};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, trace, warn};

const MOTION_WAKE_SOURCE: &str = "camera_motion";
const PRESENCE_SOURCE: &str = "camera_presence";

enum Route {
    Engine(EngineKind),
    KeepAlive(TimerFired),
}

/// Owns both engines and turns their transitions into unified state and
/// side effects.
///
/// All mutation happens through `&mut self`; the owner drives it from a
/// single task by feeding it the messages from [`take_inbox`].
///
/// [`take_inbox`]: DetectionCoordinator::take_inbox
pub struct DetectionCoordinator {
    camera: Arc<dyn CameraProvider>,
    settings: Arc<dyn SettingsProvider>,
    motion: MotionDetectionEngine,
    presence: PresenceInferenceEngine,
    idle: Arc<dyn IdleController>,
    observers: Vec<Arc<dyn DetectionObserver>>,
    event_bus: EventBus,
    keep_alive: CancellableTimer<EngineMessage>,
    keep_alive_interval: Duration,
    inbox: Option<mpsc::UnboundedReceiver<EngineMessage>>,
    status: DetectionStatus,
    status_tx: watch::Sender<DetectionStatus>,
}

impl DetectionCoordinator {
    pub fn builder(config: KioskcamConfig) -> DetectionCoordinatorBuilder {
        DetectionCoordinatorBuilder::new(config)
    }

    /// Hand out the receiving end of the coordinating inbox. Only the first
    /// call returns it.
    pub fn take_inbox(&mut self) -> Option<mpsc::UnboundedReceiver<EngineMessage>> {
        self.inbox.take()
    }

    pub fn status(&self) -> DetectionStatus {
        self.status.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DetectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DetectionEvent> {
        self.event_bus.subscribe()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn DetectionObserver>) {
        self.observers.push(observer);
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active
    }

    pub fn authorization_status(&self) -> AuthorizationState {
        self.status.authorization_status
    }

    pub fn motion_engine(&self) -> &MotionDetectionEngine {
        &self.motion
    }

    pub fn presence_engine(&self) -> &PresenceInferenceEngine {
        &self.presence
    }

    pub fn keep_alive_armed(&self) -> bool {
        self.keep_alive.is_armed()
    }

    /// Start the engines the current settings enable.
    ///
    /// Engines already running are left alone, so calling this again after a
    /// refused or failed start retries only the engines that are down.
    pub async fn start(&mut self) {
        let was_active = self.status.is_active;

        self.refresh_authorization();
        let settings = self.settings.snapshot();

        if settings.motion_enabled {
            self.motion.start().await;
        }
        if settings.presence_engine_enabled() {
            self.presence.start().await;
        }

        self.status.is_active = settings.any_detection_enabled();
        self.sync_status();
        self.report_start_failures();

        if !self.status.is_active {
            debug!("No camera detection feature enabled");
            return;
        }

        info!(
            "Camera detection started (motion: {}, presence: {})",
            self.motion.is_active(),
            self.presence.is_active()
        );
        if !was_active {
            self.publish(DetectionEvent::DetectionStateChanged {
                active: true,
                timestamp: SystemTime::now(),
            });
        }
    }

    /// Stop both engines and cancel keep-alive, whatever the current state
    pub async fn stop(&mut self) {
        let was_active = self.status.is_active;
        let was_present = self.status.presence_detected;
        let had_motion = self.status.motion_detected;
        let had_faces = self.status.face_detected;

        self.keep_alive.cancel();
        self.motion.stop().await;
        self.presence.stop().await;

        self.status.is_active = false;
        self.sync_status();

        if was_present {
            self.dispatch(vec![DetectionSignal::PresenceChanged {
                present: false,
                at: SystemTime::now(),
            }]);
        } else if had_motion || had_faces {
            self.publish(DetectionEvent::SensorUpdate {
                timestamp: SystemTime::now(),
            });
        }

        if was_active {
            info!("Camera detection stopped");
            self.publish(DetectionEvent::DetectionStateChanged {
                active: false,
                timestamp: SystemTime::now(),
            });
        }
    }

    /// Stop then start, picking up changed settings
    pub async fn restart(&mut self) {
        self.stop().await;
        self.start().await;
    }

    pub async fn enable_privacy_mode(&mut self) {
        self.stop().await;
        info!("Camera detection privacy mode enabled");
    }

    pub async fn disable_privacy_mode(&mut self) {
        self.start().await;
        info!("Camera detection privacy mode disabled");
    }

    /// Remap the motion threshold without restarting
    pub fn update_sensitivity(&mut self) {
        self.motion.update_sensitivity();
    }

    /// Prompt for camera access if undecided; suspends until resolved
    pub async fn request_authorization(&mut self) -> bool {
        let granted = self.motion.request_authorization().await;
        self.refresh_authorization();
        granted
    }

    /// Apply one message from the inbox
    pub async fn handle_message(&mut self, message: EngineMessage) {
        let route = match &message {
            EngineMessage::MotionScore { .. } => Route::Engine(EngineKind::Motion),
            EngineMessage::Inference { .. } => Route::Engine(EngineKind::Presence),
            EngineMessage::SessionEnded { engine, .. } => Route::Engine(*engine),
            EngineMessage::Timer(fired) => match fired.kind {
                TimerKind::MotionCooldown => Route::Engine(EngineKind::Motion),
                TimerKind::PresenceAbsence => Route::Engine(EngineKind::Presence),
                TimerKind::KeepAlive => Route::KeepAlive(*fired),
            },
        };

        let signals = match route {
            Route::Engine(EngineKind::Motion) => self.motion.handle_message(message).await,
            Route::Engine(EngineKind::Presence) => self.presence.handle_message(message).await,
            Route::KeepAlive(fired) => {
                self.keep_alive_tick(fired);
                Vec::new()
            }
        };

        self.sync_status();
        self.dispatch(signals);
    }

    pub fn motion_sensor_state(&self) -> &'static str {
        sensors::motion_sensor_state(&self.status)
    }

    pub fn presence_sensor_state(&self) -> &'static str {
        sensors::presence_sensor_state(&self.status)
    }

    pub fn motion_sensor_attributes(&self) -> Map<String, Value> {
        sensors::motion_sensor_attributes(&self.status, &self.settings.snapshot())
    }

    pub fn presence_sensor_attributes(&self) -> Map<String, Value> {
        sensors::presence_sensor_attributes(&self.status, &self.settings.snapshot())
    }

    pub fn sensor_reports(&self) -> Vec<SensorReport> {
        sensors::sensor_reports(&self.status, &self.settings.snapshot())
    }

    fn refresh_authorization(&mut self) {
        let previous = self.status.authorization_status;
        let current = self.camera.authorization_status();
        self.motion.refresh_authorization();
        self.presence.refresh_authorization();

        if current != previous {
            self.status.authorization_status = current;
            self.sync_status();
            self.publish(DetectionEvent::AuthorizationChanged {
                status: current,
                timestamp: SystemTime::now(),
            });
        }
    }

    fn report_start_failures(&self) {
        let failures = [
            (EngineKind::Motion, self.motion.error_message()),
            (EngineKind::Presence, self.presence.error_message()),
        ];
        for (engine, error) in failures {
            if let Some(error) = error {
                self.publish(DetectionEvent::EngineError {
                    component: engine.to_string(),
                    error: error.to_string(),
                });
            }
        }
    }

    fn dispatch(&mut self, signals: Vec<DetectionSignal>) {
        for signal in signals {
            match signal {
                DetectionSignal::MotionDetected { level, at } => self.on_motion_detected(level, at),
                DetectionSignal::MotionCleared => {
                    self.publish(DetectionEvent::SensorUpdate {
                        timestamp: SystemTime::now(),
                    });
                }
                DetectionSignal::MotionLevelChanged(level) => {
                    for observer in &self.observers {
                        observer.on_motion_level_changed(level);
                    }
                }
                DetectionSignal::PresenceChanged { present, at } => {
                    self.on_presence_changed(present, at)
                }
                DetectionSignal::FaceDetectionChanged { detected, count } => {
                    for observer in &self.observers {
                        observer.on_face_detection_changed(detected, count);
                    }
                    self.publish(DetectionEvent::FaceDetectionChanged {
                        detected,
                        count,
                        timestamp: SystemTime::now(),
                    });
                    self.publish(DetectionEvent::SensorUpdate {
                        timestamp: SystemTime::now(),
                    });
                }
                DetectionSignal::SessionLost { engine, message } => {
                    warn!("{} lost its capture session", engine);
                    self.publish(DetectionEvent::EngineError {
                        component: engine.to_string(),
                        error: message,
                    });
                }
            }
        }
    }

    fn on_motion_detected(&mut self, level: f32, at: SystemTime) {
        info!("Camera motion detected");

        for observer in &self.observers {
            observer.on_motion_detected();
        }
        self.publish(DetectionEvent::MotionDetected {
            level,
            timestamp: at,
        });
        self.publish(DetectionEvent::SensorUpdate { timestamp: at });

        if self.settings.snapshot().wake_on_motion {
            self.request_wake(MOTION_WAKE_SOURCE);
        }
    }

    fn on_presence_changed(&mut self, present: bool, at: SystemTime) {
        info!(
            "Presence changed: {}",
            if present { "detected" } else { "absent" }
        );

        if present {
            self.status.last_presence_time = Some(at);
            self.sync_status();
        }

        for observer in &self.observers {
            observer.on_presence_changed(present);
        }
        self.publish(DetectionEvent::PresenceChanged {
            present,
            timestamp: at,
        });
        self.publish(DetectionEvent::SensorUpdate { timestamp: at });

        if !present {
            self.keep_alive.cancel();
            return;
        }

        if self.settings.snapshot().wake_on_presence {
            self.request_wake(PRESENCE_SOURCE);
            self.keep_alive.schedule_repeating(self.keep_alive_interval);
        }
    }

    fn keep_alive_tick(&mut self, fired: TimerFired) {
        if !self.keep_alive.claim(&fired) {
            return;
        }

        if !self.presence.state().person_present {
            debug!("Presence gone; stopping keep-alive");
            self.keep_alive.cancel();
            return;
        }

        trace!("Presence keep-alive tick");
        self.idle.record_activity(PRESENCE_SOURCE);
        self.publish(DetectionEvent::ActivityRecorded {
            source: PRESENCE_SOURCE.to_string(),
            timestamp: SystemTime::now(),
        });
    }

    fn request_wake(&self, source: &str) {
        self.idle.request_wake(source);
        self.publish(DetectionEvent::WakeRequested {
            source: source.to_string(),
            timestamp: SystemTime::now(),
        });
    }

    /// Recompute the engine-derived fields and publish if the result differs
    /// from what subscribers last saw
    fn sync_status(&mut self) {
        let motion = self.motion.state();
        let presence = self.presence.state();

        let next = DetectionStatus {
            is_active: self.status.is_active,
            motion_detected: motion.motion_detected,
            presence_detected: presence.person_present,
            face_detected: presence.face_present,
            face_count: presence.face_count,
            authorization_status: self.motion.authorization_status(),
            last_motion_time: motion.last_motion_at,
            last_presence_time: self.status.last_presence_time,
            motion_level: motion.level,
            error_message: self
                .motion
                .error_message()
                .or(self.presence.error_message())
                .map(str::to_string),
        };

        self.status = next;
        self.status_tx.send_if_modified(|published| {
            if *published == self.status {
                return false;
            }
            *published = self.status.clone();
            true
        });
    }

    fn publish(&self, event: DetectionEvent) {
        if let Err(e) = self.event_bus.publish(event) {
            trace!("Detection event not delivered: {}", e);
        }
    }
}

/// Assembles a [`DetectionCoordinator`] and its engines around one inbox
pub struct DetectionCoordinatorBuilder {
    config: KioskcamConfig,
    camera: Option<Arc<dyn CameraProvider>>,
    settings: Option<Arc<dyn SettingsProvider>>,
    idle: Option<Arc<dyn IdleController>>,
    human_detector: Option<Arc<dyn RegionDetector>>,
    face_detector: Option<Arc<dyn RegionDetector>>,
    event_bus: Option<EventBus>,
}

impl DetectionCoordinatorBuilder {
    pub fn new(config: KioskcamConfig) -> Self {
        Self {
            config,
            camera: None,
            settings: None,
            idle: None,
            human_detector: None,
            face_detector: None,
            event_bus: None,
        }
    }

    pub fn camera(mut self, camera: Arc<dyn CameraProvider>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn idle_controller(mut self, idle: Arc<dyn IdleController>) -> Self {
        self.idle = Some(idle);
        self
    }

    pub fn human_detector(mut self, detector: Arc<dyn RegionDetector>) -> Self {
        self.human_detector = Some(detector);
        self
    }

    pub fn face_detector(mut self, detector: Arc<dyn RegionDetector>) -> Self {
        self.face_detector = Some(detector);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<DetectionCoordinator> {
        let camera = self
            .camera
            .ok_or_else(|| KioskcamError::system("Camera provider must be specified"))?;
        self.config.validate()?;

        let config = self.config;
        let settings = self.settings.unwrap_or_else(|| {
            Arc::new(SharedSettings::new(config.detection)) as Arc<dyn SettingsProvider>
        });
        let idle = self
            .idle
            .unwrap_or_else(|| Arc::new(LoggingIdleController) as Arc<dyn IdleController>);
        let human_detector = self.human_detector.unwrap_or_else(|| {
            warn!("No human detector configured; presence will never be confirmed");
            Arc::new(NullDetector::new(DetectorKind::Human)) as Arc<dyn RegionDetector>
        });
        let face_detector = self.face_detector.unwrap_or_else(|| {
            Arc::new(NullDetector::new(DetectorKind::Face)) as Arc<dyn RegionDetector>
        });
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| EventBus::new(config.system.event_bus_capacity));

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let motion = MotionDetectionEngine::new(
            Arc::clone(&camera),
            Arc::clone(&settings),
            config.camera.clone(),
            config.motion.clone(),
            inbox_tx.clone(),
        );
        let presence = PresenceInferenceEngine::new(
            Arc::clone(&camera),
            Arc::clone(&settings),
            config.camera.clone(),
            config.presence.clone(),
            human_detector,
            face_detector,
            inbox_tx.clone(),
        );

        let status = DetectionStatus {
            authorization_status: camera.authorization_status(),
            ..DetectionStatus::default()
        };
        let (status_tx, _) = watch::channel(status.clone());

        Ok(DetectionCoordinator {
            camera,
            settings,
            motion,
            presence,
            idle,
            observers: Vec::new(),
            event_bus,
            keep_alive: CancellableTimer::new(TimerKind::KeepAlive, inbox_tx),
            keep_alive_interval: config.coordinator.keep_alive_interval(),
            inbox: Some(inbox_rx),
            status,
            status_tx,
        })
    }
}
