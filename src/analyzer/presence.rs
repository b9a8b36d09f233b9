use super::inference::{self, DetectorKind, Region, RegionDetector};
use super::{DetectionSignal, EngineKind, EngineMessage};
use crate::camera::{
    AuthorizationState, CameraProvider, CaptureSession, CaptureSessionConfig, ResolutionPreset,
};
use crate::config::{CameraConfig, PresenceConfig};
use crate::error::InferenceError;
use crate::frame::FrameData;
use crate::settings::SettingsProvider;
use crate::timer::{CancellableTimer, TimerKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Confirmed presence and face state, mutated only by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresenceState {
    pub person_present: bool,
    pub face_present: bool,
    pub face_count: usize,
    pub last_detection_at: Option<SystemTime>,
    pub consecutive_hits: u32,
    pub consecutive_misses: u32,
}

/// Person and face inference over a medium-resolution capture session
pub struct PresenceInferenceEngine {
    camera: Arc<dyn CameraProvider>,
    settings: Arc<dyn SettingsProvider>,
    camera_config: CameraConfig,
    config: PresenceConfig,
    human_detector: Arc<dyn RegionDetector>,
    face_detector: Arc<dyn RegionDetector>,
    inbox: mpsc::UnboundedSender<EngineMessage>,
    session: Option<Box<dyn CaptureSession>>,
    dispatch_task: Option<JoinHandle<()>>,
    generation: u64,
    absence_timer: CancellableTimer<EngineMessage>,
    state: PresenceState,
    authorization: AuthorizationState,
    error_message: Option<String>,
}

impl PresenceInferenceEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        settings: Arc<dyn SettingsProvider>,
        camera_config: CameraConfig,
        config: PresenceConfig,
        human_detector: Arc<dyn RegionDetector>,
        face_detector: Arc<dyn RegionDetector>,
        inbox: mpsc::UnboundedSender<EngineMessage>,
    ) -> Self {
        let authorization = camera.authorization_status();

        Self {
            absence_timer: CancellableTimer::new(TimerKind::PresenceAbsence, inbox.clone()),
            camera,
            settings,
            camera_config,
            config,
            human_detector,
            face_detector,
            inbox,
            session: None,
            dispatch_task: None,
            generation: 0,
            state: PresenceState::default(),
            authorization,
            error_message: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    pub fn authorization_status(&self) -> AuthorizationState {
        self.authorization
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refresh_authorization(&mut self) -> AuthorizationState {
        self.authorization = self.camera.authorization_status();
        self.authorization
    }

    /// Presence or face detection is switched on
    pub fn is_detection_allowed(&self) -> bool {
        self.settings.snapshot().presence_engine_enabled()
    }

    /// Status line that reveals nothing beyond what the kiosk already shows
    pub fn privacy_safe_status(&self) -> &'static str {
        if !self.is_active() {
            "Inactive"
        } else if self.state.person_present {
            if self.state.face_present {
                "Face detected"
            } else {
                "Person detected"
            }
        } else {
            "Monitoring"
        }
    }

    pub async fn start(&mut self) {
        if self.is_active() {
            debug!("Presence detection already active");
            return;
        }

        let status = self.refresh_authorization();
        if !status.is_authorized() {
            warn!("Camera access {}; presence detection not started", status);
            return;
        }

        let face_enabled = self.settings.snapshot().face_detection_enabled;
        let fps = self.config.fps_for(face_enabled);
        let session_config =
            CaptureSessionConfig::for_preset(&self.camera_config, ResolutionPreset::Medium, fps);

        let mut session = match self.camera.open_session(session_config).await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to start presence capture session: {}", e);
                self.error_message = Some(e.to_string());
                return;
            }
        };

        let Some(frames) = session.take_frames() else {
            error!("Capture session {} has no frame stream", session.id());
            session.close().await;
            self.error_message = Some("Capture session delivered no frame stream".to_string());
            return;
        };

        self.generation = self.generation.wrapping_add(1);
        self.error_message = None;
        self.dispatch_task = Some(spawn_dispatch_task(
            frames,
            self.generation,
            Arc::clone(&self.settings),
            Arc::clone(&self.human_detector),
            Arc::clone(&self.face_detector),
            self.inbox.clone(),
        ));

        info!(
            "Presence detection started (session {}, {}fps, face detection {})",
            session.id(),
            fps,
            if face_enabled { "on" } else { "off" }
        );
        self.session = Some(session);
    }

    pub async fn stop(&mut self) {
        if !self.is_active() {
            debug!("Presence detection already stopped");
            return;
        }

        self.teardown().await;
        info!("Presence detection stopped");
    }

    pub async fn request_authorization(&mut self) -> bool {
        let status = self.refresh_authorization();
        if status != AuthorizationState::NotDetermined {
            return status.is_authorized();
        }

        let granted = self.camera.request_access().await;
        self.refresh_authorization();
        info!("Camera access request resolved: granted={}", granted);
        granted
    }

    pub async fn handle_message(&mut self, message: EngineMessage) -> Vec<DetectionSignal> {
        match message {
            EngineMessage::Inference {
                generation,
                detector,
                frame_id,
                result,
            } => {
                if generation != self.generation || !self.is_active() {
                    trace!("Discarding stale {} inference for frame {}", detector, frame_id);
                    return Vec::new();
                }
                self.apply_inference(detector, frame_id, result)
            }
            EngineMessage::Timer(fired) if fired.kind == TimerKind::PresenceAbsence => {
                if self.absence_timer.claim(&fired) {
                    self.absence_timeout()
                } else {
                    Vec::new()
                }
            }
            EngineMessage::SessionEnded {
                engine: EngineKind::Presence,
                generation,
            } if generation == self.generation && self.is_active() => {
                let message = "Presence capture session ended unexpectedly".to_string();
                error!("{}", message);
                let was_present = self.state.person_present;
                self.teardown().await;
                self.error_message = Some(message.clone());

                let mut signals = vec![DetectionSignal::SessionLost {
                    engine: EngineKind::Presence,
                    message,
                }];
                if was_present {
                    signals.push(DetectionSignal::PresenceChanged {
                        present: false,
                        at: SystemTime::now(),
                    });
                }
                signals
            }
            other => {
                trace!("Presence engine ignoring {:?}", other);
                Vec::new()
            }
        }
    }

    fn apply_inference(
        &mut self,
        detector: DetectorKind,
        frame_id: u64,
        result: Result<Vec<Region>, InferenceError>,
    ) -> Vec<DetectionSignal> {
        let regions = match result {
            Ok(regions) => regions,
            Err(e) => {
                warn!("Dropping {} inference for frame {}: {}", detector, frame_id, e);
                return Vec::new();
            }
        };

        match detector {
            DetectorKind::Human => self.record_person_result(!regions.is_empty()),
            DetectorKind::Face => self.record_face_result(regions.len()),
        }
    }

    fn record_person_result(&mut self, detected: bool) -> Vec<DetectionSignal> {
        if !detected {
            self.state.consecutive_misses = self.state.consecutive_misses.saturating_add(1);
            self.state.consecutive_hits = 0;

            if self.state.person_present
                && self.state.consecutive_misses == self.config.miss_threshold
            {
                debug!(
                    "{} consecutive misses while present; waiting for absence timeout",
                    self.state.consecutive_misses
                );
            }
            return Vec::new();
        }

        self.state.consecutive_hits = self.state.consecutive_hits.saturating_add(1);
        self.state.consecutive_misses = 0;
        self.absence_timer
            .schedule_once(self.config.absence_timeout());

        if self.state.consecutive_hits >= self.config.detection_threshold
            && !self.state.person_present
        {
            let now = SystemTime::now();
            self.state.person_present = true;
            self.state.last_detection_at = Some(now);
            info!("Person presence detected");
            return vec![DetectionSignal::PresenceChanged {
                present: true,
                at: now,
            }];
        }

        Vec::new()
    }

    fn record_face_result(&mut self, count: usize) -> Vec<DetectionSignal> {
        let detected = count > 0;
        let changed = detected != self.state.face_present || count != self.state.face_count;

        self.state.face_count = count;
        self.state.face_present = detected;

        if !changed {
            return Vec::new();
        }

        if detected {
            self.state.last_detection_at = Some(SystemTime::now());
            info!("Face detected (count: {})", count);
        }
        vec![DetectionSignal::FaceDetectionChanged { detected, count }]
    }

    fn absence_timeout(&mut self) -> Vec<DetectionSignal> {
        if !self.state.person_present {
            return Vec::new();
        }

        self.state.person_present = false;
        self.state.face_present = false;
        self.state.face_count = 0;
        info!("Person presence timeout; marking as absent");
        vec![DetectionSignal::PresenceChanged {
            present: false,
            at: SystemTime::now(),
        }]
    }

    async fn teardown(&mut self) {
        self.generation = self.generation.wrapping_add(1);

        if let Some(task) = self.dispatch_task.take() {
            task.abort();
        }
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }

        self.absence_timer.cancel();
        self.state.person_present = false;
        self.state.face_present = false;
        self.state.face_count = 0;
        self.state.consecutive_hits = 0;
        self.state.consecutive_misses = 0;
    }
}

/// Submit every delivered frame to the detectors the current settings enable
fn spawn_dispatch_task(
    mut frames: mpsc::Receiver<FrameData>,
    generation: u64,
    settings: Arc<dyn SettingsProvider>,
    human_detector: Arc<dyn RegionDetector>,
    face_detector: Arc<dyn RegionDetector>,
    inbox: mpsc::UnboundedSender<EngineMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let snapshot = settings.snapshot();

            if snapshot.presence_enabled {
                inference::submit(
                    Arc::clone(&human_detector),
                    DetectorKind::Human,
                    frame.clone(),
                    generation,
                    inbox.clone(),
                );
            }
            if snapshot.face_detection_enabled {
                inference::submit(
                    Arc::clone(&face_detector),
                    DetectorKind::Face,
                    frame,
                    generation,
                    inbox.clone(),
                );
            }
        }

        let _ = inbox.send(EngineMessage::SessionEnded {
            engine: EngineKind::Presence,
            generation,
        });
    })
}
