use super::scorer::ConsecutiveFrameScorer;
use super::{DetectionSignal, EngineKind, EngineMessage};
use crate::camera::{
    AuthorizationState, CameraProvider, CaptureSession, CaptureSessionConfig, ResolutionPreset,
};
use crate::config::{CameraConfig, MotionConfig};
use crate::frame::FrameData;
use crate::settings::SettingsProvider;
use crate::timer::{CancellableTimer, TimerKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Debounced motion state, mutated only by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionState {
    /// True from a trigger until its cooldown expires
    pub motion_detected: bool,
    /// Most recent frame score in [0, 1]
    pub level: f32,
    pub last_motion_at: Option<SystemTime>,
    pub threshold: f32,
    pub in_cooldown: bool,
}

/// Frame-difference motion detection over a low-resolution capture session
pub struct MotionDetectionEngine {
    camera: Arc<dyn CameraProvider>,
    settings: Arc<dyn SettingsProvider>,
    camera_config: CameraConfig,
    config: MotionConfig,
    inbox: mpsc::UnboundedSender<EngineMessage>,
    session: Option<Box<dyn CaptureSession>>,
    scoring_task: Option<JoinHandle<()>>,
    generation: u64,
    cooldown: CancellableTimer<EngineMessage>,
    state: MotionState,
    authorization: AuthorizationState,
    error_message: Option<String>,
}

impl MotionDetectionEngine {
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        settings: Arc<dyn SettingsProvider>,
        camera_config: CameraConfig,
        config: MotionConfig,
        inbox: mpsc::UnboundedSender<EngineMessage>,
    ) -> Self {
        let threshold = config.threshold_for(settings.snapshot().motion_sensitivity);
        let authorization = camera.authorization_status();

        Self {
            cooldown: CancellableTimer::new(TimerKind::MotionCooldown, inbox.clone()),
            camera,
            settings,
            camera_config,
            config,
            inbox,
            session: None,
            scoring_task: None,
            generation: 0,
            state: MotionState {
                motion_detected: false,
                level: 0.0,
                last_motion_at: None,
                threshold,
                in_cooldown: false,
            },
            authorization,
            error_message: None,
        }
    }

    /// A capture session exists
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> &MotionState {
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

    /// Re-query camera permission from the platform
    pub fn refresh_authorization(&mut self) -> AuthorizationState {
        self.authorization = self.camera.authorization_status();
        self.authorization
    }

    /// Open the capture session and begin scoring frames.
    ///
    /// Never fails: refusal and device errors leave the engine inactive, the
    /// latter with `error_message` set.
    pub async fn start(&mut self) {
        if self.is_active() {
            debug!("Motion detection already active");
            return;
        }

        let status = self.refresh_authorization();
        if !status.is_authorized() {
            warn!("Camera access {}; motion detection not started", status);
            return;
        }

        self.update_sensitivity();

        let session_config = CaptureSessionConfig::for_preset(
            &self.camera_config,
            ResolutionPreset::Low,
            self.config.fps,
        );

        let mut session = match self.camera.open_session(session_config).await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to start motion capture session: {}", e);
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
        self.scoring_task = Some(spawn_scoring_task(
            frames,
            self.generation,
            self.inbox.clone(),
        ));

        info!(
            "Motion detection started (session {}, threshold {:.3}, {}fps)",
            session.id(),
            self.state.threshold,
            self.config.fps
        );
        self.session = Some(session);
    }

    pub async fn stop(&mut self) {
        if !self.is_active() {
            debug!("Motion detection already stopped");
            return;
        }

        self.teardown().await;
        info!("Motion detection stopped");
    }

    /// Prompt for camera access only while the permission is undecided
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

    /// Remap the trigger threshold from the current sensitivity setting
    pub fn update_sensitivity(&mut self) {
        let sensitivity = self.settings.snapshot().motion_sensitivity;
        self.state.threshold = self.config.threshold_for(sensitivity);
        debug!(
            "Motion sensitivity {} -> threshold {:.3}",
            sensitivity, self.state.threshold
        );
    }

    /// Apply a message from the inbox, returning the resulting transitions
    pub async fn handle_message(&mut self, message: EngineMessage) -> Vec<DetectionSignal> {
        match message {
            EngineMessage::MotionScore {
                generation,
                frame_id,
                score,
            } => {
                if generation != self.generation || !self.is_active() {
                    trace!("Discarding stale motion score for frame {}", frame_id);
                    return Vec::new();
                }
                self.apply_score(score)
            }
            EngineMessage::Timer(fired) if fired.kind == TimerKind::MotionCooldown => {
                if self.cooldown.claim(&fired) {
                    self.end_cooldown()
                } else {
                    Vec::new()
                }
            }
            EngineMessage::SessionEnded {
                engine: EngineKind::Motion,
                generation,
            } if generation == self.generation && self.is_active() => {
                let message = "Motion capture session ended unexpectedly".to_string();
                error!("{}", message);
                self.teardown().await;
                self.error_message = Some(message.clone());
                vec![DetectionSignal::SessionLost {
                    engine: EngineKind::Motion,
                    message,
                }]
            }
            other => {
                trace!("Motion engine ignoring {:?}", other);
                Vec::new()
            }
        }
    }

    fn apply_score(&mut self, score: f32) -> Vec<DetectionSignal> {
        self.state.level = score;
        let mut signals = vec![DetectionSignal::MotionLevelChanged(score)];

        if score > self.state.threshold && !self.state.in_cooldown {
            let now = SystemTime::now();
            self.state.motion_detected = true;
            self.state.last_motion_at = Some(now);
            self.state.in_cooldown = true;
            self.cooldown.schedule_once(self.config.cooldown());

            info!(
                "Motion detected: level {:.4} > threshold {:.4}",
                score, self.state.threshold
            );
            signals.push(DetectionSignal::MotionDetected {
                level: score,
                at: now,
            });
        } else if score > self.state.threshold {
            trace!("Motion level {:.4} ignored during cooldown", score);
        }

        signals
    }

    fn end_cooldown(&mut self) -> Vec<DetectionSignal> {
        self.state.in_cooldown = false;
        if self.state.motion_detected {
            self.state.motion_detected = false;
            debug!("Motion cooldown expired");
            vec![DetectionSignal::MotionCleared]
        } else {
            Vec::new()
        }
    }

    async fn teardown(&mut self) {
        self.generation = self.generation.wrapping_add(1);

        if let Some(task) = self.scoring_task.take() {
            task.abort();
        }
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }

        self.cooldown.cancel();
        self.state.motion_detected = false;
        self.state.level = 0.0;
        self.state.in_cooldown = false;
    }
}

fn spawn_scoring_task(
    mut frames: mpsc::Receiver<FrameData>,
    generation: u64,
    inbox: mpsc::UnboundedSender<EngineMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scorer = ConsecutiveFrameScorer::new();

        while let Some(frame) = frames.recv().await {
            let frame_id = frame.id;
            let scored = tokio::task::spawn_blocking(move || {
                let result = scorer.push(frame);
                (scorer, result)
            })
            .await;

            let result = match scored {
                Ok((returned, result)) => {
                    scorer = returned;
                    result
                }
                Err(e) => {
                    error!("Motion scoring task failed: {}", e);
                    scorer = ConsecutiveFrameScorer::new();
                    continue;
                }
            };

            match result {
                Ok(Some(score)) => {
                    let message = EngineMessage::MotionScore {
                        generation,
                        frame_id,
                        score,
                    };
                    if inbox.send(message).is_err() {
                        return;
                    }
                }
                Ok(None) => debug!("Frame {} seeded motion comparison", frame_id),
                Err(e) => warn!("Dropping frame {} from motion analysis: {}", frame_id, e),
            }
        }

        let _ = inbox.send(EngineMessage::SessionEnded {
            engine: EngineKind::Motion,
            generation,
        });
    })
}
