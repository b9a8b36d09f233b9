use super::interface::{
    AuthorizationState, CameraProvider, CaptureSession, CaptureSessionConfig, FRAME_QUEUE_DEPTH,
};
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use uuid::Uuid;

#[derive(Default)]
struct MockState {
    authorization: AuthorizationState,
    grant_on_request: bool,
    access_requests: usize,
    next_open_error: Option<CameraError>,
    opened: Vec<CaptureSessionConfig>,
    live: Vec<(Uuid, CaptureSessionConfig, mpsc::Sender<FrameData>)>,
}

/// Camera provider for tests and for running without hardware.
///
/// Frames are injected with [`push_frame`](MockCameraProvider::push_frame)
/// and fan out to every open session.
#[derive(Clone)]
pub struct MockCameraProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockCameraProvider {
    pub fn new(authorization: AuthorizationState) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                authorization,
                grant_on_request: true,
                ..MockState::default()
            })),
        }
    }

    /// Provider that already has camera permission
    pub fn authorized() -> Self {
        Self::new(AuthorizationState::Authorized)
    }

    pub fn set_authorization(&self, authorization: AuthorizationState) {
        self.state.lock().authorization = authorization;
    }

    /// Outcome of the next permission prompt
    pub fn set_grant_on_request(&self, grant: bool) {
        self.state.lock().grant_on_request = grant;
    }

    /// Make the next `open_session` call fail
    pub fn fail_next_open(&self, error: CameraError) {
        self.state.lock().next_open_error = Some(error);
    }

    pub fn access_requests(&self) -> usize {
        self.state.lock().access_requests
    }

    /// Number of sessions ever opened
    pub fn sessions_opened(&self) -> usize {
        self.state.lock().opened.len()
    }

    /// Configurations of every session ever opened, oldest first
    pub fn opened_configs(&self) -> Vec<CaptureSessionConfig> {
        self.state.lock().opened.clone()
    }

    /// Number of sessions currently open
    pub fn open_sessions(&self) -> usize {
        let mut state = self.state.lock();
        state.live.retain(|(_, _, tx)| !tx.is_closed());
        state.live.len()
    }

    /// Deliver a frame to every open session; returns how many accepted it.
    /// Sessions with a full queue drop the frame.
    pub fn push_frame(&self, frame: FrameData) -> usize {
        let mut state = self.state.lock();
        state.live.retain(|(_, _, tx)| !tx.is_closed());

        let mut delivered = 0;
        for (id, _, tx) in &state.live {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => trace!("Mock session {} dropped frame {}", id, frame.id),
            }
        }
        delivered
    }

    /// Drop the frame sender of every open session, as if the device vanished
    pub fn disconnect_all(&self) {
        let mut state = self.state.lock();
        let count = state.live.len();
        state.live.clear();
        debug!("Mock camera disconnected {} sessions", count);
    }

    /// Feed every open session with synthetic frames: a bright block sweeping
    /// across a dark background, sized per session.
    pub fn start_synthetic_feed(&self, period: Duration) -> JoinHandle<()> {
        let provider = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut frame_id: u64 = 0;

            info!("Mock camera synthetic feed started ({:?} period)", period);

            loop {
                interval.tick().await;

                let sessions: Vec<_> = {
                    let mut state = provider.state.lock();
                    state.live.retain(|(_, _, tx)| !tx.is_closed());
                    state
                        .live
                        .iter()
                        .map(|(_, config, tx)| (config.resolution, tx.clone()))
                        .collect()
                };

                for ((width, height), tx) in sessions {
                    let frame = synthetic_frame(frame_id, width, height);
                    let _ = tx.try_send(frame);
                }
                frame_id = frame_id.wrapping_add(1);
            }
        })
    }
}

fn synthetic_frame(id: u64, width: u32, height: u32) -> FrameData {
    let block = (width / 8).max(1);
    let span = width.saturating_sub(block).max(1);
    let offset = ((id * block as u64) % span as u64) as u32;

    let mut data = vec![16u8; width as usize * height as usize];
    for y in height / 4..(height * 3 / 4) {
        for x in offset..(offset + block).min(width) {
            data[(y * width + x) as usize] = 235;
        }
    }

    FrameData::new(id, SystemTime::now(), data, width, height, FrameFormat::Gray8)
}

#[async_trait]
impl CameraProvider for MockCameraProvider {
    fn authorization_status(&self) -> AuthorizationState {
        self.state.lock().authorization
    }

    async fn request_access(&self) -> bool {
        let mut state = self.state.lock();
        state.access_requests += 1;
        state.authorization = if state.grant_on_request {
            AuthorizationState::Authorized
        } else {
            AuthorizationState::Denied
        };
        debug!("Mock camera access request resolved: {}", state.authorization);
        state.authorization.is_authorized()
    }

    async fn open_session(
        &self,
        config: CaptureSessionConfig,
    ) -> Result<Box<dyn CaptureSession>, CameraError> {
        let mut state = self.state.lock();
        if let Some(error) = state.next_open_error.take() {
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let id = Uuid::new_v4();
        state.opened.push(config.clone());
        state.live.push((id, config.clone(), tx));
        debug!(
            "Mock capture session {} opened ({:?} {}x{} @ {}fps)",
            id, config.preset, config.resolution.0, config.resolution.1, config.fps
        );

        Ok(Box::new(MockCaptureSession {
            id,
            config,
            frames: Some(rx),
            provider: Arc::clone(&self.state),
        }))
    }
}

struct MockCaptureSession {
    id: Uuid,
    config: CaptureSessionConfig,
    frames: Option<mpsc::Receiver<FrameData>>,
    provider: Arc<Mutex<MockState>>,
}

#[async_trait]
impl CaptureSession for MockCaptureSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn config(&self) -> &CaptureSessionConfig {
        &self.config
    }

    fn take_frames(&mut self) -> Option<mpsc::Receiver<FrameData>> {
        self.frames.take()
    }

    async fn close(&mut self) {
        self.provider.lock().live.retain(|(id, _, _)| *id != self.id);
        self.frames = None;
        debug!("Mock capture session {} closed", self.id);
    }
}

impl Drop for MockCaptureSession {
    fn drop(&mut self) {
        self.provider.lock().live.retain(|(id, _, _)| *id != self.id);
    }
}
