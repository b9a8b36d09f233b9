use super::interface::{
    AuthorizationState, CameraProvider, CaptureSession, CaptureSessionConfig, FRAME_QUEUE_DEPTH,
};
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, MessageType, MessageView, Pipeline};
use gstreamer_app::{AppSink, AppSinkCallbacks};
use gstreamer_video::VideoInfo;
use parking_lot::Mutex;
use std::ffi::CString;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

type SharedSender = Arc<Mutex<Option<mpsc::Sender<FrameData>>>>;

/// V4L2 capture through GStreamer, delivering GRAY8 frames
pub struct GStreamerCameraProvider {
    device_index: u32,
}

impl GStreamerCameraProvider {
    pub fn new(device_index: u32) -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        info!(
            "GStreamer camera provider ready for {}",
            device_path(device_index)
        );
        Ok(Self { device_index })
    }

    fn build_pipeline_string(config: &CaptureSessionConfig) -> String {
        let (width, height) = config.resolution;

        // max-buffers=1 drop=true: late frames are discarded, never queued
        format!(
            "v4l2src device={} do-timestamp=true ! \
             videoconvert ! videoscale ! videorate ! \
             video/x-raw,format=GRAY8,width={},height={},framerate={}/1 ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            device_path(config.device_index),
            width,
            height,
            config.fps
        )
    }
}

fn device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

/// Map device node accessibility onto the permission model
fn check_device_access(path: &str) -> AuthorizationState {
    if !Path::new(path).exists() {
        return AuthorizationState::NotDetermined;
    }

    let c_path = match CString::new(path) {
        Ok(p) => p,
        Err(_) => return AuthorizationState::NotDetermined,
    };

    let rc = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) };
    if rc == 0 {
        return AuthorizationState::Authorized;
    }

    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::EACCES) => AuthorizationState::Denied,
        Some(libc::EPERM) => AuthorizationState::Restricted,
        _ => AuthorizationState::NotDetermined,
    }
}

#[async_trait]
impl CameraProvider for GStreamerCameraProvider {
    fn authorization_status(&self) -> AuthorizationState {
        check_device_access(&device_path(self.device_index))
    }

    async fn request_access(&self) -> bool {
        // No interactive prompt on V4L2; access comes from device node permissions
        let status = self.authorization_status();
        if !status.is_authorized() {
            warn!(
                "Camera access {} for {}; grant read/write on the device node (e.g. the 'video' group)",
                status,
                device_path(self.device_index)
            );
        }
        status.is_authorized()
    }

    async fn open_session(
        &self,
        config: CaptureSessionConfig,
    ) -> Result<Box<dyn CaptureSession>, CameraError> {
        let path = device_path(config.device_index);
        if !Path::new(&path).exists() {
            return Err(CameraError::DeviceUnavailable {
                details: format!("{} not found", path),
            });
        }

        let pipeline_desc = Self::build_pipeline_string(&config);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let sender: SharedSender = Arc::new(Mutex::new(Some(tx)));
        let frame_counter = Arc::new(AtomicU64::new(0));

        let callback_sender = Arc::clone(&sender);
        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);

                    match sample_to_frame(&sample, frame_id) {
                        Ok(frame) => {
                            let guard = callback_sender.lock();
                            match guard.as_ref() {
                                Some(tx) => {
                                    if tx.try_send(frame).is_err() {
                                        trace!("Frame {} dropped, consumer busy", frame_id);
                                    }
                                }
                                None => return Err(gstreamer::FlowError::Flushing),
                            }
                        }
                        Err(e) => warn!("Dropping undecodable sample {}: {}", frame_id, e),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        start_pipeline(&pipeline)?;

        let stopping = Arc::new(AtomicBool::new(false));
        let bus_watch = spawn_bus_watch(&pipeline, Arc::clone(&sender), Arc::clone(&stopping));

        let id = Uuid::new_v4();
        info!(
            "Capture session {} started ({:?} {}x{} @ {}fps)",
            id, config.preset, config.resolution.0, config.resolution.1, config.fps
        );

        Ok(Box::new(GStreamerCaptureSession {
            id,
            config,
            pipeline,
            sender,
            frames: Some(rx),
            stopping,
            bus_watch,
        }))
    }
}

/// Watch the pipeline bus on a blocking thread; an error or EOS closes the
/// frame channel so the consumer sees the stream end.
fn spawn_bus_watch(
    pipeline: &Pipeline,
    sender: SharedSender,
    stopping: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    let bus = pipeline.bus()?;

    Some(tokio::task::spawn_blocking(move || {
        while !stopping.load(Ordering::Relaxed) {
            let Some(msg) = bus.timed_pop_filtered(
                ClockTime::from_mseconds(200),
                &[MessageType::Error, MessageType::Eos],
            ) else {
                continue;
            };

            match msg.view() {
                MessageView::Error(err) => {
                    error!(
                        "Capture pipeline error: {} ({:?})",
                        err.error(),
                        err.debug()
                    );
                }
                MessageView::Eos(..) => warn!("Capture pipeline reached end of stream"),
                _ => continue,
            }

            sender.lock().take();
            break;
        }
    }))
}

fn sample_to_frame(sample: &gstreamer::Sample, frame_id: u64) -> Result<FrameData, CameraError> {
    let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureStream {
        details: "No buffer in sample".to_string(),
    })?;

    let caps = sample.caps().ok_or_else(|| CameraError::CaptureStream {
        details: "No caps in sample".to_string(),
    })?;

    let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::CaptureStream {
        details: format!("Failed to get video info: {}", e),
    })?;

    let width = video_info.width();
    let height = video_info.height();
    let stride = video_info.stride()[0] as usize;

    let map = buffer
        .map_readable()
        .map_err(|e| CameraError::CaptureStream {
            details: format!("Failed to map buffer: {}", e),
        })?;
    let data = pack_gray8(map.as_slice(), width as usize, height as usize, stride)?;

    Ok(FrameData::new(
        frame_id,
        SystemTime::now(),
        data,
        width,
        height,
        FrameFormat::Gray8,
    ))
}

/// Move the pipeline to Playing, or back to Null if it cannot get there
fn start_pipeline(pipeline: &Pipeline) -> Result<(), CameraError> {
    if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
        let _ = pipeline.set_state(gstreamer::State::Null);
        return Err(CameraError::DeviceUnavailable {
            details: format!("Failed to start pipeline: {}", e),
        });
    }
    Ok(())
}

/// Copy GRAY8 rows out of a mapped buffer, dropping any stride padding
fn pack_gray8(
    bytes: &[u8],
    width: usize,
    height: usize,
    stride: usize,
) -> Result<Vec<u8>, CameraError> {
    let needed = match height {
        0 => 0,
        h => stride * (h - 1) + width,
    };
    if stride < width || bytes.len() < needed {
        return Err(CameraError::CaptureStream {
            details: format!(
                "Truncated GRAY8 buffer ({} bytes for {}x{} stride {})",
                bytes.len(),
                width,
                height,
                stride
            ),
        });
    }

    if stride == width {
        return Ok(bytes[..width * height].to_vec());
    }

    let mut packed = Vec::with_capacity(width * height);
    for y in 0..height {
        let start = y * stride;
        packed.extend_from_slice(&bytes[start..start + width]);
    }
    Ok(packed)
}

struct GStreamerCaptureSession {
    id: Uuid,
    config: CaptureSessionConfig,
    pipeline: Pipeline,
    sender: SharedSender,
    frames: Option<mpsc::Receiver<FrameData>>,
    stopping: Arc<AtomicBool>,
    bus_watch: Option<JoinHandle<()>>,
}

#[async_trait]
impl CaptureSession for GStreamerCaptureSession {
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
        self.stopping.store(true, Ordering::Relaxed);
        self.sender.lock().take();

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!("Failed to stop capture pipeline: {}", e);
        }

        if let Some(watch) = self.bus_watch.take() {
            if let Err(e) = watch.await {
                warn!("Bus watch for session {} ended abnormally: {}", self.id, e);
            }
        }

        debug!("Capture session {} closed", self.id);
    }
}

impl Drop for GStreamerCaptureSession {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::Relaxed);
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}
