#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod interface;
mod mock;
#[cfg(test)]
mod tests;

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GStreamerCameraProvider;
pub use interface::{
    AuthorizationState, CameraProvider, CaptureSession, CaptureSessionConfig, ResolutionPreset,
    FRAME_QUEUE_DEPTH,
};
pub use mock::MockCameraProvider;
