use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl KioskcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Capture device and session failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera access not authorized (status: {status})")]
    NotAuthorized { status: String },

    #[error("Camera device unavailable: {details}")]
    DeviceUnavailable { details: String },

    #[error("Camera configuration failed: {details}")]
    Configuration { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },
}

/// Frame analysis failures; a failing frame is dropped, never fatal
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },

    #[error("Frame dimensions differ: {current:?} vs previous {previous:?}")]
    DimensionMismatch {
        current: (u32, u32),
        previous: (u32, u32),
    },

    #[error("Unsupported frame format: {format}")]
    UnsupportedFormat { format: String },
}

/// Vision inference failures for a single submitted frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("{detector} inference failed: {details}")]
    Failed { detector: String, details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, KioskcamError>;
