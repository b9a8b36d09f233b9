mod inference;
mod motion;
mod presence;
mod scorer;

pub use inference::{DetectorKind, NullDetector, Region, RegionDetector, ScriptedDetector};
pub use motion::{MotionDetectionEngine, MotionState};
pub use presence::{PresenceInferenceEngine, PresenceState};
pub use scorer::{ConsecutiveFrameScorer, FrameDifferenceMotionScorer};

use crate::error::InferenceError;
use crate::timer::TimerFired;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// The two detection engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Motion,
    Presence,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Motion => f.write_str("motion_engine"),
            EngineKind::Presence => f.write_str("presence_engine"),
        }
    }
}

/// Everything posted into the coordinating inbox by background work.
///
/// Each variant carries the generation of the engine run (or timer arming)
/// that produced it; owners drop messages from earlier generations.
#[derive(Debug)]
pub enum EngineMessage {
    /// Motion score for a delivered frame
    MotionScore {
        generation: u64,
        frame_id: u64,
        score: f32,
    },
    /// Completed region inference
    Inference {
        generation: u64,
        detector: DetectorKind,
        frame_id: u64,
        result: Result<Vec<Region>, InferenceError>,
    },
    /// Frame delivery stopped without a stop request
    SessionEnded { engine: EngineKind, generation: u64 },
    Timer(TimerFired),
}

impl From<TimerFired> for EngineMessage {
    fn from(fired: TimerFired) -> Self {
        EngineMessage::Timer(fired)
    }
}

/// State transitions reported by an engine when it handles a message
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionSignal {
    MotionDetected { level: f32, at: SystemTime },
    /// Cooldown expired; the motion flag dropped back to false
    MotionCleared,
    MotionLevelChanged(f32),
    PresenceChanged { present: bool, at: SystemTime },
    FaceDetectionChanged { detected: bool, count: usize },
    /// The capture session died; the engine is now inactive
    SessionLost { engine: EngineKind, message: String },
}
