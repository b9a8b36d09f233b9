use crate::error::InferenceError;
use crate::frame::FrameData;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::EngineMessage;

/// Which region detector produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Human,
    Face,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::Human => f.write_str("human"),
            DetectorKind::Face => f.write_str("face"),
        }
    }
}

/// A detected region in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
        }
    }
}

/// Black-box vision service returning the regions found in one frame.
///
/// Implementations may block; callers run them on the blocking pool.
pub trait RegionDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, frame: &FrameData) -> Result<Vec<Region>, InferenceError>;
}

/// Detector that never finds anything
pub struct NullDetector {
    name: String,
}

impl NullDetector {
    pub fn new(kind: DetectorKind) -> Self {
        Self {
            name: format!("null-{}", kind),
        }
    }
}

impl RegionDetector for NullDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, _frame: &FrameData) -> Result<Vec<Region>, InferenceError> {
        Ok(Vec::new())
    }
}

/// Detector replaying queued results, one per frame. Once the queue is
/// drained it keeps returning the fallback.
pub struct ScriptedDetector {
    name: String,
    script: Mutex<VecDeque<Result<Vec<Region>, InferenceError>>>,
    fallback: Mutex<Vec<Region>>,
    calls: Mutex<usize>,
}

impl ScriptedDetector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
        }
    }

    /// Queue `count` regions for the next frame
    pub fn push_regions(&self, count: usize) {
        let regions = (0..count)
            .map(|i| Region::new(0.1 * i as f32, 0.2, 0.1, 0.3, 0.9))
            .collect();
        self.script.lock().push_back(Ok(regions));
    }

    /// Queue a hit (one region) or a miss for the next frame
    pub fn push_detection(&self, detected: bool) {
        self.push_regions(usize::from(detected));
    }

    pub fn push_error(&self, details: &str) {
        self.script.lock().push_back(Err(InferenceError::Failed {
            detector: self.name.clone(),
            details: details.to_string(),
        }));
    }

    pub fn set_fallback(&self, count: usize) {
        *self.fallback.lock() = (0..count)
            .map(|_| Region::new(0.4, 0.4, 0.2, 0.2, 0.8))
            .collect();
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl RegionDetector for ScriptedDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, _frame: &FrameData) -> Result<Vec<Region>, InferenceError> {
        *self.calls.lock() += 1;
        match self.script.lock().pop_front() {
            Some(result) => result,
            None => Ok(self.fallback.lock().clone()),
        }
    }
}

/// Run `detector` on the blocking pool and post the completion to `inbox`,
/// tagged with the submitting generation
pub(crate) fn submit(
    detector: Arc<dyn RegionDetector>,
    kind: DetectorKind,
    frame: FrameData,
    generation: u64,
    inbox: mpsc::UnboundedSender<EngineMessage>,
) {
    tokio::spawn(async move {
        let frame_id = frame.id;
        let name = detector.name().to_string();

        let result = match tokio::task::spawn_blocking(move || detector.detect(&frame)).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} detector task failed on frame {}: {}", name, frame_id, e);
                Err(InferenceError::Failed {
                    detector: name,
                    details: e.to_string(),
                })
            }
        };

        debug!(
            "{} inference finished for frame {} (generation {})",
            kind, frame_id, generation
        );
        let _ = inbox.send(EngineMessage::Inference {
            generation,
            detector: kind,
            frame_id,
            result,
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_detector_replays_then_falls_back() {
        let detector = ScriptedDetector::new("human");
        detector.push_detection(true);
        detector.push_error("model unavailable");
        detector.set_fallback(2);

        let frame = FrameData::filled_gray(1, 2, 2, 0);
        assert_eq!(detector.detect(&frame).unwrap().len(), 1);
        assert!(detector.detect(&frame).is_err());
        assert_eq!(detector.detect(&frame).unwrap().len(), 2);
        assert_eq!(detector.calls(), 3);
    }

    #[test]
    fn test_null_detector_finds_nothing() {
        let detector = NullDetector::new(DetectorKind::Face);
        assert_eq!(detector.name(), "null-face");
        assert!(detector
            .detect(&FrameData::filled_gray(1, 2, 2, 0))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_submit_posts_tagged_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let detector = Arc::new(ScriptedDetector::new("face"));
        detector.push_regions(3);

        submit(
            detector,
            DetectorKind::Face,
            FrameData::filled_gray(42, 2, 2, 0),
            7,
            tx,
        );

        match rx.recv().await.unwrap() {
            EngineMessage::Inference {
                generation,
                detector,
                frame_id,
                result,
            } => {
                assert_eq!(generation, 7);
                assert_eq!(detector, DetectorKind::Face);
                assert_eq!(frame_id, 42);
                assert_eq!(result.unwrap().len(), 3);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }
}
