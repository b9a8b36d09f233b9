use crate::error::AnalyzerError;
use crate::frame::FrameData;
use image::{Luma, Rgb};
use imageproc::map::map_colors2;
use tracing::trace;

/// Pixel-difference motion magnitude between two frames.
///
/// Builds the absolute difference image and returns its mean intensity,
/// averaged over color channels and scaled to [0, 1].
pub struct FrameDifferenceMotionScorer;

impl FrameDifferenceMotionScorer {
    pub fn score(current: &FrameData, previous: &FrameData) -> Result<f32, AnalyzerError> {
        if current.dimensions() != previous.dimensions() {
            return Err(AnalyzerError::DimensionMismatch {
                current: current.dimensions(),
                previous: previous.dimensions(),
            });
        }

        let pixel_count = current.width as u64 * current.height as u64;
        if pixel_count == 0 {
            return Err(AnalyzerError::FrameProcessing {
                details: format!("Frame {} is empty", current.id),
            });
        }

        let both_luma = !current.format.is_color() && !previous.format.is_color();
        let mean = if both_luma {
            let diff = map_colors2(
                &current.to_gray_image()?,
                &previous.to_gray_image()?,
                |a: Luma<u8>, b: Luma<u8>| Luma([a[0].abs_diff(b[0])]),
            );
            let sum: u64 = diff.pixels().map(|p| p[0] as u64).sum();
            sum as f64 / pixel_count as f64
        } else {
            let diff = map_colors2(
                &current.to_rgb_image()?,
                &previous.to_rgb_image()?,
                |a: Rgb<u8>, b: Rgb<u8>| {
                    Rgb([
                        a[0].abs_diff(b[0]),
                        a[1].abs_diff(b[1]),
                        a[2].abs_diff(b[2]),
                    ])
                },
            );
            let sum: u64 = diff
                .pixels()
                .map(|p| p[0] as u64 + p[1] as u64 + p[2] as u64)
                .sum();
            sum as f64 / (pixel_count * 3) as f64
        };

        let score = (mean / 255.0).clamp(0.0, 1.0) as f32;
        trace!(
            "Frame {} vs {}: motion score {:.5}",
            current.id,
            previous.id,
            score
        );
        Ok(score)
    }
}

/// Holds the single previous frame and scores each new one against it
#[derive(Default)]
pub struct ConsecutiveFrameScorer {
    previous: Option<FrameData>,
}

impl ConsecutiveFrameScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score `frame` against the previous one. The first frame only seeds the
    /// comparison and yields `None`. The frame replaces the previous one even
    /// when scoring fails.
    pub fn push(&mut self, frame: FrameData) -> Result<Option<f32>, AnalyzerError> {
        let result = match &self.previous {
            Some(previous) => FrameDifferenceMotionScorer::score(&frame, previous).map(Some),
            None => Ok(None),
        };
        self.previous = Some(frame);
        result
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFormat;
    use std::time::SystemTime;

    /// 10x10 gray frame with the first `bright` pixels at 255
    fn frame_with_bright_pixels(id: u64, bright: usize) -> FrameData {
        let mut data = vec![0u8; 100];
        for px in data.iter_mut().take(bright) {
            *px = 255;
        }
        FrameData::new(id, SystemTime::now(), data, 10, 10, FrameFormat::Gray8)
    }

    #[test]
    fn test_identical_frames_score_zero() {
        let a = FrameData::filled_gray(1, 8, 8, 90);
        let b = FrameData::filled_gray(2, 8, 8, 90);
        assert_eq!(FrameDifferenceMotionScorer::score(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_full_inversion_scores_one() {
        let black = FrameData::filled_gray(1, 4, 4, 0);
        let white = FrameData::filled_gray(2, 4, 4, 255);
        assert_eq!(FrameDifferenceMotionScorer::score(&white, &black).unwrap(), 1.0);
    }

    #[test]
    fn test_score_is_mean_pixel_difference() {
        let base = frame_with_bright_pixels(1, 0);
        let three = frame_with_bright_pixels(2, 3);
        let score = FrameDifferenceMotionScorer::score(&three, &base).unwrap();
        assert!((score - 0.03).abs() < 1e-6);
    }

    #[test]
    fn test_color_frames_average_channels() {
        let red = FrameData::new(
            1,
            SystemTime::now(),
            vec![255, 0, 0],
            1,
            1,
            FrameFormat::Rgb24,
        );
        let black = FrameData::new(2, SystemTime::now(), vec![0, 0, 0], 1, 1, FrameFormat::Rgb24);
        let score = FrameDifferenceMotionScorer::score(&red, &black).unwrap();
        assert!((score - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let small = FrameData::filled_gray(1, 4, 4, 0);
        let large = FrameData::filled_gray(2, 8, 8, 0);
        assert_eq!(
            FrameDifferenceMotionScorer::score(&large, &small),
            Err(AnalyzerError::DimensionMismatch {
                current: (8, 8),
                previous: (4, 4),
            })
        );
    }

    #[test]
    fn test_first_frame_yields_no_score() {
        let mut scorer = ConsecutiveFrameScorer::new();
        assert_eq!(scorer.push(frame_with_bright_pixels(1, 0)).unwrap(), None);
        assert!(scorer.has_previous());

        let score = scorer.push(frame_with_bright_pixels(2, 1)).unwrap().unwrap();
        assert!((score - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_failed_frame_still_becomes_previous() {
        let mut scorer = ConsecutiveFrameScorer::new();
        scorer.push(FrameData::filled_gray(1, 4, 4, 0)).unwrap();
        assert!(scorer.push(FrameData::filled_gray(2, 8, 8, 0)).is_err());

        let score = scorer.push(FrameData::filled_gray(3, 8, 8, 0)).unwrap();
        assert_eq!(score, Some(0.0));

        scorer.reset();
        assert!(!scorer.has_previous());
    }
}
