use crate::error::AnalyzerError;
use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit luminance, one byte per pixel
    Gray8,
    /// Packed RGB, three bytes per pixel
    Rgb24,
    /// Packed BGRA, four bytes per pixel (alpha ignored)
    Bgra32,
    /// YUV 4:2:2, two bytes per pixel
    Yuyv,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Gray8 => 1,
            FrameFormat::Rgb24 => 3,
            FrameFormat::Bgra32 => 4,
            FrameFormat::Yuyv => 2,
        }
    }

    /// Whether the format carries chroma
    pub fn is_color(&self) -> bool {
        matches!(self, FrameFormat::Rgb24 | FrameFormat::Bgra32)
    }
}

/// Immutable pixel buffer handed from the capture session to analysis
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Per-session frame sequence number
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw pixel data (shared so the analysis path never copies it)
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Uniform gray frame, handy for synthetic sources
    pub fn filled_gray(id: u64, width: u32, height: u32, value: u8) -> Self {
        Self::new(
            id,
            SystemTime::now(),
            vec![value; width as usize * height as usize],
            width,
            height,
            FrameFormat::Gray8,
        )
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Convert to an RGB image; luminance-only formats are replicated per channel
    pub fn to_rgb_image(&self) -> Result<RgbImage, AnalyzerError> {
        self.ensure_size()?;

        match self.format {
            FrameFormat::Rgb24 => RgbImage::from_raw(self.width, self.height, self.data.to_vec())
                .ok_or_else(|| AnalyzerError::FrameProcessing {
                    details: "Failed to create RGB image from raw data".to_string(),
                }),
            FrameFormat::Bgra32 => {
                let mut rgb = RgbImage::new(self.width, self.height);
                for (i, px) in self.data.chunks_exact(4).enumerate() {
                    let x = i as u32 % self.width;
                    let y = i as u32 / self.width;
                    rgb.put_pixel(x, y, Rgb([px[2], px[1], px[0]]));
                }
                Ok(rgb)
            }
            FrameFormat::Gray8 | FrameFormat::Yuyv => {
                let gray = self.to_gray_image()?;
                let mut rgb = RgbImage::new(self.width, self.height);
                for (x, y, luma) in gray.enumerate_pixels() {
                    rgb.put_pixel(x, y, Rgb([luma[0]; 3]));
                }
                Ok(rgb)
            }
        }
    }

    /// Convert to an 8-bit luminance image
    pub fn to_gray_image(&self) -> Result<GrayImage, AnalyzerError> {
        self.ensure_size()?;

        match self.format {
            FrameFormat::Gray8 => GrayImage::from_raw(self.width, self.height, self.data.to_vec())
                .ok_or_else(|| AnalyzerError::FrameProcessing {
                    details: "Failed to create grayscale image from raw data".to_string(),
                }),
            FrameFormat::Yuyv => Ok(self.yuyv_to_gray()),
            FrameFormat::Rgb24 | FrameFormat::Bgra32 => {
                let rgb = self.to_rgb_image()?;
                let mut gray = GrayImage::new(self.width, self.height);
                for (x, y, px) in rgb.enumerate_pixels() {
                    let value =
                        (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) as u8;
                    gray.put_pixel(x, y, Luma([value]));
                }
                Ok(gray)
            }
        }
    }

    // YUYV: Y0 U Y1 V (4 bytes for 2 pixels)
    fn yuyv_to_gray(&self) -> GrayImage {
        let width = self.width;
        let height = self.height;
        let mut gray = GrayImage::new(width, height);

        for y in 0..height {
            for x in 0..(width / 2) {
                let base = ((y * width / 2 + x) * 4) as usize;
                if base + 3 < self.data.len() {
                    gray.put_pixel(x * 2, y, Luma([self.data[base]]));
                    if x * 2 + 1 < width {
                        gray.put_pixel(x * 2 + 1, y, Luma([self.data[base + 2]]));
                    }
                }
            }
        }

        gray
    }

    fn ensure_size(&self) -> Result<(), AnalyzerError> {
        if self.validate_size() {
            Ok(())
        } else {
            Err(AnalyzerError::FrameProcessing {
                details: format!(
                    "Frame {} has {} bytes, expected {} for {}x{} {:?}",
                    self.id,
                    self.data.len(),
                    self.expected_size(),
                    self.width,
                    self.height,
                    self.format
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_validation() {
        let frame = FrameData::new(1, SystemTime::now(), vec![0; 12], 2, 2, FrameFormat::Rgb24);
        assert!(frame.validate_size());

        let short = FrameData::new(2, SystemTime::now(), vec![0; 5], 2, 2, FrameFormat::Rgb24);
        assert!(!short.validate_size());
        assert!(short.to_gray_image().is_err());
    }

    #[test]
    fn test_bgra_to_rgb_swaps_channels() {
        let frame = FrameData::new(
            1,
            SystemTime::now(),
            vec![10, 20, 30, 255],
            1,
            1,
            FrameFormat::Bgra32,
        );
        let rgb = frame.to_rgb_image().unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([30, 20, 10]));
    }

    #[test]
    fn test_yuyv_to_gray_uses_luma_bytes() {
        let frame = FrameData::new(
            1,
            SystemTime::now(),
            vec![50, 128, 200, 128],
            2,
            1,
            FrameFormat::Yuyv,
        );
        let gray = frame.to_gray_image().unwrap();
        assert_eq!(gray.get_pixel(0, 0)[0], 50);
        assert_eq!(gray.get_pixel(1, 0)[0], 200);
    }

    #[test]
    fn test_filled_gray_frame() {
        let frame = FrameData::filled_gray(3, 4, 2, 77);
        assert_eq!(frame.dimensions(), (4, 2));
        assert!(frame.validate_size());
        assert!(frame.to_gray_image().unwrap().pixels().all(|p| p[0] == 77));
    }
}
