//! Black-bar detection: sample frames, inspect the central column pixel-by-pixel for
//! near-black runs from the top and bottom, then take the minimum across frames.

use std::path::Path;

use image::RgbImage;
use tracing::{debug, warn};

use crate::sampler::FrameSampler;
use crate::utils::Result;

/// A pixel counts as "black" when every channel is below this value.
const BLACK_CHANNEL_THRESHOLD: u8 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropResult {
    pub top: u32,
    pub bottom: u32,
}

/// Counts the longest near-black run from the top and from the bottom along the
/// image's central column.
pub fn scan_central_column(image: &RgbImage) -> CropResult {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return CropResult::default();
    }
    let cx = width / 2;

    let is_black = |y: u32| {
        let p = image.get_pixel(cx, y);
        p[0] < BLACK_CHANNEL_THRESHOLD && p[1] < BLACK_CHANNEL_THRESHOLD && p[2] < BLACK_CHANNEL_THRESHOLD
    };

    let mut top = 0;
    for y in 0..height {
        if is_black(y) {
            top += 1;
        } else {
            break;
        }
    }

    let mut bottom = 0;
    for y in (0..height).rev() {
        if is_black(y) {
            bottom += 1;
        } else {
            break;
        }
    }

    CropResult { top, bottom }
}

/// Samples `frame_count` frames across the source and returns the per-side minimum
/// black-bar run, i.e. the crop that's safe for every sampled frame.
pub async fn detect(
    sampler: &FrameSampler,
    input: &Path,
    workspace: &Path,
    duration: f64,
    frame_count: u32,
) -> Result<CropResult> {
    let timestamps = sampler.sample_timestamps(duration, frame_count);
    let mut results = Vec::with_capacity(timestamps.len());

    for (i, ts) in timestamps.iter().enumerate() {
        let png_path = workspace.join(format!("blackbar_{i}.png"));
        if let Err(e) = sampler.extract_png(input, *ts, &png_path).await {
            warn!("black-bar sample {i} at {ts:.2}s failed, skipping: {e}");
            continue;
        }
        match image::open(&png_path) {
            Ok(img) => results.push(scan_central_column(&img.to_rgb8())),
            Err(e) => debug!("failed to decode black-bar sample {i}: {e}"),
        }
    }

    if results.is_empty() {
        warn!("no black-bar samples succeeded; defaulting to no crop");
        return Ok(CropResult::default());
    }

    let top = results.iter().map(|r| r.top).min().unwrap_or(0);
    let bottom = results.iter().map(|r| r.bottom).min().unwrap_or(0);
    Ok(CropResult { top, bottom })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn letterboxed(width: u32, height: u32, top_bar: u32, bottom_bar: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
        for y in 0..top_bar.min(height) {
            img.put_pixel(width / 2, y, Rgb([0, 0, 0]));
        }
        for y in (height - bottom_bar.min(height))..height {
            img.put_pixel(width / 2, y, Rgb([2, 1, 3]));
        }
        img
    }

    #[test]
    fn scan_detects_symmetric_bars() {
        let img = letterboxed(1920, 1080, 60, 60);
        let result = scan_central_column(&img);
        assert_eq!(result, CropResult { top: 60, bottom: 60 });
    }

    #[test]
    fn scan_reports_zero_when_no_bars() {
        let img = RgbImage::from_pixel(1920, 1080, Rgb([200, 200, 200]));
        let result = scan_central_column(&img);
        assert_eq!(result, CropResult { top: 0, bottom: 0 });
    }

    #[test]
    fn scan_ignores_near_black_above_threshold() {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([200, 200, 200]));
        img.put_pixel(50, 0, Rgb([15, 15, 15]));
        let result = scan_central_column(&img);
        assert_eq!(result, CropResult { top: 0, bottom: 0 });
    }
}
