//! Extracts single PNG frames at evenly spaced timestamps, used by the black-bar
//! detector to sample the source without decoding the whole video.

use std::path::Path;
use std::time::Duration;

use crate::utils::{Error, ProcessRunner, Result};

const PNG_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_PNG_BYTES: u64 = 256;

#[derive(Debug, Clone)]
pub struct FrameSampler {
    ffmpeg_path: String,
}

impl FrameSampler {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Evenly distributes `count` timestamps inside `[margin, duration - margin]` so
    /// samples avoid black intro/outro frames at the very edges of the file.
    pub fn sample_timestamps(&self, duration: f64, count: u32) -> Vec<f64> {
        if count == 0 || duration <= 0.0 {
            return Vec::new();
        }
        let margin = duration * 0.05;
        let usable = (duration - 2.0 * margin).max(0.0);
        (0..count)
            .map(|i| margin + usable * (i as f64 + 1.0) / (count as f64 + 1.0))
            .collect()
    }

    pub async fn extract_png(&self, input: &Path, timestamp: f64, output: &Path) -> Result<()> {
        let args = vec![
            "-ss".to_string(),
            format!("{timestamp:.3}"),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(PNG_PROBE_TIMEOUT)).await?;
        if !outcome.ok {
            return Err(Error::ffmpeg(format!(
                "frame extraction at {timestamp:.3}s failed for {}",
                input.display()
            )));
        }
        ProcessRunner::validate_output(output, MIN_PNG_BYTES).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_timestamps_are_evenly_spaced_with_margin() {
        let sampler = FrameSampler::new("ffmpeg");
        let ts = sampler.sample_timestamps(100.0, 3);
        assert_eq!(ts.len(), 3);
        assert!(ts[0] > 5.0 && ts[0] < 30.0);
        assert!(ts[2] > 70.0 && ts[2] < 95.0);
        assert!(ts.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn sample_timestamps_empty_for_zero_duration() {
        let sampler = FrameSampler::new("ffmpeg");
        assert!(sampler.sample_timestamps(0.0, 5).is_empty());
        assert!(sampler.sample_timestamps(100.0, 0).is_empty());
    }
}
