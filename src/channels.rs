//! Audio channel similarity check: extracts a bounded window of audio, decodes it, and
//! counts how many channels actually carry distinct content so a stereo downmix can be
//! chosen for sources whose surround channels are silent or duplicated.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ChannelsCalculationSettings;
use crate::utils::{Error, ProcessRunner, Result};

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ChannelAnalyzer {
    ffmpeg_path: String,
}

impl ChannelAnalyzer {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self { ffmpeg_path: ffmpeg_path.into() }
    }

    /// Returns the number of distinct audio channels (1, 2, 4, or 6), defaulting to a
    /// stereo mixdown when the source is too short to analyze or any step fails.
    pub async fn detect(&self, source: &Path, workspace: &Path, orig_duration: f64, settings: &ChannelsCalculationSettings) -> Result<u32> {
        if orig_duration < settings.duration {
            debug!("source shorter than channel-analysis window, defaulting to stereo");
            return Ok(2);
        }

        let wav_path = workspace.join("channels_probe.wav");
        self.extract_audio(source, &wav_path, settings.duration).await?;

        let reader = hound::WavReader::open(&wav_path)
            .map_err(|e| Error::tool(format!("could not open extracted audio {}: {e}", wav_path.display())))?;

        let spec = reader.spec();
        let num_channels = spec.channels as usize;
        if num_channels <= 1 {
            info!("source audio is mono, no channel comparison needed");
            return Ok(1);
        }

        let samples: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f64)
                .collect(),
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f64)
                .collect(),
        };

        let per_channel: Vec<Vec<f64>> = (0..num_channels)
            .map(|c| samples.iter().skip(c).step_by(num_channels).copied().collect())
            .collect();

        Ok(reduce_channel_count(&per_channel, settings.similarity_cutoff))
    }

    async fn extract_audio(&self, source: &Path, output: &Path, duration: f64) -> Result<()> {
        let args = vec![
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-t".to_string(),
            format!("{duration}"),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(EXTRACT_TIMEOUT)).await?;
        if !outcome.ok {
            warn!("audio extraction failed for {}", source.display());
            return Err(Error::tool(format!("audio extraction failed for {}", source.display())));
        }
        Ok(())
    }
}

/// Pairwise-compares channels by mean squared error, marking later duplicates as
/// redundant, then snaps the surviving count to the nearest standard layout.
fn reduce_channel_count(per_channel: &[Vec<f64>], similarity_cutoff: f64) -> u32 {
    let n = per_channel.len();
    let mut distinct = vec![true; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let mse = mean_squared_error(&per_channel[i], &per_channel[j]);
            if mse <= similarity_cutoff {
                distinct[j] = false;
            }
            if mse == 0.0 {
                distinct[j] = false;
                distinct[i] = false;
            }
        }
    }

    let surviving = distinct.iter().filter(|&&d| d).count();
    match surviving {
        0 => 2,
        3 => 4,
        count if count >= 5 => 6,
        count => count as u32,
    }
}

fn mean_squared_error(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    a.iter().zip(b.iter()).take(len).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_channel_count_collapses_identical_channels() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let channels = vec![a.clone(), a.clone(), a.clone()];
        assert_eq!(reduce_channel_count(&channels, 0.001), 2);
    }

    #[test]
    fn reduce_channel_count_keeps_distinct_stereo() {
        let left = vec![1.0, 2.0, 3.0, 4.0];
        let right = vec![4.0, 3.0, 2.0, 1.0];
        assert_eq!(reduce_channel_count(&[left, right], 0.001), 2);
    }

    #[test]
    fn reduce_channel_count_snaps_three_survivors_to_four() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![10.0, 20.0, 30.0];
        let c = vec![100.0, 200.0, 300.0];
        assert_eq!(reduce_channel_count(&[a, b, c], 0.001), 4);
    }

    #[test]
    fn mean_squared_error_is_zero_for_identical_series() {
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(mean_squared_error(&a, &a), 0.0);
    }
}
