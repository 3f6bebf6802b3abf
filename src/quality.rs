//! Bridges to the external scoring tools: a bespoke "vqa_scorer" binary for absolute
//! quality scores, and ffmpeg's VMAF filter for pairwise reference comparisons.

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::utils::{Error, ProcessRunner, Result};

const SCORE_TIMEOUT: Duration = Duration::from_secs(1200);
const VMAF_TIMEOUT: Duration = Duration::from_secs(900);

static SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"quality score of the video.*?([0-9]*\.[0-9]+)").unwrap());
static VMAF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"harmonic_mean="([0-9.]+)""#).unwrap());

#[derive(Debug, Clone)]
pub struct QualityScorer {
    scorer_path: String,
    ffmpeg_path: String,
}

impl QualityScorer {
    pub fn new(scorer_path: impl Into<String>, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            scorer_path: scorer_path.into(),
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Runs the no-reference scorer against `clip` `num_runs` times and averages the
    /// parsed scores, since a single run's score is noisy enough to need repeats.
    pub async fn score(&self, clip: &Path, num_runs: u32) -> Result<f64> {
        let args = vec![clip.to_string_lossy().into_owned()];
        let mut scores = Vec::with_capacity(num_runs.max(1) as usize);

        for _ in 0..num_runs.max(1) {
            let output = run_capture(&self.scorer_path, &args, SCORE_TIMEOUT).await?;
            let score = SCORE_RE
                .captures(&output)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .ok_or_else(|| Error::solver(format!("could not parse quality score from scorer output: {output}")))?;
            scores.push(score);
        }

        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Computes VMAF between a reference and a distorted clip via ffmpeg's libvmaf
    /// filter, reading the harmonic mean back out of the XML log it writes.
    pub async fn vmaf(&self, reference: &Path, distorted: &Path, log_path: &Path, threads: usize) -> Result<f64> {
        let filter = format!(
            "[0:v]setpts=PTS-STARTPTS[ref];[1:v]setpts=PTS-STARTPTS[dist];\
             [dist][ref]libvmaf=log_fmt=xml:log_path={}:n_threads={threads}",
            log_path.to_string_lossy()
        );

        let args = vec![
            "-i".to_string(),
            reference.to_string_lossy().into_owned(),
            "-i".to_string(),
            distorted.to_string_lossy().into_owned(),
            "-lavfi".to_string(),
            filter,
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(VMAF_TIMEOUT)).await?;
        if !outcome.ok {
            return Err(Error::solver(format!(
                "VMAF run failed comparing {} against {}",
                reference.display(),
                distorted.display()
            )));
        }

        let log = tokio::fs::read_to_string(log_path)
            .await
            .map_err(|e| Error::solver(format!("could not read VMAF log {}: {e}", log_path.display())))?;

        VMAF_RE
            .captures(&log)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| Error::solver(format!("could not find harmonic_mean in VMAF log {}", log_path.display())))
    }
}

async fn run_capture(program: &str, args: &[String], timeout: Duration) -> Result<String> {
    debug!("Running: {} {}", program, args.join(" "));
    let output = tokio::time::timeout(timeout, tokio::process::Command::new(program).args(args).output())
        .await
        .map_err(|_| Error::tool(format!("{program} timed out")))?
        .map_err(|e| Error::tool(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        return Err(Error::tool(format!(
            "{program} exited with {:?}",
            output.status.code()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_regex_extracts_trailing_float() {
        let sample = "Analyzing clip...\nThe quality score of the video is: 0.87321\n";
        let captured = SCORE_RE.captures(sample).and_then(|c| c.get(1)).unwrap();
        assert_eq!(captured.as_str(), "0.87321");
    }

    #[test]
    fn vmaf_regex_extracts_harmonic_mean() {
        let sample = r#"<metric name="vmaf" min="90.1" max="99.9" mean="95.2" harmonic_mean="94.987"/>"#;
        let captured = VMAF_RE.captures(sample).and_then(|c| c.get(1)).unwrap();
        assert_eq!(captured.as_str(), "94.987");
    }
}
