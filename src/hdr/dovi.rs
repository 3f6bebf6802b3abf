//! Thin wrapper around the `dovi_tool` binary: RPU extraction and injection.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::utils::{Error, ProcessRunner, Result, DEFAULT_MIN_OUTPUT_BYTES};

const DOVI_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct DoviTool {
    path: String,
}

impl DoviTool {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Extracts the RPU stream from `input` into `output_rpu`. Doubles as the
    /// classification probe: success here means the source carries Dolby Vision.
    pub async fn extract_rpu(&self, input: &Path, output_rpu: &Path) -> Result<()> {
        info!("extracting RPU: {} -> {}", input.display(), output_rpu.display());
        let args = vec![
            "extract-rpu".to_string(),
            input.to_string_lossy().into_owned(),
            "-o".to_string(),
            output_rpu.to_string_lossy().into_owned(),
        ];
        let outcome = ProcessRunner::run(&self.path, &args, Some(DOVI_TIMEOUT)).await?;
        if !outcome.ok {
            return Err(Error::hdr(format!("dovi_tool extract-rpu failed for {}", input.display())));
        }
        ProcessRunner::validate_output(output_rpu, DEFAULT_MIN_OUTPUT_BYTES).await
    }

    /// Injects a previously extracted RPU stream into a re-encoded elementary stream.
    pub async fn inject_rpu(&self, input_hevc: &Path, rpu_file: &Path, output: &Path) -> Result<()> {
        info!(
            "injecting RPU: {} + {} -> {}",
            input_hevc.display(),
            rpu_file.display(),
            output.display()
        );
        let args = vec![
            "inject-rpu".to_string(),
            "-i".to_string(),
            input_hevc.to_string_lossy().into_owned(),
            "--rpu-in".to_string(),
            rpu_file.to_string_lossy().into_owned(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        let outcome = ProcessRunner::run(&self.path, &args, Some(DOVI_TIMEOUT)).await?;
        if !outcome.ok {
            return Err(Error::hdr(format!("dovi_tool inject-rpu failed for {}", input_hevc.display())));
        }
        ProcessRunner::validate_output(output, DEFAULT_MIN_OUTPUT_BYTES).await
    }
}
