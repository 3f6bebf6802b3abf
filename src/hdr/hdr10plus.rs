//! Thin wrapper around the `hdr10plus_tool` binary: metadata extraction and injection.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::utils::{Error, ProcessRunner, Result, DEFAULT_MIN_OUTPUT_BYTES};

const HDR10PLUS_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Hdr10PlusTool {
    path: String,
}

impl Hdr10PlusTool {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Extracts HDR10+ metadata to JSON. Doubles as the classification probe.
    pub async fn extract_metadata(&self, input: &Path, output_json: &Path) -> Result<()> {
        info!("extracting HDR10+ metadata: {} -> {}", input.display(), output_json.display());
        let args = vec![
            "extract".to_string(),
            input.to_string_lossy().into_owned(),
            "-o".to_string(),
            output_json.to_string_lossy().into_owned(),
        ];
        let outcome = ProcessRunner::run(&self.path, &args, Some(HDR10PLUS_TIMEOUT)).await?;
        if !outcome.ok {
            return Err(Error::hdr(format!("hdr10plus_tool extract failed for {}", input.display())));
        }
        ProcessRunner::validate_output(output_json, DEFAULT_MIN_OUTPUT_BYTES).await
    }

    pub async fn inject_metadata(&self, input_hevc: &Path, metadata_json: &Path, output: &Path) -> Result<()> {
        info!(
            "injecting HDR10+ metadata: {} + {} -> {}",
            input_hevc.display(),
            metadata_json.display(),
            output.display()
        );
        let args = vec![
            "inject".to_string(),
            "-i".to_string(),
            input_hevc.to_string_lossy().into_owned(),
            "-j".to_string(),
            metadata_json.to_string_lossy().into_owned(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        let outcome = ProcessRunner::run(&self.path, &args, Some(HDR10PLUS_TIMEOUT)).await?;
        if !outcome.ok {
            return Err(Error::hdr(format!("hdr10plus_tool inject failed for {}", input_hevc.display())));
        }
        ProcessRunner::validate_output(output, DEFAULT_MIN_OUTPUT_BYTES).await
    }
}
