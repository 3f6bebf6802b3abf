//! Media probing: a handful of narrow, single-purpose ffprobe invocations that each
//! degrade to a neutral value rather than fail the pipeline.

use std::path::Path;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::utils::Result;

/// VUI / color description fields; each defaults to `"unknown"` when ffprobe has
/// nothing to say about them rather than leaving the caller to juggle `Option`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vui {
    pub color_primaries: String,
    pub color_transfer: String,
    pub color_space: String,
    pub chroma_location: String,
}

impl Default for Vui {
    fn default() -> Self {
        Self {
            color_primaries: "unknown".to_string(),
            color_transfer: "unknown".to_string(),
            color_space: "unknown".to_string(),
            chroma_location: "unknown".to_string(),
        }
    }
}

/// Dynamic-range side data, present only on HDR sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideData {
    pub mastering_display: Option<String>,
    pub max_cll: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MediaProbe {
    ffprobe_path: String,
}

impl MediaProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Option<String> {
        let output = Command::new(&self.ffprobe_path).args(args).output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Duration in seconds, or `0.0` if the probe fails.
    pub async fn duration(&self, path: &Path) -> f64 {
        let input = path.to_string_lossy();
        let out = self
            .run(&[
                "-v", "error",
                "-show_entries", "format=duration",
                "-of", "default=noprint_wrappers=1:nokey=1",
                &input,
            ])
            .await;

        out.and_then(|s| s.parse::<f64>().ok()).unwrap_or_else(|| {
            warn!("duration probe failed for {}, using 0.0", path.display());
            0.0
        })
    }

    /// `(width, height)`, or `(0, 0)` if the probe fails.
    pub async fn resolution(&self, path: &Path) -> (u32, u32) {
        let input = path.to_string_lossy();
        let out = self
            .run(&[
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "stream=width,height",
                "-of", "csv=p=0:s=x",
                &input,
            ])
            .await;

        out.and_then(|s| {
            let mut parts = s.trim().split('x');
            let w: u32 = parts.next()?.parse().ok()?;
            let h: u32 = parts.next()?.parse().ok()?;
            Some((w, h))
        })
        .unwrap_or_else(|| {
            warn!("resolution probe failed for {}, using 0x0", path.display());
            (0, 0)
        })
    }

    /// Frame rate: tries the constant-frame-rate field first, then falls back to the
    /// variable-frame-rate average; rejects anything outside `[10, 1000]` fps.
    pub async fn framerate(&self, path: &Path) -> f64 {
        let input = path.to_string_lossy();
        for field in ["r_frame_rate", "avg_frame_rate"] {
            let out = self
                .run(&[
                    "-v", "error",
                    "-select_streams", "v:0",
                    "-show_entries", &format!("stream={field}"),
                    "-of", "default=noprint_wrappers=1:nokey=1",
                    &input,
                ])
                .await;

            if let Some(raw) = out {
                if let Some(fps) = parse_fraction(&raw) {
                    if (10.0..=1000.0).contains(&fps) {
                        return fps;
                    }
                }
            }
        }
        warn!("framerate probe failed for {}, using 0.0", path.display());
        0.0
    }

    /// `true` iff the primary video stream is HEVC.
    pub async fn is_hevc(&self, path: &Path) -> bool {
        let input = path.to_string_lossy();
        self.run(&[
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=codec_name",
            "-of", "default=noprint_wrappers=1:nokey=1",
            &input,
        ])
        .await
        .map(|s| s.trim() == "hevc")
        .unwrap_or(false)
    }

    /// `true` if the container's index precedes its payload, meaning a seek can be
    /// satisfied without reading the whole file. Detected by sniffing the first 1 MiB.
    pub async fn fast_seek(&self, path: &Path) -> bool {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(_) => return false,
        };

        let mut buf = vec![0u8; 1024 * 1024];
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(_) => return false,
        };
        buf.truncate(n);

        if let (Some(moov), Some(mdat)) = (find_bytes(&buf, b"moov"), find_bytes(&buf, b"mdat")) {
            return moov < mdat;
        }

        const CUES: [u8; 4] = [0x1C, 0x53, 0xBB, 0x6B];
        const CLUSTER: [u8; 4] = [0x1F, 0x43, 0xB6, 0x75];
        if let (Some(cues), Some(cluster)) = (find_bytes(&buf, &CUES), find_bytes(&buf, &CLUSTER)) {
            return cues < cluster;
        }

        false
    }

    /// VUI fields plus any mastering-display / MaxCLL side data present on stream 0.
    pub async fn static_metadata(&self, path: &Path) -> Result<(Vui, SideData)> {
        let input = path.to_string_lossy();
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "stream=color_primaries,color_transfer,color_space,chroma_location",
                "-show_entries", "side_data",
                "-print_format", "json",
                &input,
            ])
            .output()
            .await?;

        if !output.status.success() {
            debug!("static metadata probe failed for {}", path.display());
            return Ok((Vui::default(), SideData::default()));
        }

        let json: serde_json::Value =
            serde_json::from_slice(&output.stdout).unwrap_or(serde_json::Value::Null);

        let stream = json["streams"].get(0).cloned().unwrap_or(serde_json::Value::Null);
        let vui = Vui {
            color_primaries: text_field(&stream, "color_primaries"),
            color_transfer: text_field(&stream, "color_transfer"),
            color_space: text_field(&stream, "color_space"),
            chroma_location: text_field(&stream, "chroma_location"),
        };

        let mut side = SideData::default();
        if let Some(entries) = stream["side_data_list"].as_array() {
            for entry in entries {
                match entry["side_data_type"].as_str() {
                    Some("Mastering display metadata") => {
                        side.mastering_display = Some(entry.to_string());
                    }
                    Some("Content light level metadata") => {
                        side.max_cll = entry["max_content"].as_u64().map(|v| v.to_string());
                    }
                    _ => {}
                }
            }
        }

        Ok((vui, side))
    }
}

fn text_field(value: &serde_json::Value, key: &str) -> String {
    value[key].as_str().unwrap_or("unknown").to_string()
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_fraction(s: &str) -> Option<f64> {
    let s = s.trim();
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fraction_handles_ratios_and_plain_numbers() {
        assert_eq!(parse_fraction("24000/1001"), Some(24000.0 / 1001.0));
        assert_eq!(parse_fraction("25/1"), Some(25.0));
        assert_eq!(parse_fraction("29.97"), Some(29.97));
        assert_eq!(parse_fraction("0/0"), None);
        assert_eq!(parse_fraction("garbage"), None);
    }

    #[test]
    fn find_bytes_locates_subsequence() {
        let haystack = b"....moov....mdat....";
        assert_eq!(find_bytes(haystack, b"moov"), Some(4));
        assert_eq!(find_bytes(haystack, b"mdat"), Some(12));
        assert_eq!(find_bytes(haystack, b"nope"), None);
    }

    #[tokio::test]
    async fn duration_defaults_to_zero_for_missing_file() {
        let probe = MediaProbe::new("ffprobe");
        let missing = Path::new("/nonexistent/path/to/video.mkv");
        assert_eq!(probe.duration(missing).await, 0.0);
    }
}
