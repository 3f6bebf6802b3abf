use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Which external encoder front-end a profile drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EncoderKind {
    #[serde(rename = "HandbrakeAV1")]
    HandbrakeAv1,
    #[serde(rename = "ffmpeg")]
    Ffmpeg,
}

/// A static, read-only description of how to encode a video, loaded from a profile
/// YAML file. `res_decode` must preserve declaration order: the resolver walks it
/// front-to-back and raises its answer monotonically (see the resolution solver).
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub function: EncoderKind,
    pub video: Vec<String>,
    pub audio: Vec<String>,
    #[serde(default)]
    pub stereo: Option<Vec<String>>,
    pub hdr_enable: bool,
    pub fs_enable: bool,
    #[serde(deserialize_with = "deserialize_res_decode")]
    pub res_decode: Vec<(u32, f64)>,
    pub cq_threshold: f64,
    #[serde(rename = "defalut_cq")]
    pub default_cq: f64,
}

impl Profile {
    pub fn validate(&self) -> crate::utils::Result<()> {
        if self.video.is_empty() {
            return Err(crate::utils::Error::profile("profile video args must not be empty"));
        }
        if self.res_decode.is_empty() {
            return Err(crate::utils::Error::profile("profile res_decode table must not be empty"));
        }
        let mut prev = 0u32;
        for (res, _) in &self.res_decode {
            if *res < prev {
                return Err(crate::utils::Error::profile(
                    "profile res_decode entries must be in ascending resolution order",
                ));
            }
            prev = *res;
        }
        if self.cq_threshold <= 0.0 {
            return Err(crate::utils::Error::profile("cq_threshold must be positive"));
        }
        Ok(())
    }
}

fn deserialize_res_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<(u32, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    let mut out = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let res = key
            .as_u64()
            .ok_or_else(|| de::Error::custom("res_decode keys must be integer resolutions"))?
            as u32;
        let slope = value
            .as_f64()
            .ok_or_else(|| de::Error::custom("res_decode values must be numeric slopes"))?;
        out.push((res, slope));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StageToggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlackBarDetectionSettings {
    pub enabled: bool,
    pub frames_to_detect: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionCalculationSettings {
    pub enabled: bool,
    pub num_of_tests: u32,
    pub testing_resolutions: Vec<u32>,
    pub scene_length: f64,
    pub cq_value: f64,
    pub keep_best_slopes: f64,
    pub threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CqCalculationSettings {
    pub enabled: bool,
    pub cq_values: Vec<f64>,
    pub number_of_scenes: u32,
    pub cq_reference: f64,
    pub scene_length: f64,
    pub keep_best_scenes: f64,
    pub threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsCalculationSettings {
    pub enabled: bool,
    pub similarity_cutoff: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportOutputSettings {
    pub enabled: bool,
}

/// Per-stage toggles and tuning knobs, loaded from the `--settings` YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct TestSettings {
    pub black_bar_detection: BlackBarDetectionSettings,
    pub resolution_calculation: ResolutionCalculationSettings,
    pub cq_calculation: CqCalculationSettings,
    pub channels_calculation: ChannelsCalculationSettings,
    pub export_output: ExportOutputSettings,
    pub enable_delete: StageToggle,
}

impl TestSettings {
    pub fn validate(&self) -> crate::utils::Result<()> {
        if self.resolution_calculation.enabled && self.resolution_calculation.testing_resolutions.len() < 2 {
            return Err(crate::utils::Error::validation(
                "resolution_calculation.testing_resolutions needs at least two resolutions",
            ));
        }
        if self.cq_calculation.enabled && self.cq_calculation.cq_values.len() != 4 {
            return Err(crate::utils::Error::validation(
                "cq_calculation.cq_values must contain exactly four values",
            ));
        }
        if self.cq_calculation.enabled {
            let mut sorted = self.cq_calculation.cq_values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            if sorted != self.cq_calculation.cq_values {
                return Err(crate::utils::Error::validation(
                    "cq_calculation.cq_values must be sorted ascending",
                ));
            }
        }
        Ok(())
    }
}

/// Paths to external tools the pipeline shells out to.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    #[serde(default = "default_handbrake")]
    pub handbrake: String,
    #[serde(default = "default_scorer")]
    pub scorer: String,
    #[serde(default = "default_dovi_tool")]
    pub dovi_tool: String,
    #[serde(default = "default_hdr10plus_tool")]
    pub hdr10plus_tool: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            handbrake: default_handbrake(),
            scorer: default_scorer(),
            dovi_tool: default_dovi_tool(),
            hdr10plus_tool: default_hdr10plus_tool(),
        }
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_ffprobe() -> String {
    "ffprobe".to_string()
}
fn default_handbrake() -> String {
    "HandBrakeCLI".to_string()
}
fn default_scorer() -> String {
    "vqa_scorer".to_string()
}
fn default_dovi_tool() -> String {
    "dovi_tool".to_string()
}
fn default_hdr10plus_tool() -> String {
    "hdr10plus_tool".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn res_decode_preserves_declaration_order() {
        let yaml = r#"
function: ffmpeg
video: ["-c:v", "libsvtav1"]
audio: ["-c:a", "copy"]
hdr_enable: true
fs_enable: true
res_decode:
  854: -10.0
  1280: -0.0001
  1920: -0.000069
  3840: -0.00004
cq_threshold: 0.6
defalut_cq: 28.0
"#;
        let profile: Profile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            profile.res_decode,
            vec![(854, -10.0), (1280, -0.0001), (1920, -0.000069), (3840, -0.00004)]
        );
        assert_eq!(profile.default_cq, 28.0);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn profile_rejects_empty_video_args() {
        let profile = Profile {
            function: EncoderKind::Ffmpeg,
            video: vec![],
            audio: vec![],
            stereo: None,
            hdr_enable: false,
            fs_enable: false,
            res_decode: vec![(854, -1.0)],
            cq_threshold: 0.6,
            default_cq: 28.0,
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn settings_reject_wrong_cq_value_count() {
        let settings = TestSettings {
            black_bar_detection: BlackBarDetectionSettings { enabled: true, frames_to_detect: 16 },
            resolution_calculation: ResolutionCalculationSettings {
                enabled: false,
                num_of_tests: 2,
                testing_resolutions: vec![854, 3840],
                scene_length: 3.0,
                cq_value: 25.0,
                keep_best_slopes: 0.6,
                threads: 2,
            },
            cq_calculation: CqCalculationSettings {
                enabled: true,
                cq_values: vec![15.0, 18.0, 27.0],
                number_of_scenes: 3,
                cq_reference: 1.0,
                scene_length: 3.0,
                keep_best_scenes: 0.6,
                threads: 2,
            },
            channels_calculation: ChannelsCalculationSettings { enabled: false, similarity_cutoff: 0.95, duration: 5.0 },
            export_output: ExportOutputSettings { enabled: true },
            enable_delete: StageToggle { enabled: true },
        };
        assert!(settings.validate().is_err());
    }
}
