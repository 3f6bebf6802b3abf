use std::path::Path;

use crate::config::types::{Profile, TestSettings, ToolsConfig};
use crate::utils::Result;

impl Profile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let profile: Profile = serde_yaml::from_str(&raw)?;
        profile.validate()?;
        Ok(profile)
    }
}

impl TestSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings: TestSettings = serde_yaml::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }
}

impl ToolsConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let tools: ToolsConfig = serde_yaml::from_str(&raw)?;
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_load_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.yaml");
        std::fs::write(
            &path,
            r#"
function: ffmpeg
video: ["-c:v", "libsvtav1", "-preset", "4"]
audio: ["-c:a", "copy"]
hdr_enable: true
fs_enable: true
res_decode:
  854: -10.0
  1920: -0.00007
  3840: -0.00004
cq_threshold: 0.6
defalut_cq: 28.0
"#,
        )
        .unwrap();

        let profile = Profile::load(&path).unwrap();
        assert_eq!(profile.default_cq, 28.0);
        assert_eq!(profile.res_decode.len(), 3);
    }

    #[test]
    fn settings_load_validates_cq_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(
            &path,
            r#"
black_bar_detection:
  enabled: true
  frames_to_detect: 16
resolution_calculation:
  enabled: true
  num_of_tests: 15
  testing_resolutions: [854, 3840]
  scene_length: 3.0
  cq_value: 25.0
  keep_best_slopes: 0.6
  threads: 4
cq_calculation:
  enabled: true
  cq_values: [15.0, 18.0, 27.0, 36.0]
  number_of_scenes: 3
  cq_reference: 1.0
  scene_length: 3.0
  keep_best_scenes: 0.6
  threads: 4
channels_calculation:
  enabled: false
  similarity_cutoff: 0.95
  duration: 5.0
export_output:
  enabled: true
enable_delete:
  enabled: true
"#,
        )
        .unwrap();

        let settings = TestSettings::load(&path).unwrap();
        assert_eq!(settings.cq_calculation.cq_values.len(), 4);
        assert!(settings.resolution_calculation.enabled);
    }
}
