//! Serializes a VPC plus its profile and test settings into a plain-text diagnostic
//! dump. Never parsed back in; purely for a human to inspect after a run.

use std::path::Path;

use crate::config::{Profile, TestSettings};
use crate::utils::Result;
use crate::vpc::Vpc;

pub async fn write(vpc: &Vpc, profile: &Profile, settings: &TestSettings, path: &Path) -> Result<()> {
    let mut out = String::new();

    out.push_str(&format!("orig_file_path: {}\n", vpc.orig_file_path.display()));
    out.push_str(&format!("output_file_name: {}\n", vpc.output_file_name));
    out.push_str(&format!("workspace: {}\n", vpc.workspace.display()));
    out.push_str(&format!("output_file_path: {}\n", vpc.output_file_path.display()));
    out.push_str(&format!("orig_h_res: {}\n", vpc.orig_h_res));
    out.push_str(&format!("orig_v_res: {}\n", vpc.orig_v_res));
    out.push_str(&format!("orig_duration: {}\n", vpc.orig_duration));
    out.push_str(&format!("orig_framerate: {}\n", vpc.orig_framerate));
    out.push_str(&format!("is_h265: {}\n", vpc.is_h265));
    out.push_str(&format!("fs_support: {}\n", vpc.fs_support));
    out.push_str(&format!("color_primaries: {}\n", vpc.vui.color_primaries));
    out.push_str(&format!("color_transfer: {}\n", vpc.vui.color_transfer));
    out.push_str(&format!("color_space: {}\n", vpc.vui.color_space));
    out.push_str(&format!("chroma_location: {}\n", vpc.vui.chroma_location));
    out.push_str(&format!("mastering_display: {}\n", vpc.side_data.mastering_display.as_deref().unwrap_or("none")));
    out.push_str(&format!("max_cll: {}\n", vpc.side_data.max_cll.as_deref().unwrap_or("none")));
    out.push_str(&format!("output_res: {}\n", vpc.output_res));
    out.push_str(&format!("output_cq: {}\n", vpc.output_cq));
    out.push_str(&format!("crop_top: {}\n", vpc.crop.0));
    out.push_str(&format!("crop_bottom: {}\n", vpc.crop.1));
    out.push_str(&format!("channels: {}\n", vpc.channels.map(|c| c.to_string()).unwrap_or_else(|| "unset".to_string())));
    out.push_str(&format!("hdr_type: {}\n", vpc.hdr_type.as_str()));
    out.push_str(&format!("hdr_disabled: {}\n", vpc.hdr_is_disabled()));

    out.push_str("# profile settings\n");
    out.push_str(&format!("profile[function]: {:?}\n", profile.function));
    out.push_str(&format!("profile[video]: {}\n", profile.video.join(" ")));
    out.push_str(&format!("profile[audio]: {}\n", profile.audio.join(" ")));
    out.push_str(&format!("profile[hdr_enable]: {}\n", profile.hdr_enable));
    out.push_str(&format!("profile[fs_enable]: {}\n", profile.fs_enable));
    out.push_str(&format!("profile[cq_threshold]: {}\n", profile.cq_threshold));
    out.push_str(&format!("profile[default_cq]: {}\n", profile.default_cq));

    out.push_str("# test_settings\n");
    out.push_str(&format!("settings[black_bar_detection.enabled]: {}\n", settings.black_bar_detection.enabled));
    out.push_str(&format!("settings[resolution_calculation.enabled]: {}\n", settings.resolution_calculation.enabled));
    out.push_str(&format!("settings[cq_calculation.enabled]: {}\n", settings.cq_calculation.enabled));
    out.push_str(&format!("settings[channels_calculation.enabled]: {}\n", settings.channels_calculation.enabled));
    out.push_str(&format!("settings[export_output.enabled]: {}\n", settings.export_output.enabled));
    out.push_str(&format!("settings[enable_delete]: {}\n", settings.enable_delete.enabled));

    tokio::fs::write(path, out).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BlackBarDetectionSettings, ChannelsCalculationSettings, CqCalculationSettings, EncoderKind,
        ExportOutputSettings, ResolutionCalculationSettings, StageToggle,
    };

    fn sample_settings() -> TestSettings {
        TestSettings {
            black_bar_detection: BlackBarDetectionSettings { enabled: true, frames_to_detect: 3 },
            resolution_calculation: ResolutionCalculationSettings {
                enabled: false,
                num_of_tests: 1,
                testing_resolutions: vec![854, 1920],
                scene_length: 2.0,
                cq_value: 20.0,
                keep_best_slopes: 0.6,
                threads: 2,
            },
            cq_calculation: CqCalculationSettings {
                enabled: false,
                cq_values: vec![15.0, 18.0, 27.0, 36.0],
                number_of_scenes: 1,
                cq_reference: 12.0,
                scene_length: 2.0,
                keep_best_scenes: 0.6,
                threads: 2,
            },
            channels_calculation: ChannelsCalculationSettings { enabled: false, similarity_cutoff: 0.001, duration: 60.0 },
            export_output: ExportOutputSettings { enabled: true },
            enable_delete: StageToggle { enabled: false },
        }
    }

    fn sample_profile() -> Profile {
        Profile {
            function: EncoderKind::Ffmpeg,
            video: vec!["-c:v".into(), "libsvtav1".into()],
            audio: vec!["-c:a".into(), "copy".into()],
            stereo: None,
            hdr_enable: false,
            fs_enable: true,
            res_decode: vec![(854, -1.0)],
            cq_threshold: 0.5,
            default_cq: 28.0,
        }
    }

    #[tokio::test]
    async fn write_emits_key_value_lines_and_section_markers() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mkv");
        std::fs::write(&input, b"fake").unwrap();
        let vpc = Vpc::new(&input, "movie", dir.path()).unwrap();

        let settings = sample_settings();

        let out_path = dir.path().join("VPC.txt");
        write(&vpc, &sample_profile(), &settings, &out_path).await.unwrap();

        let content = std::fs::read_to_string(&out_path).unwrap();
        assert!(content.contains("output_file_name: movie"));
        assert!(content.contains("# profile settings"));
        assert!(content.contains("# test_settings"));
        assert!(content.contains("profile[default_cq]: 28"));
    }
}
