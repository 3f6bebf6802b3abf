//! Produces short encoded clips and the production encode from a VPC's current
//! decisions: either a stream-copy temporal cut (for sampling) or a full crop/scale/CQ
//! encode (for solver test clips and the final output).

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{EncoderKind, Profile};
use crate::utils::{Error, ProcessRunner, Result, DEFAULT_MIN_OUTPUT_BYTES};

const ENCODE_TIMEOUT: Duration = Duration::from_secs(3600);
const CUT_TIMEOUT: Duration = Duration::from_secs(120);

/// Offsets (seconds) added to the requested duration on a post-input-seek cut retry,
/// to compensate for keyframe-aligned cuts landing short of the target length.
const POST_SEEK_OFFSETS: std::ops::Range<u64> = 3..9;

#[derive(Debug, Clone)]
pub struct SceneEncoder {
    ffmpeg_path: String,
    handbrake_path: String,
}

impl SceneEncoder {
    pub fn new(ffmpeg_path: impl Into<String>, handbrake_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            handbrake_path: handbrake_path.into(),
        }
    }

    /// Stream-copies a clip of `duration` seconds starting at `start`, used to produce
    /// the scene samples solvers encode for scoring. No re-encode happens here.
    pub async fn cut_test_clip(
        &self,
        source: &Path,
        target: &Path,
        start: f64,
        duration: f64,
        fast_seek_capable: bool,
        profile_allows_fast_seek: bool,
    ) -> Result<()> {
        if fast_seek_capable && profile_allows_fast_seek {
            let args = vec![
                "-ss".to_string(),
                format!("{start:.3}"),
                "-i".to_string(),
                source.to_string_lossy().into_owned(),
                "-t".to_string(),
                format!("{duration:.3}"),
                "-c".to_string(),
                "copy".to_string(),
                "-y".to_string(),
                target.to_string_lossy().into_owned(),
            ];
            let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(CUT_TIMEOUT)).await?;
            if !outcome.ok {
                return Err(Error::ffmpeg(format!("fast-seek cut failed for {}", source.display())));
            }
            return ProcessRunner::validate_output(target, DEFAULT_MIN_OUTPUT_BYTES).await;
        }

        for offset in POST_SEEK_OFFSETS {
            let extended = duration + offset as f64;
            let args = vec![
                "-i".to_string(),
                source.to_string_lossy().into_owned(),
                "-ss".to_string(),
                format!("{start:.3}"),
                "-t".to_string(),
                format!("{extended:.3}"),
                "-fflags".to_string(),
                "+genpts".to_string(),
                "-copyts".to_string(),
                "-avoid_negative_ts".to_string(),
                "make_zero".to_string(),
                "-c".to_string(),
                "copy".to_string(),
                "-y".to_string(),
                target.to_string_lossy().into_owned(),
            ];

            let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(CUT_TIMEOUT)).await?;
            if outcome.ok && ProcessRunner::validate_output(target, DEFAULT_MIN_OUTPUT_BYTES).await.is_ok() {
                return Ok(());
            }
            debug!("post-seek cut with offset {offset}s undersized, retrying");
        }

        Err(Error::ffmpeg(format!(
            "post-seek cut exhausted retries for {}",
            source.display()
        )))
    }

    /// Builds the crop+scale filter for a given (resolution, crop) pair. `neighbor`
    /// scaling is used for resolution-test clips, where speed matters more than
    /// quality; Lanczos is used everywhere else.
    pub fn build_filter(width: u32, height: u32, crop: (u32, u32), target_res: u32, neighbor: bool) -> Option<String> {
        let (top, bottom) = crop;
        let cropped_height = height.saturating_sub(top + bottom);
        let algo = if neighbor { "neighbor" } else { "lanczos" };

        if top == 0 && bottom == 0 && target_res >= width {
            return None;
        }

        let mut parts = Vec::new();
        if top > 0 || bottom > 0 {
            parts.push(format!("crop={width}:{cropped_height}:0:{top}"));
        }
        if target_res < width {
            parts.push(format!("scale={target_res}:-2:sws_flags={algo}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(","))
        }
    }

    /// Appends the profile's video args to `args`, splicing `filter` into an existing
    /// `-vf` entry rather than adding a second one — ffmpeg only honors the last `-vf`
    /// on the command line, so a profile that already sets one must not lose it.
    fn append_video_args(args: &mut Vec<String>, profile_video: &[String], filter: Option<&str>) {
        let mut video_args = profile_video.to_vec();
        if let Some(filter) = filter {
            match video_args.iter().position(|a| a == "-vf") {
                Some(pos) => match video_args.get_mut(pos + 1) {
                    Some(existing) => {
                        existing.push(',');
                        existing.push_str(filter);
                    }
                    None => video_args.push(filter.to_string()),
                },
                None => {
                    video_args.push("-vf".to_string());
                    video_args.push(filter.to_string());
                }
            }
        }
        args.extend(video_args);
    }

    /// A full re-encode at the VPC's current (resolution, CQ, crop), stripping audio
    /// and subtitles. Used both by the solvers' test encodes and, with the final
    /// decisions, the HDR router's elementary-stream re-encode.
    pub async fn encode_video_only(
        &self,
        profile: &Profile,
        source: &Path,
        target: &Path,
        width: u32,
        height: u32,
        crop: (u32, u32),
        target_res: u32,
        cq: f64,
        neighbor_scale: bool,
    ) -> Result<()> {
        match profile.function {
            EncoderKind::Ffmpeg => {
                let mut args = vec!["-i".to_string(), source.to_string_lossy().into_owned()];
                let filter = Self::build_filter(width, height, crop, target_res, neighbor_scale);
                Self::append_video_args(&mut args, &profile.video, filter.as_deref());
                args.push("-crf".to_string());
                args.push(format!("{cq}"));
                args.push("-an".to_string());
                args.push("-sn".to_string());
                args.push("-y".to_string());
                args.push(target.to_string_lossy().into_owned());

                let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(ENCODE_TIMEOUT)).await?;
                if !outcome.ok {
                    return Err(Error::ffmpeg(format!("video-only encode failed for {}", source.display())));
                }
            }
            EncoderKind::HandbrakeAv1 => {
                let mut args = vec![
                    "-i".to_string(),
                    source.to_string_lossy().into_owned(),
                    "-o".to_string(),
                    target.to_string_lossy().into_owned(),
                    "--crop".to_string(),
                    format!("{}:{}:0:0", crop.0, crop.1),
                    "--width".to_string(),
                    format!("{target_res}"),
                    "-q".to_string(),
                    format!("{cq}"),
                    "-a".to_string(),
                    "none".to_string(),
                    "-s".to_string(),
                    "none".to_string(),
                ];
                args.extend(profile.video.iter().cloned());

                let outcome = ProcessRunner::run(&self.handbrake_path, &args, Some(ENCODE_TIMEOUT)).await?;
                if !outcome.ok {
                    return Err(Error::ffmpeg(format!("HandBrake encode failed for {}", source.display())));
                }
            }
        }

        ProcessRunner::validate_output(target, DEFAULT_MIN_OUTPUT_BYTES).await
    }

    /// The production encode: full crop/scale/CQ plus the profile's audio args and
    /// (for multichannel sources that fail the similarity check) a stereo downmix.
    pub async fn encode_production(
        &self,
        profile: &Profile,
        source: &Path,
        target: &Path,
        width: u32,
        height: u32,
        crop: (u32, u32),
        target_res: u32,
        cq: f64,
        use_stereo_audio: bool,
        title: Option<&str>,
    ) -> Result<()> {
        let audio_args = if use_stereo_audio {
            profile.stereo.as_ref().unwrap_or(&profile.audio)
        } else {
            &profile.audio
        };

        let mut args = vec!["-i".to_string(), source.to_string_lossy().into_owned()];
        let filter = Self::build_filter(width, height, crop, target_res, false);
        Self::append_video_args(&mut args, &profile.video, filter.as_deref());
        args.push("-crf".to_string());
        args.push(format!("{cq}"));
        args.extend(audio_args.iter().cloned());
        if let Some(title) = title {
            args.push("-metadata".to_string());
            args.push(format!("title={title}"));
        }
        args.push("-y".to_string());
        args.push(target.to_string_lossy().into_owned());

        let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(ENCODE_TIMEOUT)).await?;
        if !outcome.ok {
            warn!("production encode failed for {}", source.display());
            return Err(Error::ffmpeg(format!("production encode failed for {}", source.display())));
        }

        ProcessRunner::validate_output(target, DEFAULT_MIN_OUTPUT_BYTES).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_filter_includes_crop_and_scale_when_needed() {
        let filter = SceneEncoder::build_filter(1920, 1080, (60, 60), 1280, false).unwrap();
        assert!(filter.contains("crop=1920:960:0:60"));
        assert!(filter.contains("scale=1280:-2:sws_flags=lanczos"));
    }

    #[test]
    fn build_filter_uses_neighbor_scaling_for_resolution_tests() {
        let filter = SceneEncoder::build_filter(1920, 1080, (0, 0), 854, true).unwrap();
        assert!(filter.contains("sws_flags=neighbor"));
        assert!(!filter.contains("crop="));
    }

    #[test]
    fn build_filter_is_none_when_nothing_changes() {
        assert!(SceneEncoder::build_filter(1920, 1080, (0, 0), 1920, false).is_none());
    }

    #[test]
    fn append_video_args_splices_into_an_existing_vf() {
        let profile_video = vec!["-vf".to_string(), "hqdn3d".to_string(), "-preset".to_string(), "4".to_string()];
        let mut args = Vec::new();
        SceneEncoder::append_video_args(&mut args, &profile_video, Some("scale=1280:-2:sws_flags=lanczos"));

        let vf_pos = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf_pos + 1], "hqdn3d,scale=1280:-2:sws_flags=lanczos");
        assert_eq!(args.iter().filter(|a| a.as_str() == "-vf").count(), 1);
    }

    #[test]
    fn append_video_args_adds_a_new_vf_when_profile_has_none() {
        let profile_video = vec!["-preset".to_string(), "4".to_string()];
        let mut args = Vec::new();
        SceneEncoder::append_video_args(&mut args, &profile_video, Some("crop=1920:960:0:60"));

        assert_eq!(args, vec!["-preset", "4", "-vf", "crop=1920:960:0:60"]);
    }

    #[test]
    fn append_video_args_leaves_profile_untouched_when_no_filter() {
        let profile_video = vec!["-vf".to_string(), "hqdn3d".to_string()];
        let mut args = Vec::new();
        SceneEncoder::append_video_args(&mut args, &profile_video, None);

        assert_eq!(args, vec!["-vf", "hqdn3d"]);
    }
}
