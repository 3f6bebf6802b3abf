//! HDR Router (C10): classifies a source's dynamic-range metadata and dispatches to
//! the matching encode path, falling back to a plain encode whenever any HDR step
//! fails partway through.

use std::path::Path;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::Profile;
use crate::hdr::dovi::DoviTool;
use crate::hdr::hdr10plus::Hdr10PlusTool;
use crate::scene::SceneEncoder;
use crate::utils::{Error, ProcessRunner, Result};
use crate::vpc::{HdrType, Vpc};

const REMUX_TIMEOUT: Duration = Duration::from_secs(600);

pub struct HdrRouter {
    dovi: DoviTool,
    hdr10plus: Hdr10PlusTool,
    scene_encoder: SceneEncoder,
    ffmpeg_path: String,
    enable_delete: bool,
}

impl HdrRouter {
    pub fn new(dovi: DoviTool, hdr10plus: Hdr10PlusTool, scene_encoder: SceneEncoder, ffmpeg_path: impl Into<String>, enable_delete: bool) -> Self {
        Self {
            dovi,
            hdr10plus,
            scene_encoder,
            ffmpeg_path: ffmpeg_path.into(),
            enable_delete,
        }
    }

    /// Runs the `uninit -> DoVi | HDR10 | None` probe. The probe doubles as the first
    /// metadata extraction: a successful classification leaves the extracted file
    /// cached in the workspace for the later encode step to reuse.
    pub async fn classify(&self, vpc: &mut Vpc) -> HdrType {
        if vpc.hdr_is_disabled() {
            vpc.set_hdr_type(HdrType::None);
            return HdrType::None;
        }

        if self.dovi.extract_rpu(&vpc.source_path, &vpc.dovi_metadata_file).await.is_ok() {
            vpc.set_hdr_type(HdrType::DolbyVision);
            return HdrType::DolbyVision;
        }

        if self
            .hdr10plus
            .extract_metadata(&vpc.source_path, &vpc.hdr10_metadata_file)
            .await
            .is_ok()
        {
            vpc.set_hdr_type(HdrType::Hdr10Plus);
            return HdrType::Hdr10Plus;
        }

        vpc.set_hdr_type(HdrType::None);
        HdrType::None
    }

    /// Produces the production encode at `vpc.output_file_path`. Falls back to the
    /// plain encode path if the HDR-specific workflow fails at any step.
    pub async fn encode_final(&self, vpc: &Vpc, profile: &Profile, use_stereo_audio: bool, title: Option<&str>) -> Result<()> {
        let hdr_type = if vpc.hdr_is_disabled() { HdrType::None } else { vpc.hdr_type };

        match hdr_type {
            HdrType::None | HdrType::Uninit => self.encode_plain(vpc, profile, use_stereo_audio, title).await,
            HdrType::DolbyVision | HdrType::Hdr10Plus => match self.encode_hdr(vpc, profile, hdr_type).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!("HDR encode path failed ({e}); disabling HDR and falling back to plain encode");
                    vpc.disable_hdr();
                    self.encode_plain(vpc, profile, use_stereo_audio, title).await
                }
            },
        }
    }

    async fn encode_plain(&self, vpc: &Vpc, profile: &Profile, use_stereo_audio: bool, title: Option<&str>) -> Result<()> {
        self.scene_encoder
            .encode_production(
                profile,
                &vpc.source_path,
                &vpc.output_file_path,
                vpc.orig_h_res,
                vpc.orig_v_res,
                vpc.crop,
                vpc.output_res,
                vpc.output_cq,
                use_stereo_audio,
                title,
            )
            .await
    }

    async fn encode_hdr(&self, vpc: &Vpc, profile: &Profile, hdr_type: HdrType) -> Result<()> {
        let elementary = vpc.workspace.join("elementary.hevc");
        self.scene_encoder
            .encode_video_only(
                profile,
                &vpc.source_path,
                &elementary,
                vpc.orig_h_res,
                vpc.orig_v_res,
                vpc.crop,
                vpc.output_res,
                vpc.output_cq,
                false,
            )
            .await?;

        let annotated = vpc.workspace.join("elementary_annotated.hevc");
        match hdr_type {
            HdrType::DolbyVision => self.dovi.inject_rpu(&elementary, &vpc.dovi_metadata_file, &annotated).await?,
            HdrType::Hdr10Plus => {
                self.hdr10plus
                    .inject_metadata(&elementary, &vpc.hdr10_metadata_file, &annotated)
                    .await?
            }
            _ => return Err(Error::hdr("encode_hdr called with a non-HDR classification")),
        }

        let remuxed_mp4 = vpc.workspace.join("remuxed.mp4");
        self.remux_to_mp4(&annotated, &remuxed_mp4, vpc.orig_framerate).await?;
        self.remux_to_mkv(&remuxed_mp4, &vpc.source_path, &vpc.output_file_path).await?;

        if self.enable_delete {
            for path in [&elementary, &annotated, &remuxed_mp4] {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    error!("failed to delete intermediate {}: {e}", path.display());
                }
            }
        }

        Ok(())
    }

    /// Wraps an annotated HEVC elementary stream into MP4, regenerating PTS at the
    /// source frame rate (HEVC streams carry no timing information of their own).
    async fn remux_to_mp4(&self, hevc: &Path, mp4: &Path, framerate: f64) -> Result<()> {
        let args = vec![
            "-fflags".to_string(),
            "+genpts".to_string(),
            "-r".to_string(),
            format!("{framerate}"),
            "-i".to_string(),
            hevc.to_string_lossy().into_owned(),
            "-c".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            mp4.to_string_lossy().into_owned(),
        ];
        let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(REMUX_TIMEOUT)).await?;
        if !outcome.ok {
            return Err(Error::hdr(format!("MP4 remux failed for {}", hevc.display())));
        }
        ProcessRunner::validate_output(mp4, crate::utils::DEFAULT_MIN_OUTPUT_BYTES).await
    }

    /// Stream-copies the annotated video from the MP4 alongside the original
    /// audio/subtitle/data streams straight from the source into the final MKV.
    async fn remux_to_mkv(&self, mp4: &Path, original_source: &Path, output: &Path) -> Result<()> {
        let args = vec![
            "-i".to_string(),
            mp4.to_string_lossy().into_owned(),
            "-i".to_string(),
            original_source.to_string_lossy().into_owned(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "1:a?".to_string(),
            "-map".to_string(),
            "1:s?".to_string(),
            "-map".to_string(),
            "1:d?".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        let outcome = ProcessRunner::run(&self.ffmpeg_path, &args, Some(REMUX_TIMEOUT)).await?;
        if !outcome.ok {
            return Err(Error::hdr(format!("MKV remux failed for {}", mp4.display())));
        }
        ProcessRunner::validate_output(output, crate::utils::DEFAULT_MIN_OUTPUT_BYTES).await
    }
}
