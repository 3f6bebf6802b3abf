//! Orchestrator (C11): the per-file pipeline. Runs each stage in a fixed order,
//! degrading to the stage's default on any failure rather than aborting the file.

use std::path::Path;

use tracing::{info, warn};

use crate::channels::ChannelAnalyzer;
use crate::config::{Profile, TestSettings, ToolsConfig};
use crate::crop;
use crate::hdr::{DoviTool, Hdr10PlusTool, HdrRouter};
use crate::manifest;
use crate::probe::MediaProbe;
use crate::quality::QualityScorer;
use crate::sampler::FrameSampler;
use crate::scene::SceneEncoder;
use crate::solver::{CqSolver, ResolutionSolver};
use crate::utils::{format_file_size, Result};
use crate::vpc::Vpc;

pub struct Orchestrator {
    tools: ToolsConfig,
}

impl Orchestrator {
    pub fn new(tools: ToolsConfig) -> Self {
        Self { tools }
    }

    pub async fn run(&self, input: &Path, movie_name: &str, workspace_root: &Path, profile: &Profile, settings: &TestSettings) -> Result<()> {
        let mut vpc = Vpc::new(input, movie_name, workspace_root)?;
        info!("processing {} as {}", input.display(), movie_name);

        let probe = MediaProbe::new(self.tools.ffprobe.clone());
        let (width, height) = probe.resolution(input).await;
        let duration = probe.duration(input).await;
        let framerate = probe.framerate(input).await;
        let is_h265 = probe.is_hevc(input).await;
        let fs_support = probe.fast_seek(input).await;
        let (vui, side_data) = probe.static_metadata(input).await.unwrap_or_default();

        vpc.apply_probe(width, height, duration, framerate, is_h265, fs_support, vui, side_data, profile);

        let sampler = FrameSampler::new(self.tools.ffmpeg.clone());
        let scene_encoder = SceneEncoder::new(self.tools.ffmpeg.clone(), self.tools.handbrake.clone());
        let scorer = QualityScorer::new(self.tools.scorer.clone(), self.tools.ffmpeg.clone());

        if settings.black_bar_detection.enabled {
            match crop::detect(&sampler, input, &vpc.workspace, vpc.orig_duration, settings.black_bar_detection.frames_to_detect).await {
                Ok(result) => vpc.set_crop(result.top, result.bottom),
                Err(e) => warn!("black-bar detection failed, keeping crop=[0,0]: {e}"),
            }
        }

        if settings.resolution_calculation.enabled {
            let solver = ResolutionSolver::new(scene_encoder.clone(), scorer.clone());
            match solver.solve(&vpc, profile, &settings.resolution_calculation).await {
                Ok(res) => vpc.set_output_res(res),
                Err(e) => warn!("resolution solver failed, keeping output_res={}: {e}", vpc.output_res),
            }
        }

        if settings.cq_calculation.enabled {
            let solver = CqSolver::new(scene_encoder.clone(), scorer.clone());
            match solver.solve(&vpc, profile, &settings.cq_calculation).await {
                Ok(cq) => vpc.set_output_cq(cq),
                Err(e) => warn!("CQ solver failed, keeping output_cq={}: {e}", vpc.output_cq),
            }
        }

        let channels = if settings.channels_calculation.enabled {
            let analyzer = ChannelAnalyzer::new(self.tools.ffmpeg.clone());
            match analyzer.detect(input, &vpc.workspace, vpc.orig_duration, &settings.channels_calculation).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("channel analysis failed, defaulting to stereo: {e}");
                    2
                }
            }
        } else {
            2
        };
        vpc.set_channels(channels);

        let manifest_path = vpc.workspace.join("VPC.txt");
        manifest::write(&vpc, profile, settings, &manifest_path).await?;

        if !settings.export_output.enabled {
            info!("export_output disabled, stopping after decisions for {}", movie_name);
            return Ok(());
        }

        let router = HdrRouter::new(
            DoviTool::new(self.tools.dovi_tool.clone()),
            Hdr10PlusTool::new(self.tools.hdr10plus_tool.clone()),
            scene_encoder,
            self.tools.ffmpeg.clone(),
            settings.enable_delete.enabled,
        );

        router.classify(&mut vpc).await;
        router.encode_final(&vpc, profile, channels == 2, Some(movie_name)).await?;

        self.log_size_ratio(input, &vpc.output_file_path).await;
        Ok(())
    }

    async fn log_size_ratio(&self, input: &Path, output: &Path) {
        let (Ok(in_meta), Ok(out_meta)) = (tokio::fs::metadata(input).await, tokio::fs::metadata(output).await) else {
            return;
        };
        let ratio = out_meta.len() as f64 / in_meta.len().max(1) as f64;
        info!(
            "{} -> {} ({} -> {}, {:.1}%)",
            input.display(),
            output.display(),
            format_file_size(in_meta.len()),
            format_file_size(out_meta.len()),
            ratio * 100.0
        );
    }
}
