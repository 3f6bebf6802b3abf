//! The Video Processing Configuration: the mutable, per-video record threaded through
//! every pipeline stage. Scoped test runs hold their own clone; only the shared
//! `hdr_disabled` flag is allowed to propagate information back up to an ancestor.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::config::Profile;
use crate::probe::{SideData, Vui};
use crate::utils::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdrType {
    Uninit,
    DolbyVision,
    Hdr10Plus,
    None,
}

impl HdrType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninit => "uninit",
            Self::DolbyVision => "DoVi",
            Self::Hdr10Plus => "HDR10",
            Self::None => "None",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vpc {
    // paths
    pub orig_file_path: PathBuf,
    pub output_file_name: String,
    pub workspace: PathBuf,
    pub output_file_path: PathBuf,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub dovi_metadata_file: PathBuf,
    pub hdr10_metadata_file: PathBuf,

    // probed facts
    pub orig_h_res: u32,
    pub orig_v_res: u32,
    pub orig_duration: f64,
    pub orig_framerate: f64,
    pub is_h265: bool,
    pub fs_support: bool,
    pub vui: Vui,
    pub side_data: SideData,

    // decisions
    pub output_res: u32,
    pub output_cq: f64,
    pub crop: (u32, u32),
    pub channels: Option<u32>,
    pub start: Option<f64>,
    pub duration: Option<f64>,

    // classification
    pub hdr_type: HdrType,
    hdr_disabled: Arc<AtomicBool>,
}

impl Vpc {
    pub fn new(input: &Path, output_file_name: &str, workspace_root: &Path) -> Result<Self> {
        let workspace = workspace_root.join(output_file_name);
        std::fs::create_dir_all(&workspace)?;
        let output_file_path = workspace.join(format!("{output_file_name}.mkv"));

        Ok(Self {
            orig_file_path: input.to_path_buf(),
            output_file_name: output_file_name.to_string(),
            source_path: input.to_path_buf(),
            target_path: output_file_path.clone(),
            dovi_metadata_file: workspace.join("dovi_metadata_test.bin"),
            hdr10_metadata_file: workspace.join("HDR10_metadata_test.json"),
            workspace,
            output_file_path,
            orig_h_res: 0,
            orig_v_res: 0,
            orig_duration: 0.0,
            orig_framerate: 0.0,
            is_h265: false,
            fs_support: false,
            vui: Vui::default(),
            side_data: SideData::default(),
            output_res: 0,
            output_cq: 0.0,
            crop: (0, 0),
            channels: None,
            start: None,
            duration: None,
            hdr_type: HdrType::Uninit,
            hdr_disabled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Seeds the decision fields from a probe pass and the chosen profile. Forces HDR
    /// off at construction time when the profile wants it but the source isn't HEVC.
    pub fn apply_probe(
        &mut self,
        width: u32,
        height: u32,
        duration: f64,
        framerate: f64,
        is_h265: bool,
        fs_support: bool,
        vui: Vui,
        side_data: SideData,
        profile: &Profile,
    ) {
        self.orig_h_res = width;
        self.orig_v_res = height;
        self.orig_duration = duration;
        self.orig_framerate = framerate;
        self.is_h265 = is_h265;
        self.fs_support = fs_support;
        self.vui = vui;
        self.side_data = side_data;

        self.output_res = width;
        self.output_cq = profile.default_cq;

        if profile.hdr_enable && !is_h265 {
            warn!("HDR requested but source is not HEVC; disabling HDR path");
            self.disable_hdr();
        }
    }

    /// Creates an isolated copy for a scoped test run (solver scene/CQ probes). The
    /// clone gets its own workspace sub-directory and target path but shares the
    /// `hdr_disabled` flag with every ancestor so a failed child can still turn HDR
    /// off for the eventual production encode.
    pub fn scoped_child(&self, subdir: &str) -> Result<Self> {
        let mut child = self.clone();
        child.workspace = self.workspace.join(subdir);
        std::fs::create_dir_all(&child.workspace)?;
        child.source_path = self.source_path.clone();
        child.target_path = child.workspace.join(format!("{subdir}.mkv"));
        Ok(child)
    }

    pub fn disable_hdr(&self) {
        self.hdr_disabled.store(true, Ordering::SeqCst);
    }

    pub fn hdr_is_disabled(&self) -> bool {
        self.hdr_disabled.load(Ordering::SeqCst)
    }

    /// Clamps to `orig_h_res`: the system never upscales.
    pub fn set_output_res(&mut self, res: u32) {
        self.output_res = res.min(self.orig_h_res);
    }

    pub fn set_output_cq(&mut self, cq: f64) {
        self.output_cq = cq;
    }

    /// Rejects a crop whose combined bars would consume the whole frame.
    pub fn set_crop(&mut self, top: u32, bottom: u32) {
        if top + bottom >= self.orig_v_res {
            warn!(
                "rejecting crop [{}, {}] that would exceed original height {}",
                top, bottom, self.orig_v_res
            );
            return;
        }
        self.crop = (top, bottom);
    }

    pub fn set_channels(&mut self, channels: u32) {
        self.channels = Some(channels);
    }

    pub fn set_temporal_window(&mut self, start: f64, duration: f64) {
        self.start = Some(start);
        self.duration = Some(duration);
    }

    pub fn set_hdr_type(&mut self, hdr_type: HdrType) {
        self.hdr_type = hdr_type;
    }

    pub fn set_source_path(&mut self, path: PathBuf) {
        self.source_path = path;
    }

    pub fn set_target_path(&mut self, path: PathBuf) {
        self.target_path = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> Profile {
        Profile {
            function: crate::config::EncoderKind::Ffmpeg,
            video: vec!["-c:v".into(), "libsvtav1".into()],
            audio: vec!["-c:a".into(), "copy".into()],
            stereo: None,
            hdr_enable: true,
            fs_enable: true,
            res_decode: vec![(854, -10.0), (1920, -0.00007)],
            cq_threshold: 0.6,
            default_cq: 28.0,
        }
    }

    #[test]
    fn new_creates_workspace_and_sets_paths() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mkv");
        std::fs::write(&input, b"fake").unwrap();

        let vpc = Vpc::new(&input, "movie", dir.path()).unwrap();
        assert!(vpc.workspace.exists());
        assert_eq!(vpc.output_file_path, vpc.workspace.join("movie.mkv"));
        assert_eq!(vpc.crop, (0, 0));
        assert_eq!(vpc.hdr_type, HdrType::Uninit);
    }

    #[test]
    fn apply_probe_disables_hdr_for_non_hevc_source() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mkv");
        std::fs::write(&input, b"fake").unwrap();
        let mut vpc = Vpc::new(&input, "movie", dir.path()).unwrap();

        vpc.apply_probe(
            1920,
            1080,
            120.0,
            23.976,
            false,
            true,
            Vui::default(),
            SideData::default(),
            &sample_profile(),
        );

        assert!(vpc.hdr_is_disabled());
        assert_eq!(vpc.output_res, 1920);
        assert_eq!(vpc.output_cq, 28.0);
    }

    #[test]
    fn set_output_res_never_upscales() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mkv");
        std::fs::write(&input, b"fake").unwrap();
        let mut vpc = Vpc::new(&input, "movie", dir.path()).unwrap();
        vpc.orig_h_res = 1920;

        vpc.set_output_res(3840);
        assert_eq!(vpc.output_res, 1920);

        vpc.set_output_res(854);
        assert_eq!(vpc.output_res, 854);
    }

    #[test]
    fn set_crop_rejects_full_frame_crop() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mkv");
        std::fs::write(&input, b"fake").unwrap();
        let mut vpc = Vpc::new(&input, "movie", dir.path()).unwrap();
        vpc.orig_v_res = 1080;

        vpc.set_crop(600, 600);
        assert_eq!(vpc.crop, (0, 0));

        vpc.set_crop(60, 60);
        assert_eq!(vpc.crop, (60, 60));
    }

    #[test]
    fn scoped_child_shares_hdr_disabled_flag_with_parent() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mkv");
        std::fs::write(&input, b"fake").unwrap();
        let parent = Vpc::new(&input, "movie", dir.path()).unwrap();
        let child = parent.scoped_child("cq_test").unwrap();

        assert!(!parent.hdr_is_disabled());
        child.disable_hdr();
        assert!(parent.hdr_is_disabled());
    }
}
