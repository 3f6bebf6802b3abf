use std::path::PathBuf;

use clap::Parser;

/// Per-video resolution/CQ/crop decision engine and HDR-aware encoding pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "vqtune")]
pub struct CliArgs {
    /// Source video file to process
    #[arg(long)]
    pub input_file: PathBuf,

    /// Output stem; the workspace and final file are named after this
    #[arg(long)]
    pub movie_name: String,

    /// Path to the profile YAML (encoder args, HDR/fast-seek flags, decode table)
    #[arg(long)]
    pub profile: PathBuf,

    /// Path to the test-settings YAML (per-stage toggles and tuning knobs)
    #[arg(long)]
    pub settings: PathBuf,

    /// Base directory under which `<workspace>/<movie_name>/` is created
    #[arg(long)]
    pub workspace: PathBuf,

    /// Optional path to a tool-paths YAML (overrides ffmpeg/ffprobe/etc. defaults)
    #[arg(long)]
    pub tools: Option<PathBuf>,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl CliArgs {
    pub fn validate(&self) -> crate::utils::Result<()> {
        if !self.input_file.exists() {
            return Err(crate::utils::Error::validation(format!(
                "input file does not exist: {}",
                self.input_file.display()
            )));
        }
        if !self.profile.exists() {
            return Err(crate::utils::Error::validation(format!(
                "profile file does not exist: {}",
                self.profile.display()
            )));
        }
        if !self.settings.exists() {
            return Err(crate::utils::Error::validation(format!(
                "settings file does not exist: {}",
                self.settings.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_flags() {
        let args = CliArgs::parse_from([
            "vqtune",
            "--input-file",
            "input.mkv",
            "--movie-name",
            "movie",
            "--profile",
            "profile.yaml",
            "--settings",
            "settings.yaml",
            "--workspace",
            "work",
        ]);
        assert_eq!(args.input_file, PathBuf::from("input.mkv"));
        assert_eq!(args.movie_name, "movie");
        assert_eq!(args.log_level, "info");
        assert!(args.tools.is_none());
    }

    #[test]
    fn validate_rejects_missing_input() {
        let args = CliArgs {
            input_file: PathBuf::from("/nonexistent/video.mkv"),
            movie_name: "movie".to_string(),
            profile: PathBuf::from("/nonexistent/profile.yaml"),
            settings: PathBuf::from("/nonexistent/settings.yaml"),
            workspace: PathBuf::from("/tmp"),
            tools: None,
            log_level: "info".to_string(),
        };
        assert!(args.validate().is_err());
    }
}
