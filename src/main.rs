use clap::Parser;
use std::process::ExitCode;
use tracing::error;

use vqtune::cli::CliArgs;
use vqtune::config::{Profile, TestSettings, ToolsConfig};
use vqtune::utils::setup_logging;
use vqtune::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    if let Err(e) = args.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let workspace = args.workspace.join(&args.movie_name);
    let _guards = match setup_logging(&args.log_level, &workspace, true) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("failed to set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &CliArgs) -> vqtune::Result<()> {
    let profile = Profile::load(&args.profile)?;
    let settings = TestSettings::load(&args.settings)?;
    let tools = match &args.tools {
        Some(path) => ToolsConfig::load(path)?,
        None => ToolsConfig::default(),
    };

    let orchestrator = Orchestrator::new(tools);
    orchestrator
        .run(&args.input_file, &args.movie_name, &args.workspace, &profile, &settings)
        .await
}
