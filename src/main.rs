// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use sstv_relay::media::tools::check_ffmpeg;
use sstv_relay::utils::logging::{format_error, format_info, format_success, format_warning};
use sstv_relay::{
    Collaborators, Config, HealthReport, HealthStatus, PipelineOrchestrator, RunReport,
    StageReport,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sstv_relay")]
#[command(author = "cipher")]
#[command(version)]
#[command(
    about = "Round-trip a video through noisy SSTV audio and back",
    long_about = None
)]
struct Cli {
    /// Configuration file; defaults to config/default.toml when present
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = true, action = ArgAction::Set, global = true)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Per-run overrides layered on top of file and environment configuration.
#[derive(Args)]
struct Overrides {
    #[arg(long, value_name = "FILE", global = true)]
    input: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    output: Option<PathBuf>,

    #[arg(long, value_name = "DIR", global = true)]
    frames_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR", global = true)]
    audio_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR", global = true)]
    decoded_dir: Option<PathBuf>,

    /// JSON run report location; an empty value disables the report
    #[arg(long, value_name = "FILE", global = true)]
    report: Option<PathBuf>,

    #[arg(long, value_name = "HZ", global = true)]
    sample_rate: Option<u32>,

    #[arg(long, value_name = "BITS", global = true)]
    bit_depth: Option<u16>,

    #[arg(long, global = true)]
    fps: Option<u32>,

    #[arg(long, value_name = "PX", global = true)]
    width: Option<u32>,

    #[arg(long, value_name = "PX", global = true)]
    height: Option<u32>,

    #[arg(long, value_name = "NUM", global = true)]
    max_frames: Option<usize>,

    #[arg(long, value_name = "NUM", global = true)]
    encode_workers: Option<usize>,

    #[arg(long, value_name = "NUM", global = true)]
    decode_workers: Option<usize>,

    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,

    #[arg(long, value_name = "NUM", global = true)]
    retries: Option<u32>,

    #[arg(long, action = ArgAction::SetTrue, global = true)]
    no_noise: bool,

    #[arg(long, global = true)]
    noise_color: Option<String>,

    #[arg(long, global = true)]
    noise_gain: Option<f32>,

    #[arg(long, global = true)]
    noise_seed: Option<i64>,

    #[arg(long, action = ArgAction::SetTrue, global = true)]
    no_progress: bool,

    #[arg(long, value_name = "FILE", env = "FFMPEG_PATH", global = true)]
    ffmpeg: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        let paths = &mut config.paths;
        if let Some(v) = self.input {
            paths.input_video = v;
        }
        if let Some(v) = self.output {
            paths.output_video = v;
        }
        if let Some(v) = self.frames_dir {
            paths.frames_dir = v;
        }
        if let Some(v) = self.audio_dir {
            paths.audio_dir = v;
        }
        if let Some(v) = self.decoded_dir {
            paths.decoded_dir = v;
        }
        if let Some(v) = self.report {
            paths.report_path = Some(v);
        }

        let media = &mut config.media;
        if let Some(v) = self.sample_rate {
            media.sample_rate = v;
        }
        if let Some(v) = self.bit_depth {
            media.bit_depth = v;
        }
        if let Some(v) = self.fps {
            media.fps = v;
        }
        if let Some(v) = self.width {
            media.frame_width = v;
        }
        if let Some(v) = self.height {
            media.frame_height = v;
        }
        if self.max_frames.is_some() {
            media.max_frames = self.max_frames;
        }

        let pipeline = &mut config.pipeline;
        if let Some(v) = self.encode_workers {
            pipeline.encode_workers = v;
        }
        if let Some(v) = self.decode_workers {
            pipeline.decode_workers = v;
        }
        if let Some(v) = self.timeout {
            pipeline.item_timeout_secs = v;
        }
        if let Some(v) = self.retries {
            pipeline.max_retries = v;
        }
        if self.no_progress {
            pipeline.progress = false;
        }

        let noise = &mut config.noise;
        if self.no_noise {
            noise.enabled = false;
        }
        if let Some(v) = self.noise_color {
            noise.color = v;
        }
        if let Some(v) = self.noise_gain {
            noise.gain = v;
        }
        if self.noise_seed.is_some() {
            noise.seed = self.noise_seed;
        }

        if self.ffmpeg.is_some() {
            config.tools.ffmpeg_path = self.ffmpeg;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage: extract, encode, decode, assemble (default)
    Run,

    /// Extract frames from the input video
    Extract,

    /// Encode extracted frames into noisy SSTV audio
    Encode,

    /// Decode SSTV audio back into images
    Decode,

    /// Mux decoded images into the output video
    Assemble,

    /// Report availability of external tools
    Tools,
}

#[derive(Clone, Copy)]
enum Stage {
    Extract,
    Encode,
    Decode,
    Assemble,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.color {
        colored::control::set_override(false);
    }
    sstv_relay::utils::logging::init_logger(cli.color, cli.verbose);

    info!("SSTV Relay");
    let mut config = match cli.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(Some(path)).context("Failed to load configuration")?
        }
        None => Config::load(None).context("Failed to load configuration")?,
    };

    cli.overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(config).await,
        Commands::Tools => cmd_tools(&config),
        Commands::Extract => cmd_stage(config, Stage::Extract).await,
        Commands::Encode => cmd_stage(config, Stage::Encode).await,
        Commands::Decode => cmd_stage(config, Stage::Decode).await,
        Commands::Assemble => cmd_stage(config, Stage::Assemble).await,
    }
}

async fn cmd_run(config: Config) -> Result<()> {
    let collaborators =
        Collaborators::from_config(&config).context("Failed to set up media tools")?;
    let mut orchestrator = PipelineOrchestrator::new(config, collaborators);

    match orchestrator.run().await {
        Ok(report) => {
            let failures = report.total_failures();
            let output = report
                .output_video
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!("{}", format_success(&format!("Reconstructed video: {}", output)));
            if failures > 0 {
                println!(
                    "{}",
                    format_warning(&format!("{} frame(s) were lost in transit", failures))
                );
            }
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                format_error(&format!("Pipeline failed during {}: {}", orchestrator.stage(), e))
            );
            Err(anyhow::Error::from(e).context("Pipeline failed"))
        }
    }
}

async fn cmd_stage(config: Config, stage: Stage) -> Result<()> {
    let collaborators =
        Collaborators::from_config(&config).context("Failed to set up media tools")?;
    let orchestrator = PipelineOrchestrator::new(config, collaborators);
    let mut report = RunReport::new(&orchestrator.config().paths.input_video);

    let outcome: sstv_relay::Result<StageReport> = match stage {
        Stage::Extract => orchestrator.extract().await,
        Stage::Encode => orchestrator.encode().await,
        Stage::Decode => orchestrator.decode().await,
        Stage::Assemble => orchestrator.assemble().await.map(|(stage, summary)| {
            report.output_video = Some(summary.output);
            stage
        }),
    };

    let result = match outcome {
        Ok(stage) => {
            println!(
                "{}",
                format_success(&format!(
                    "{}: {} succeeded, {} failed",
                    stage.stats.stage, stage.stats.succeeded, stage.stats.failed
                ))
            );
            for failure in &stage.failures {
                println!(
                    "{}",
                    format_info(&format!("{} {}", failure.input.display(), failure.error))
                );
            }
            report.push_stage(stage);
            report.finish(None);
            Ok(())
        }
        Err(e) => {
            println!("{}", format_error(&e.to_string()));
            report.finish(Some(e.to_string()));
            Err(e)
        }
    };

    if let Err(e) = orchestrator.save_report(&report) {
        warn!("Could not write run report: {}", e);
    }

    result.context("Stage failed")
}

fn cmd_tools(config: &Config) -> Result<()> {
    let report = HealthReport::new(
        vec![check_ffmpeg(&config.tools)],
        env!("CARGO_PKG_VERSION").to_string(),
    );
    println!("{}", report.format());

    if report.overall_status == HealthStatus::Unhealthy {
        return Err(anyhow::anyhow!("Required tools are missing"));
    }
    Ok(())
}
