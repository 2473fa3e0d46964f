// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use crate::utils::validation::Validator;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const ENV_PREFIX: &str = "SSTV_RELAY";
const SUPPORTED_BIT_DEPTHS: [u16; 4] = [8, 16, 24, 32];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub media: MediaConfig,
    pub noise: NoiseConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    pub input_video: PathBuf,
    pub frames_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub decoded_dir: PathBuf,
    pub output_video: PathBuf,
    /// Where the JSON run report is written. Empty disables the report.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub fps: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    #[serde(default)]
    pub max_frames: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NoiseConfig {
    pub enabled: bool,
    pub color: String,
    pub gain: f32,
    pub duration_secs: u32,
    #[serde(default)]
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub encode_workers: usize,
    pub decode_workers: usize,
    pub item_timeout_secs: u64,
    pub max_retries: u32,
    #[serde(default = "default_progress")]
    pub progress: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

fn default_progress() -> bool {
    true
}

impl PipelineConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }
}

impl PathsConfig {
    /// The report path with an empty setting treated as disabled.
    pub fn report_path(&self) -> Option<&Path> {
        self.report_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

impl Config {
    /// Layer defaults, the config file and the environment. Not validated:
    /// callers apply their own overrides first, then call [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let defaults = config::Config::try_from(&Self::default_config())
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder
                .add_source(config::File::from(Path::new(DEFAULT_CONFIG_PATH)).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            paths: PathsConfig {
                input_video: PathBuf::from("input.mp4"),
                frames_dir: PathBuf::from("frames"),
                audio_dir: PathBuf::from("sstv_audio"),
                decoded_dir: PathBuf::from("decoded_images"),
                output_video: PathBuf::from("reconstructed.mp4"),
                report_path: Some(PathBuf::from("sstv_report.json")),
            },
            media: MediaConfig {
                sample_rate: 48_000,
                bit_depth: 16,
                fps: 25,
                frame_width: 320,
                frame_height: 240,
                max_frames: None,
            },
            noise: NoiseConfig {
                enabled: true,
                color: "pink".to_string(),
                gain: 2.5,
                duration_secs: 60,
                seed: None,
            },
            pipeline: PipelineConfig {
                encode_workers: num_cpus::get().max(1),
                decode_workers: 32,
                item_timeout_secs: 300,
                max_retries: 1,
                progress: true,
            },
            tools: ToolsConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        Validator::validate_worker_count("encode_workers", self.pipeline.encode_workers)?;
        Validator::validate_worker_count("decode_workers", self.pipeline.decode_workers)?;

        if self.pipeline.item_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "item_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !(8_000..=192_000).contains(&self.media.sample_rate) {
            return Err(PipelineError::Config(format!(
                "sample_rate {} outside supported range 8000-192000",
                self.media.sample_rate
            )));
        }

        if !SUPPORTED_BIT_DEPTHS.contains(&self.media.bit_depth) {
            return Err(PipelineError::Config(format!(
                "bit_depth {} not one of {:?}",
                self.media.bit_depth, SUPPORTED_BIT_DEPTHS
            )));
        }

        if self.media.fps == 0 {
            return Err(PipelineError::Config(
                "fps must be greater than 0".to_string(),
            ));
        }

        if self.media.frame_width == 0 || self.media.frame_height == 0 {
            return Err(PipelineError::Config(
                "frame_width and frame_height must be greater than 0".to_string(),
            ));
        }

        if self.noise.enabled && !(self.noise.gain.is_finite() && self.noise.gain >= 0.0) {
            return Err(PipelineError::Config(format!(
                "noise gain {} must be a non-negative number",
                self.noise.gain
            )));
        }

        Ok(())
    }
}
