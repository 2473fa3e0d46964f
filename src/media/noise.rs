// file: src/media/noise.rs
// description: channel-noise injection through an ffmpeg filter graph
// reference: https://ffmpeg.org/ffmpeg-filters.html#anoisesrc

use crate::config::NoiseConfig;
use crate::error::Result;
use crate::media::command::ToolCommand;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Mixes noise into the waveform at `input`, writing the result to `output`.
#[async_trait]
pub trait NoiseFilter: Send + Sync {
    async fn mix(&self, input: &Path, output: &Path) -> Result<()>;
}

pub struct FfmpegNoiseMixer {
    ffmpeg: PathBuf,
    settings: NoiseConfig,
    sample_rate: u32,
    bit_depth: u16,
    timeout: Duration,
}

impl FfmpegNoiseMixer {
    pub fn new(
        ffmpeg: impl Into<PathBuf>,
        settings: NoiseConfig,
        sample_rate: u32,
        bit_depth: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            settings,
            sample_rate,
            bit_depth,
            timeout,
        }
    }

    pub fn filter_graph(&self) -> String {
        let seed = self
            .settings
            .seed
            .map(|s| format!(":seed={s}"))
            .unwrap_or_default();

        format!(
            "[0:a]aresample=async=1[first];\
             anoisesrc=color={color}:duration={duration}:sample_rate={rate}{seed}[raw_noise];\
             [raw_noise]volume={gain}[noise];\
             [first][noise]amix=inputs=2:duration=first:dropout_transition=2",
            color = self.settings.color,
            duration = self.settings.duration_secs,
            rate = self.sample_rate,
            gain = self.settings.gain,
        )
    }

    fn pcm_codec(&self) -> &'static str {
        match self.bit_depth {
            8 => "pcm_u8",
            24 => "pcm_s24le",
            32 => "pcm_s32le",
            _ => "pcm_s16le",
        }
    }

    pub fn command(&self, input: &Path, output: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"])
            .arg("-i")
            .arg(input.to_string_lossy())
            .arg("-filter_complex")
            .arg(self.filter_graph())
            .args(["-ac", "1", "-c:a", self.pcm_codec()])
            .arg(output.to_string_lossy())
            .timeout(self.timeout);
        cmd
    }
}

#[async_trait]
impl NoiseFilter for FfmpegNoiseMixer {
    async fn mix(&self, input: &Path, output: &Path) -> Result<()> {
        debug!(
            "Mixing {} noise into {}",
            self.settings.color,
            input.display()
        );
        self.command(input, output).execute().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer(seed: Option<i64>) -> FfmpegNoiseMixer {
        FfmpegNoiseMixer::new(
            "ffmpeg",
            NoiseConfig {
                enabled: true,
                color: "pink".to_string(),
                gain: 2.5,
                duration_secs: 60,
                seed,
            },
            48_000,
            16,
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_filter_graph_matches_channel_model() {
        let graph = mixer(None).filter_graph();
        assert!(graph.starts_with("[0:a]aresample=async=1[first];"));
        assert!(graph.contains("anoisesrc=color=pink:duration=60:sample_rate=48000[raw_noise]"));
        assert!(graph.contains("volume=2.5"));
        assert!(graph.ends_with("amix=inputs=2:duration=first:dropout_transition=2"));
    }

    #[test]
    fn test_seed_is_passed_to_noise_source() {
        let graph = mixer(Some(7)).filter_graph();
        assert!(graph.contains(":seed=7[raw_noise]"));
    }

    #[test]
    fn test_command_writes_to_given_output() {
        let cmd = mixer(None).command(Path::new("in/.a.wav"), Path::new("in/.b.wav"));
        let args = cmd.get_args();
        assert_eq!(args.last().map(String::as_str), Some("in/.b.wav"));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "in/.a.wav"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "pcm_s16le"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transient_failure() {
        let mixer = FfmpegNoiseMixer::new(
            "/nonexistent/ffmpeg",
            mixer(None).settings.clone(),
            48_000,
            16,
            Duration::from_secs(5),
        );
        let err = mixer
            .mix(Path::new("a.wav"), Path::new("b.wav"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
