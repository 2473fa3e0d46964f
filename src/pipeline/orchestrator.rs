// file: src/pipeline/orchestrator.rs
// description: drives extraction, encode and decode fan-outs, and reassembly in sequence
// reference: orchestrates the asynchronous round-trip workflow

use crate::artifacts::{ArtifactScanner, ScannedArtifact};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::media::{FfmpegNoiseMixer, FfmpegVideo, NoiseFilter, VideoCodec, resolve_ffmpeg};
use crate::models::{ArtifactKind, JobResult};
use crate::pipeline::decode::DecodeStage;
use crate::pipeline::encode::EncodeStage;
use crate::pipeline::extractor::FrameExtractor;
use crate::pipeline::fanout::{FanOut, ItemProcessor, join_error, work_items};
use crate::pipeline::progress::{ProgressTracker, StageStats};
use crate::pipeline::reassembler::{AssemblySummary, Reassembler};
use crate::pipeline::report::{RunReport, StageReport};
use crate::sstv::{Robot36Decoder, Robot36Encoder, SstvDecoder, SstvEncoder};
use crate::utils::logging::format_step;
use crate::utils::telemetry::OperationTimer;
use crate::utils::validation::Validator;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Stages run strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Extracting,
    Encoding,
    Decoding,
    Reassembling,
    Done,
}

impl PipelineStage {
    pub const WORKING_STAGES: usize = 4;

    pub fn next(self) -> Option<Self> {
        match self {
            PipelineStage::Extracting => Some(PipelineStage::Encoding),
            PipelineStage::Encoding => Some(PipelineStage::Decoding),
            PipelineStage::Decoding => Some(PipelineStage::Reassembling),
            PipelineStage::Reassembling => Some(PipelineStage::Done),
            PipelineStage::Done => None,
        }
    }

    pub fn step(self) -> usize {
        match self {
            PipelineStage::Extracting => 1,
            PipelineStage::Encoding => 2,
            PipelineStage::Decoding => 3,
            PipelineStage::Reassembling => 4,
            PipelineStage::Done => 4,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            PipelineStage::Extracting => "Extracting frames",
            PipelineStage::Encoding => "Encoding frames to SSTV audio",
            PipelineStage::Decoding => "Decoding SSTV audio to images",
            PipelineStage::Reassembling => "Reassembling video",
            PipelineStage::Done => "Done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The external pieces the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub video: Arc<dyn VideoCodec>,
    pub encoder: Arc<dyn SstvEncoder>,
    pub decoder: Arc<dyn SstvDecoder>,
    pub noise: Option<Arc<dyn NoiseFilter>>,
}

impl Collaborators {
    /// ffmpeg for video and noise, Robot36 for the SSTV codec.
    pub fn from_config(config: &Config) -> Result<Self> {
        let ffmpeg = resolve_ffmpeg(&config.tools)?;
        info!("Using ffmpeg at {}", ffmpeg.display());

        let noise: Option<Arc<dyn NoiseFilter>> = if config.noise.enabled {
            Some(Arc::new(FfmpegNoiseMixer::new(
                ffmpeg.clone(),
                config.noise.clone(),
                config.media.sample_rate,
                config.media.bit_depth,
                config.pipeline.item_timeout(),
            )))
        } else {
            info!("Noise injection disabled, publishing clean waveforms");
            None
        };

        Ok(Self {
            video: Arc::new(FfmpegVideo::new(ffmpeg)),
            encoder: Arc::new(Robot36Encoder::new(
                config.media.sample_rate,
                config.media.bit_depth,
            )),
            decoder: Arc::new(Robot36Decoder::new()),
            noise,
        })
    }
}

pub struct PipelineOrchestrator {
    config: Config,
    collaborators: Collaborators,
    stage: PipelineStage,
}

impl PipelineOrchestrator {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            stage: PipelineStage::Extracting,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Full round trip. The run report is saved whether or not a fatal
    /// error stops the run.
    pub async fn run(&mut self) -> Result<RunReport> {
        info!("Starting SSTV relay pipeline");
        self.stage = PipelineStage::Extracting;

        let mut report = RunReport::new(&self.config.paths.input_video);
        let outcome = self.run_stages(&mut report).await;

        report.finish(outcome.as_ref().err().map(|e| e.to_string()));
        self.log_final_stats(&report);

        match (outcome, self.save_report(&report)) {
            (Ok(()), Ok(_)) => Ok(report),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), saved) => {
                if let Err(save_err) = saved {
                    warn!("Could not write run report: {}", save_err);
                }
                error!("Pipeline stopped during {}: {}", self.stage, e);
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self, report: &mut RunReport) -> Result<()> {
        self.announce();
        report.push_stage(self.extract().await?);

        self.advance()?;
        report.push_stage(self.encode().await?);

        self.advance()?;
        report.push_stage(self.decode().await?);

        self.advance()?;
        let (stage, summary) = self.assemble().await?;
        report.output_video = Some(summary.output);
        report.push_stage(stage);

        self.advance()?;
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        self.stage = self.stage.next().ok_or_else(|| {
            PipelineError::Validation(format!("no stage follows {}", self.stage))
        })?;
        self.announce();
        Ok(())
    }

    fn announce(&self) {
        if self.stage == PipelineStage::Done {
            info!("Pipeline complete");
            return;
        }
        info!(
            "{}",
            format_step(
                self.stage.step(),
                PipelineStage::WORKING_STAGES,
                self.stage.describe()
            )
        );
    }

    /// Frame extraction. Unreadable source or zero frames is fatal.
    pub async fn extract(&self) -> Result<StageReport> {
        let source = self.config.paths.input_video.clone();
        let frames_dir = self.config.paths.frames_dir.clone();
        Validator::validate_input_video(&source)?;

        let timer = OperationTimer::new("extract");
        let extractor = FrameExtractor::new(
            Arc::clone(&self.collaborators.video),
            self.config.media.frame_width,
            self.config.media.frame_height,
        )
        .with_max_frames(self.config.media.max_frames);

        let count = tokio::task::spawn_blocking(move || extractor.extract(&source, &frames_dir))
            .await
            .map_err(join_error)??;

        let mut stats = StageStats::new("extract", count);
        stats.succeeded = count;
        let metrics = timer.finish_with_count(count);
        stats.duration_ms = metrics.duration_ms;
        Ok(StageReport::new(stats, metrics))
    }

    /// Encode fan-out over every extracted frame.
    pub async fn encode(&self) -> Result<StageReport> {
        let stage = EncodeStage::new(
            Arc::clone(&self.collaborators.encoder),
            self.collaborators.noise.clone(),
        );
        self.fan_out(
            "encode",
            stage,
            &self.config.paths.frames_dir,
            ArtifactKind::Frame,
            &self.config.paths.audio_dir,
            ArtifactKind::Waveform,
            self.config.pipeline.encode_workers,
        )
        .await
    }

    /// Decode fan-out over every published waveform.
    pub async fn decode(&self) -> Result<StageReport> {
        let stage = DecodeStage::new(Arc::clone(&self.collaborators.decoder));
        self.fan_out(
            "decode",
            stage,
            &self.config.paths.audio_dir,
            ArtifactKind::Waveform,
            &self.config.paths.decoded_dir,
            ArtifactKind::Decoded,
            self.config.pipeline.decode_workers,
        )
        .await
    }

    /// Reassembly. No surviving frame is fatal and leaves no output file.
    pub async fn assemble(&self) -> Result<(StageReport, AssemblySummary)> {
        let decoded_dir = self.config.paths.decoded_dir.clone();
        let output = self.config.paths.output_video.clone();
        Validator::validate_output_video(&output)?;

        let timer = OperationTimer::new("assemble");
        let reassembler = Reassembler::new(
            Arc::clone(&self.collaborators.video),
            self.config.media.fps,
        );

        let summary = tokio::task::spawn_blocking(move || reassembler.assemble(&decoded_dir, &output))
            .await
            .map_err(join_error)??;

        let mut stats = StageStats::new(
            "assemble",
            summary.frames_written + summary.skipped.len(),
        );
        stats.succeeded = summary.frames_written;
        stats.failed = summary.skipped.len();
        let metrics = timer.finish_with_count(summary.frames_written);
        stats.duration_ms = metrics.duration_ms;

        let report = StageReport::new(stats, metrics).with_failures(summary.skipped.clone());
        Ok((report, summary))
    }

    #[allow(clippy::too_many_arguments)]
    async fn fan_out<P: ItemProcessor>(
        &self,
        name: &str,
        processor: P,
        input_dir: &Path,
        input_kind: ArtifactKind,
        output_dir: &Path,
        output_kind: ArtifactKind,
        workers: usize,
    ) -> Result<StageReport> {
        let timer = OperationTimer::new(name);
        let inputs = prepare(input_dir, input_kind, output_dir, output_kind).await?;
        if inputs.is_empty() {
            warn!("No {} artifacts found in {}", input_kind, input_dir.display());
        }

        let items = work_items(&inputs, output_dir, output_kind);
        let fanout = FanOut::from_config(&self.config.pipeline, workers);
        info!(
            "{}: {} items across {} workers",
            name,
            items.len(),
            fanout.workers()
        );

        let progress = ProgressTracker::with_color(
            name,
            items.len(),
            self.config.pipeline.progress,
            colored::control::SHOULD_COLORIZE.should_colorize(),
        );
        let results = fanout.run(Arc::new(processor), items, &progress).await;
        progress.finish();

        let stats = progress.get_stats();
        let metrics = timer.finish_with_count(results.len());
        log_stage_failures(name, &results);

        Ok(StageReport::from_results(stats, metrics, &results))
    }

    /// Write the run report if one is configured.
    pub fn save_report(&self, report: &RunReport) -> Result<Option<PathBuf>> {
        match self.config.paths.report_path() {
            Some(path) => report.write(path).map(Some),
            None => Ok(None),
        }
    }

    fn log_final_stats(&self, report: &RunReport) {
        info!("=== Pipeline Execution Summary ===");
        info!("Run: {}", report.run_id);
        info!("Status: {:?}", report.status);
        for stage in &report.stages {
            info!(
                "{}: {} ok, {} failed ({:.2}% success)",
                stage.stats.stage,
                stage.stats.succeeded,
                stage.stats.failed,
                stage.stats.success_rate()
            );
            info!("  {}", stage.metrics.format());
        }
        if let Some(ref output) = report.output_video {
            info!("Output: {}", output.display());
        }
        if let Some(ref err) = report.error {
            info!("Error: {}", err);
        }
        info!("==================================");
    }
}

/// Scan the stage inputs and clear outputs left by a previous run.
async fn prepare(
    input_dir: &Path,
    input_kind: ArtifactKind,
    output_dir: &Path,
    output_kind: ArtifactKind,
) -> Result<Vec<ScannedArtifact>> {
    let input_dir = input_dir.to_path_buf();
    let output_dir = output_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let inputs = ArtifactScanner::new(input_kind).scan(&input_dir)?;
        ArtifactScanner::new(output_kind).clear_stale(&output_dir)?;
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| PipelineError::file_operation(&output_dir, e))?;
        Ok(inputs)
    })
    .await
    .map_err(join_error)?
}

fn log_stage_failures(stage: &str, results: &[JobResult]) {
    let failed = results.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        warn!(
            "{}: {} of {} items failed and are excluded from later stages",
            stage,
            failed,
            results.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decode::tests::FakeDecoder;
    use crate::pipeline::encode::tests::{CopyNoise, FakeEncoder};
    use crate::pipeline::extractor::tests::FakeVideo;
    use crate::pipeline::report::RunStatus;
    use crate::models::SequenceIndex;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default_config();
        config.paths.input_video = root.join("input.mp4");
        config.paths.frames_dir = root.join("frames");
        config.paths.audio_dir = root.join("sstv_audio");
        config.paths.decoded_dir = root.join("decoded_images");
        config.paths.output_video = root.join("reconstructed.mp4");
        config.paths.report_path = Some(root.join("sstv_report.json"));
        config.media.frame_width = 16;
        config.media.frame_height = 12;
        config.pipeline.encode_workers = 2;
        config.pipeline.decode_workers = 4;
        config.pipeline.item_timeout_secs = 30;
        config.pipeline.progress = false;
        std::fs::write(&config.paths.input_video, b"video").unwrap();
        config
    }

    fn fakes(video: Arc<FakeVideo>, fail_decode_red: Option<u8>) -> Collaborators {
        Collaborators {
            video,
            encoder: Arc::new(FakeEncoder { fail_red: None }),
            decoder: Arc::new(FakeDecoder {
                fail_red: fail_decode_red,
            }),
            noise: Some(Arc::new(CopyNoise)),
        }
    }

    #[test]
    fn test_stage_order_is_linear() {
        let mut stage = PipelineStage::Extracting;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(
            seen,
            vec![
                PipelineStage::Extracting,
                PipelineStage::Encoding,
                PipelineStage::Decoding,
                PipelineStage::Reassembling,
                PipelineStage::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_full_run_skips_failed_frame() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());
        let video = Arc::new(FakeVideo::new(5));

        // frame 2 has red 20 and fails to decode
        let mut orchestrator = PipelineOrchestrator::new(config.clone(), fakes(video.clone(), Some(20)));
        let report = orchestrator.run().await.unwrap();

        assert_eq!(orchestrator.stage(), PipelineStage::Done);
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(*video.written.lock().unwrap(), vec![0, 10, 30, 40]);
        assert!(config.paths.output_video.exists());

        let decode = report.stage("decode").unwrap();
        assert_eq!(decode.stats.succeeded, 4);
        assert_eq!(decode.failures.len(), 1);
        assert_eq!(decode.failures[0].index, SequenceIndex(2));
        assert_eq!(report.stage("encode").unwrap().stats.succeeded, 5);

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(config.paths.report_path().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["status"], "completed");
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());
        let video = Arc::new(FakeVideo::new(4));

        let mut first = PipelineOrchestrator::new(config.clone(), fakes(video.clone(), None));
        first.run().await.unwrap();
        let first_written = video.written.lock().unwrap().clone();

        let mut second = PipelineOrchestrator::new(config.clone(), fakes(video.clone(), None));
        second.run().await.unwrap();

        assert_eq!(*video.written.lock().unwrap(), first_written);
        let frames = ArtifactScanner::new(ArtifactKind::Frame)
            .scan(&config.paths.frames_dir)
            .unwrap();
        assert_eq!(frames.len(), 4);
    }

    #[tokio::test]
    async fn test_zero_survivors_is_fatal_and_writes_no_video() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());

        // the only frame has red 0 and fails to decode
        let mut orchestrator =
            PipelineOrchestrator::new(config.clone(), fakes(Arc::new(FakeVideo::new(1)), Some(0)));
        let result = orchestrator.run().await;

        assert!(matches!(result, Err(PipelineError::NothingToAssemble(_))));
        assert_eq!(orchestrator.stage(), PipelineStage::Reassembling);
        assert!(!config.paths.output_video.exists());

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(config.paths.report_path().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["status"], "failed");
        assert_eq!(saved["stages"][2]["failures"][0]["index"], 0);
    }

    #[tokio::test]
    async fn test_missing_source_stops_at_extraction() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());
        std::fs::remove_file(&config.paths.input_video).unwrap();

        let mut orchestrator =
            PipelineOrchestrator::new(config.clone(), fakes(Arc::new(FakeVideo::new(3)), None));
        let result = orchestrator.run().await;

        assert!(matches!(result, Err(PipelineError::SourceUnreadable { .. })));
        assert_eq!(orchestrator.stage(), PipelineStage::Extracting);
        assert!(!config.paths.audio_dir.exists());
    }

    #[tokio::test]
    async fn test_single_stages_run_against_configured_directories() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());
        let orchestrator =
            PipelineOrchestrator::new(config.clone(), fakes(Arc::new(FakeVideo::new(3)), None));

        assert_eq!(orchestrator.extract().await.unwrap().stats.succeeded, 3);
        assert_eq!(orchestrator.encode().await.unwrap().stats.succeeded, 3);
        assert_eq!(orchestrator.decode().await.unwrap().stats.succeeded, 3);
        let (_, summary) = orchestrator.assemble().await.unwrap();
        assert_eq!(summary.frames_written, 3);
    }
}
