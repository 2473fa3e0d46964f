// file: src/pipeline/encode.rs
// description: per-frame SSTV synthesis followed by channel-noise injection
// reference: blocking synthesis on the blocking pool, async noise process

use crate::artifacts::ScopedWrite;
use crate::error::Result;
use crate::media::NoiseFilter;
use crate::models::WorkItem;
use crate::pipeline::fanout::{Attempt, ItemProcessor};
use crate::sstv::SstvEncoder;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Frame image in, noisy waveform out. Without a noise filter the clean
/// waveform is published instead.
pub struct EncodeStage {
    encoder: Arc<dyn SstvEncoder>,
    noise: Option<Arc<dyn NoiseFilter>>,
}

impl EncodeStage {
    pub fn new(encoder: Arc<dyn SstvEncoder>, noise: Option<Arc<dyn NoiseFilter>>) -> Self {
        Self { encoder, noise }
    }
}

#[async_trait]
impl ItemProcessor for EncodeStage {
    async fn process(&self, item: &WorkItem, attempt: &Attempt) -> Result<PathBuf> {
        let encoder = Arc::clone(&self.encoder);
        let input = item.input.clone();
        let output = item.output.clone();

        // the clean file lives beside the destination under a hidden name
        // and is never renamed into place when noise is enabled
        let clean = attempt
            .blocking(move || {
                let image = image::open(&input)?.to_rgb8();
                let waveform = encoder.synthesize(&image)?;
                debug!(
                    "{}: synthesized {:.1}s of audio",
                    output.display(),
                    waveform.duration_secs()
                );
                waveform.stage_wav(&output)
            })
            .await?;

        let Some(noise) = &self.noise else {
            return attempt.publish(clean);
        };

        let noisy = ScopedWrite::new(&item.output)?;
        noise.mix(clean.path(), noisy.path()).await?;
        drop(clean);

        attempt.publish(noisy)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artifacts::{ArtifactScanner, write_image_atomic};
    use crate::error::PipelineError;
    use crate::models::{ArtifactKind, JobResult, SequenceIndex};
    use crate::pipeline::fanout::{FanOut, work_items};
    use crate::pipeline::progress::ProgressTracker;
    use crate::sstv::Waveform;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Encodes the frame's red channel as a short constant waveform.
    pub(crate) struct FakeEncoder {
        pub fail_red: Option<u8>,
    }

    impl SstvEncoder for FakeEncoder {
        fn synthesize(&self, image: &RgbImage) -> Result<Waveform> {
            let red = image.get_pixel(0, 0).0[0];
            if Some(red) == self.fail_red {
                return Err(PipelineError::Validation(format!("cannot encode red {red}")));
            }
            Ok(Waveform::new(8_000, 16, vec![red as f32 / 255.0; 64]))
        }
    }

    /// Publishes the clean waveform unchanged.
    pub(crate) struct CopyNoise;

    #[async_trait]
    impl NoiseFilter for CopyNoise {
        async fn mix(&self, input: &Path, output: &Path) -> Result<()> {
            tokio::fs::copy(input, output).await?;
            Ok(())
        }
    }

    /// Leaves the output untouched, like a tool that crashed before writing.
    struct SilentNoise;

    #[async_trait]
    impl NoiseFilter for SilentNoise {
        async fn mix(&self, _input: &Path, _output: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn write_frames(dir: &Path, n: u8) {
        for i in 0..n {
            let image = RgbImage::from_pixel(4, 4, Rgb([i * 10, 0, 0]));
            write_image_atomic(&dir.join(format!("frame_{:06}.png", i)), &image).unwrap();
        }
    }

    async fn run_stage(stage: EncodeStage, frames: &Path, audio: &Path) -> Vec<JobResult> {
        let inputs = ArtifactScanner::new(ArtifactKind::Frame).scan(frames).unwrap();
        let items = work_items(&inputs, audio, ArtifactKind::Waveform);
        let progress = ProgressTracker::hidden("encode", items.len());
        FanOut::new(3, Duration::from_secs(10), 1)
            .run(Arc::new(stage), items, &progress)
            .await
    }

    #[tokio::test]
    async fn test_forced_failure_only_affects_its_frame() {
        let temp = TempDir::new().unwrap();
        let (frames, audio) = (temp.path().join("frames"), temp.path().join("audio"));
        write_frames(&frames, 6);

        let stage = EncodeStage::new(
            Arc::new(FakeEncoder { fail_red: Some(30) }),
            Some(Arc::new(CopyNoise)),
        );
        let results = run_stage(stage, &frames, &audio).await;

        assert_eq!(results.len(), 6);
        let failed: Vec<SequenceIndex> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.index())
            .collect();
        assert_eq!(failed, vec![SequenceIndex(3)]);

        let published = ArtifactScanner::new(ArtifactKind::Waveform).scan(&audio).unwrap();
        let indices: Vec<u64> = published.iter().map(|a| a.index.value()).collect();
        assert_eq!(indices, vec![0, 1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn test_published_waveform_is_complete_and_clean_copy_is_gone() {
        let temp = TempDir::new().unwrap();
        let (frames, audio) = (temp.path().join("frames"), temp.path().join("audio"));
        write_frames(&frames, 2);

        let stage = EncodeStage::new(
            Arc::new(FakeEncoder { fail_red: None }),
            Some(Arc::new(CopyNoise)),
        );
        let results = run_stage(stage, &frames, &audio).await;
        assert!(results.iter().all(JobResult::is_success));

        let wave = Waveform::read_wav(&audio.join("frame_000001.wav")).unwrap();
        assert_eq!(wave.samples.len(), 64);
        assert!((wave.samples[0] - 10.0 / 255.0).abs() < 1e-3);

        let mut names: Vec<String> = std::fs::read_dir(&audio)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["frame_000000.wav", "frame_000001.wav"]);
    }

    #[tokio::test]
    async fn test_noise_tool_writing_nothing_is_a_failure() {
        let temp = TempDir::new().unwrap();
        let (frames, audio) = (temp.path().join("frames"), temp.path().join("audio"));
        write_frames(&frames, 1);

        let stage = EncodeStage::new(
            Arc::new(FakeEncoder { fail_red: None }),
            Some(Arc::new(SilentNoise)),
        );
        let results = run_stage(stage, &frames, &audio).await;

        assert!(!results[0].is_success());
        assert!(!audio.join("frame_000000.wav").exists());
    }

    #[tokio::test]
    async fn test_noise_disabled_publishes_clean_waveform() {
        let temp = TempDir::new().unwrap();
        let (frames, audio) = (temp.path().join("frames"), temp.path().join("audio"));
        write_frames(&frames, 3);

        let stage = EncodeStage::new(Arc::new(FakeEncoder { fail_red: None }), None);
        let results = run_stage(stage, &frames, &audio).await;

        assert!(results.iter().all(JobResult::is_success));
        assert!(audio.join("frame_000002.wav").exists());
    }

    #[tokio::test]
    async fn test_unreadable_frame_is_a_failure() {
        let temp = TempDir::new().unwrap();
        let (frames, audio) = (temp.path().join("frames"), temp.path().join("audio"));
        std::fs::create_dir_all(&frames).unwrap();
        std::fs::write(frames.join("frame_000000.png"), b"not a png").unwrap();

        let stage = EncodeStage::new(Arc::new(FakeEncoder { fail_red: None }), None);
        let results = run_stage(stage, &frames, &audio).await;

        match &results[0] {
            JobResult::Failure { attempts, .. } => assert_eq!(*attempts, 1),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
