// file: src/pipeline/reassembler.rs
// description: muxes surviving decoded frames back into a video in index order
// reference: single sequential pass, publish by rename after the muxer succeeds

use crate::artifacts::{ArtifactScanner, ScannedArtifact, ScopedWrite};
use crate::error::{PipelineError, Result};
use crate::media::VideoCodec;
use crate::models::{ArtifactKind, FailureRecord, SequenceIndex};
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblySummary {
    pub output: PathBuf,
    pub frames_written: usize,
    pub order: Vec<SequenceIndex>,
    pub skipped: Vec<FailureRecord>,
}

pub struct Reassembler {
    codec: Arc<dyn VideoCodec>,
    fps: u32,
}

impl Reassembler {
    pub fn new(codec: Arc<dyn VideoCodec>, fps: u32) -> Self {
        Self { codec, fps }
    }

    /// Gaps in the index sequence are skipped, not filled. With no usable
    /// frame nothing is written and `NothingToAssemble` is returned.
    pub fn assemble(&self, decoded_dir: &Path, output: &Path) -> Result<AssemblySummary> {
        let artifacts = ArtifactScanner::new(ArtifactKind::Decoded).scan(decoded_dir)?;
        if artifacts.is_empty() {
            return Err(PipelineError::NothingToAssemble(decoded_dir.to_path_buf()));
        }

        let mut skipped = Vec::new();
        let mut order = Vec::new();
        let mut readable = artifacts
            .iter()
            .filter_map(|artifact| match load(artifact) {
                Ok(image) => Some((artifact.index, image)),
                Err(e) => {
                    warn!("Skipping unreadable frame {}: {}", artifact.path.display(), e);
                    skipped.push(FailureRecord {
                        index: artifact.index,
                        input: artifact.path.clone(),
                        error: e.to_string(),
                        attempts: 1,
                    });
                    None
                }
            });

        let Some((first_index, first)) = readable.next() else {
            return Err(PipelineError::NothingToAssemble(decoded_dir.to_path_buf()));
        };
        let (width, height) = first.dimensions();
        debug!("Output dimensions {}x{} from frame {}", width, height, first_index);

        let scoped = ScopedWrite::new(output)?;
        let frames_written = {
            let mut frames = std::iter::once((first_index, first))
                .chain(readable)
                .map(|(index, image)| {
                    order.push(index);
                    Ok::<_, PipelineError>(fit(image, width, height))
                });
            self.codec.write_video(scoped.path(), &mut frames, self.fps)?
        };
        let output = scoped.commit()?;

        info!(
            "Assembled {} frames into {} at {} fps",
            frames_written,
            output.display(),
            self.fps
        );

        Ok(AssemblySummary {
            output,
            frames_written,
            order,
            skipped,
        })
    }
}

fn load(artifact: &ScannedArtifact) -> Result<RgbImage> {
    Ok(image::open(&artifact.path)?.to_rgb8())
}

fn fit(image: RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    imageops::resize(&image, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::write_image_atomic;
    use crate::pipeline::extractor::tests::FakeVideo;
    use image::Rgb;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn decoded(dir: &Path, index: u64, size: (u32, u32)) {
        let image = RgbImage::from_pixel(size.0, size.1, Rgb([index as u8 * 10, 0, 0]));
        write_image_atomic(&dir.join(format!("frame_{:06}.png", index)), &image).unwrap();
    }

    #[test]
    fn test_gaps_are_skipped_and_order_is_numeric() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("decoded");
        for index in [4, 0, 3, 1] {
            decoded(&dir, index, (8, 6));
        }

        let video = Arc::new(FakeVideo::new(0));
        let output = temp.path().join("out.mp4");
        let summary = Reassembler::new(video.clone(), 25)
            .assemble(&dir, &output)
            .unwrap();

        assert_eq!(summary.frames_written, 4);
        assert_eq!(
            summary.order,
            vec![
                SequenceIndex(0),
                SequenceIndex(1),
                SequenceIndex(3),
                SequenceIndex(4)
            ]
        );
        assert_eq!(*video.written.lock().unwrap(), vec![0, 10, 30, 40]);
        assert!(output.exists());
    }

    #[test]
    fn test_frame_10_follows_frame_9() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("decoded");
        std::fs::create_dir_all(&dir).unwrap();
        for (name, red) in [("frame_10.png", 100u8), ("frame_9.png", 90u8)] {
            let image = RgbImage::from_pixel(2, 2, Rgb([red, 0, 0]));
            image.save(dir.join(name)).unwrap();
        }

        let video = Arc::new(FakeVideo::new(0));
        Reassembler::new(video.clone(), 25)
            .assemble(&dir, &temp.path().join("out.mp4"))
            .unwrap();

        assert_eq!(*video.written.lock().unwrap(), vec![90, 100]);
    }

    #[test]
    fn test_mismatched_frames_are_resized() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("decoded");
        decoded(&dir, 0, (8, 6));
        decoded(&dir, 1, (16, 12));

        let summary = Reassembler::new(Arc::new(FakeVideo::new(0)), 25)
            .assemble(&dir, &temp.path().join("out.mp4"))
            .unwrap();
        assert_eq!(summary.frames_written, 2);
    }

    #[test]
    fn test_zero_survivors_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("decoded");
        std::fs::create_dir_all(&dir).unwrap();
        let output = temp.path().join("out.mp4");

        let result = Reassembler::new(Arc::new(FakeVideo::new(0)), 25).assemble(&dir, &output);

        assert!(matches!(result, Err(PipelineError::NothingToAssemble(_))));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unreadable_frames_are_skipped() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("decoded");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("frame_000000.png"), b"broken").unwrap();
        decoded(&dir, 1, (8, 6));

        let summary = Reassembler::new(Arc::new(FakeVideo::new(0)), 25)
            .assemble(&dir, &temp.path().join("out.mp4"))
            .unwrap();

        assert_eq!(summary.order, vec![SequenceIndex(1)]);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].index, SequenceIndex(0));
    }

    #[test]
    fn test_only_unreadable_frames_is_nothing_to_assemble() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("decoded");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("frame_000000.png"), b"broken").unwrap();
        let output = temp.path().join("out.mp4");

        let result = Reassembler::new(Arc::new(FakeVideo::new(0)), 25).assemble(&dir, &output);
        assert!(matches!(result, Err(PipelineError::NothingToAssemble(_))));
        assert!(!output.exists());
    }
}
