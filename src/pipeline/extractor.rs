// file: src/pipeline/extractor.rs
// description: turns a video into densely indexed, fixed-size frame images
// reference: single forward pass over the decoded video stream

use crate::artifacts::{ArtifactScanner, write_image_atomic};
use crate::error::{PipelineError, Result};
use crate::media::VideoCodec;
use crate::models::{ArtifactKind, SequenceIndex};
use image::imageops::{self, FilterType};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub struct FrameExtractor {
    codec: Arc<dyn VideoCodec>,
    width: u32,
    height: u32,
    max_frames: Option<usize>,
}

impl FrameExtractor {
    pub fn new(codec: Arc<dyn VideoCodec>, width: u32, height: u32) -> Self {
        Self {
            codec,
            width,
            height,
            max_frames: None,
        }
    }

    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Write every frame of `source` into `frames_dir` as `frame_{i:06}.png`,
    /// indices `0..n` with no gaps. Any decode error aborts the pass.
    /// The previous run's frames are left alone until the source has
    /// delivered its first frame.
    pub fn extract(&self, source: &Path, frames_dir: &Path) -> Result<usize> {
        let limit = self.max_frames.unwrap_or(usize::MAX);
        let mut frames = self
            .codec
            .read_frames(source, self.width, self.height)?
            .take(limit);
        let Some(first) = frames.next().transpose()? else {
            return Err(PipelineError::NoFrames(source.to_path_buf()));
        };

        ArtifactScanner::new(ArtifactKind::Frame).clear_stale(frames_dir)?;
        std::fs::create_dir_all(frames_dir)
            .map_err(|e| PipelineError::file_operation(frames_dir, e))?;

        let mut count = 0usize;
        for frame in std::iter::once(Ok(first)).chain(frames) {
            let mut frame = frame?;
            if frame.dimensions() != (self.width, self.height) {
                debug!(
                    "Frame {} delivered at {}x{}, resizing",
                    count,
                    frame.width(),
                    frame.height()
                );
                frame = imageops::resize(&frame, self.width, self.height, FilterType::Triangle);
            }

            let index = SequenceIndex(count as u64);
            write_image_atomic(&ArtifactKind::Frame.path_in(frames_dir, index), &frame)?;
            count += 1;
        }

        info!(
            "Extracted {} frames from {} into {}",
            count,
            source.display(),
            frames_dir.display()
        );
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::media::FrameStream;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Video stand-in: frame `i` is a solid image whose red channel is `i * 10`.
    /// Written videos are recorded as the red channel of each frame.
    pub(crate) struct FakeVideo {
        pub frames: usize,
        pub size: (u32, u32),
        pub fail_at: Option<usize>,
        pub written: Mutex<Vec<u8>>,
    }

    impl FakeVideo {
        pub(crate) fn new(frames: usize) -> Self {
            Self {
                frames,
                size: (16, 12),
                fail_at: None,
                written: Mutex::new(Vec::new()),
            }
        }
    }

    impl VideoCodec for FakeVideo {
        fn read_frames(&self, source: &Path, _width: u32, _height: u32) -> Result<FrameStream<'_>> {
            if !source.exists() {
                return Err(PipelineError::SourceUnreadable {
                    path: source.to_path_buf(),
                    message: "missing".to_string(),
                });
            }
            let (w, h) = self.size;
            let fail_at = self.fail_at;
            Ok(Box::new((0..self.frames).map(move |i| {
                if Some(i) == fail_at {
                    return Err(PipelineError::tool("ffmpeg", "corrupt packet"));
                }
                Ok(RgbImage::from_pixel(w, h, Rgb([(i * 10) as u8, 100, 50])))
            })))
        }

        fn write_video(
            &self,
            dest: &Path,
            frames: &mut dyn Iterator<Item = Result<RgbImage>>,
            _fps: u32,
        ) -> Result<usize> {
            let mut reds = Vec::new();
            for frame in frames {
                reds.push(frame?.get_pixel(0, 0).0[0]);
            }
            std::fs::write(dest, &reds)?;
            let count = reds.len();
            *self.written.lock().unwrap() = reds;
            Ok(count)
        }
    }

    fn source(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("input.mp4");
        std::fs::write(&path, b"video").unwrap();
        path
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_frames_are_dense_and_zero_padded() {
        let temp = TempDir::new().unwrap();
        let frames_dir = temp.path().join("frames");
        let extractor = FrameExtractor::new(Arc::new(FakeVideo::new(12)), 16, 12);

        let count = extractor.extract(&source(&temp), &frames_dir).unwrap();

        assert_eq!(count, 12);
        let listed = names(&frames_dir);
        let expected: Vec<String> = (0..12).map(|i| format!("frame_{:06}.png", i)).collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_frames_are_resized_to_target() {
        let temp = TempDir::new().unwrap();
        let frames_dir = temp.path().join("frames");
        let extractor = FrameExtractor::new(Arc::new(FakeVideo::new(1)), 32, 24);

        extractor.extract(&source(&temp), &frames_dir).unwrap();

        let frame = image::open(frames_dir.join("frame_000000.png")).unwrap();
        assert_eq!((frame.width(), frame.height()), (32, 24));
    }

    #[test]
    fn test_rerun_replaces_stale_frames() {
        let temp = TempDir::new().unwrap();
        let frames_dir = temp.path().join("frames");
        std::fs::create_dir_all(&frames_dir).unwrap();
        std::fs::write(frames_dir.join("frame_000099.png"), b"stale").unwrap();
        std::fs::write(frames_dir.join("notes.txt"), b"keep").unwrap();

        let extractor = FrameExtractor::new(Arc::new(FakeVideo::new(3)), 16, 12);
        let first = extractor.extract(&source(&temp), &frames_dir).unwrap();
        let second = extractor.extract(&source(&temp), &frames_dir).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            names(&frames_dir),
            vec![
                "frame_000000.png",
                "frame_000001.png",
                "frame_000002.png",
                "notes.txt"
            ]
        );
    }

    #[test]
    fn test_max_frames_caps_extraction() {
        let temp = TempDir::new().unwrap();
        let extractor = FrameExtractor::new(Arc::new(FakeVideo::new(10)), 16, 12)
            .with_max_frames(Some(4));
        let count = extractor
            .extract(&source(&temp), &temp.path().join("frames"))
            .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_empty_video_is_fatal() {
        let temp = TempDir::new().unwrap();
        let extractor = FrameExtractor::new(Arc::new(FakeVideo::new(0)), 16, 12);
        let result = extractor.extract(&source(&temp), &temp.path().join("frames"));
        assert!(matches!(result, Err(PipelineError::NoFrames(_))));
    }

    #[test]
    fn test_unreadable_source_and_mid_stream_errors_are_fatal() {
        let temp = TempDir::new().unwrap();
        let extractor = FrameExtractor::new(Arc::new(FakeVideo::new(3)), 16, 12);
        let result = extractor.extract(&temp.path().join("missing.mp4"), &temp.path().join("f"));
        assert!(matches!(result, Err(PipelineError::SourceUnreadable { .. })));

        let mut video = FakeVideo::new(5);
        video.fail_at = Some(2);
        let extractor = FrameExtractor::new(Arc::new(video), 16, 12);
        assert!(extractor
            .extract(&source(&temp), &temp.path().join("frames"))
            .is_err());
    }

    #[test]
    fn test_failed_open_keeps_previous_frames() {
        let temp = TempDir::new().unwrap();
        let frames_dir = temp.path().join("frames");
        let extractor = FrameExtractor::new(Arc::new(FakeVideo::new(2)), 16, 12);
        extractor.extract(&source(&temp), &frames_dir).unwrap();

        let result = extractor.extract(&temp.path().join("missing.mp4"), &frames_dir);
        assert!(matches!(result, Err(PipelineError::SourceUnreadable { .. })));

        let mut broken = FakeVideo::new(2);
        broken.fail_at = Some(0);
        let result = FrameExtractor::new(Arc::new(broken), 16, 12)
            .extract(&source(&temp), &frames_dir);
        assert!(result.is_err());

        assert_eq!(names(&frames_dir), vec!["frame_000000.png", "frame_000001.png"]);
    }
}
