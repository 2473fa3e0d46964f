// file: src/media/video.rs
// description: video frame extraction and muxing through ffmpeg raw RGB pipes
// reference: https://ffmpeg.org/ffmpeg-formats.html#rawvideo

use crate::error::{PipelineError, Result};
use image::RgbImage;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

pub type FrameStream<'a> = Box<dyn Iterator<Item = Result<RgbImage>> + Send + 'a>;

/// Frame-level access to a video container.
pub trait VideoCodec: Send + Sync {
    /// Decode `source` front to back, scaling every frame to `width`x`height`.
    /// Fails up front if the source cannot be opened.
    fn read_frames(&self, source: &Path, width: u32, height: u32) -> Result<FrameStream<'_>>;

    /// Mux `frames` into `dest` at `fps`. All frames must share the first
    /// frame's dimensions. Returns the number of frames written.
    fn write_video(
        &self,
        dest: &Path,
        frames: &mut dyn Iterator<Item = Result<RgbImage>>,
        fps: u32,
    ) -> Result<usize>;
}

pub struct FfmpegVideo {
    ffmpeg: PathBuf,
}

impl FfmpegVideo {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        cmd
    }
}

impl VideoCodec for FfmpegVideo {
    fn read_frames(&self, source: &Path, width: u32, height: u32) -> Result<FrameStream<'_>> {
        if !source.is_file() {
            return Err(PipelineError::SourceUnreadable {
                path: source.to_path_buf(),
                message: "file does not exist".to_string(),
            });
        }

        let mut cmd = self.base_command();
        cmd.arg("-nostdin")
            .arg("-i")
            .arg(source)
            .arg("-vf")
            .arg(format!("scale={width}:{height}"))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Spawning ffmpeg decoder for {}", source.display());
        let mut child = cmd.spawn().map_err(|e| PipelineError::SourceUnreadable {
            path: source.to_path_buf(),
            message: format!("failed to spawn ffmpeg: {e}"),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            PipelineError::tool("ffmpeg", "decoder stdout was not captured")
        })?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Box::new(RawFrameReader {
            child,
            stdout: BufReader::new(stdout),
            stderr,
            source: source.to_path_buf(),
            width,
            height,
            finished: false,
        }))
    }

    fn write_video(
        &self,
        dest: &Path,
        frames: &mut dyn Iterator<Item = Result<RgbImage>>,
        fps: u32,
    ) -> Result<usize> {
        let Some(first) = frames.next().transpose()? else {
            return Err(PipelineError::Validation("no frames to write".to_string()));
        };
        let (width, height) = first.dimensions();

        let mut cmd = self.base_command();
        cmd.arg("-y")
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(fps.to_string())
            .args(["-i", "pipe:0"])
            // yuv420p needs even dimensions
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "mpeg4", "-q:v", "2", "-pix_fmt", "yuv420p"])
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::tool("ffmpeg", format!("failed to spawn: {e}")))?;
        let stderr = child.stderr.take().map(drain_stderr);

        let written = match feed_frames(&mut child, first, frames, (width, height)) {
            Ok(count) => count,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        let status = child.wait()?;
        let log = stderr.map(join_stderr).unwrap_or_default();
        if !status.success() {
            return Err(PipelineError::tool(
                "ffmpeg",
                format!("encoder exited with status {status}: {}", log.trim()),
            ));
        }

        debug!("Muxed {} frames into {}", written, dest.display());
        Ok(written)
    }
}

fn feed_frames(
    child: &mut Child,
    first: RgbImage,
    rest: &mut dyn Iterator<Item = Result<RgbImage>>,
    dims: (u32, u32),
) -> Result<usize> {
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| PipelineError::tool("ffmpeg", "encoder stdin was not captured"))?;
    let mut stdin = BufWriter::new(stdin);

    stdin.write_all(first.as_raw()).map_err(broken_pipe)?;
    let mut written = 1;

    for frame in rest {
        let frame = frame?;
        if frame.dimensions() != dims {
            return Err(PipelineError::Validation(format!(
                "frame {} is {}x{}, expected {}x{}",
                written,
                frame.width(),
                frame.height(),
                dims.0,
                dims.1
            )));
        }
        stdin.write_all(frame.as_raw()).map_err(broken_pipe)?;
        written += 1;
    }

    stdin.flush().map_err(broken_pipe)?;
    // dropping stdin closes the pipe so ffmpeg can finish the file
    Ok(written)
}

fn broken_pipe(e: std::io::Error) -> PipelineError {
    PipelineError::tool("ffmpeg", format!("encoder stopped accepting frames: {e}"))
}

fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut log = String::new();
        let _ = stderr.read_to_string(&mut log);
        log
    })
}

fn join_stderr(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

struct RawFrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    source: PathBuf,
    width: u32,
    height: u32,
    finished: bool,
}

impl RawFrameReader {
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Wait for ffmpeg once the stream is exhausted and surface its failure.
    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let log = self.stderr.take().map(join_stderr).unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        Err(PipelineError::SourceUnreadable {
            path: self.source.clone(),
            message: format!("ffmpeg exited with status {status}: {}", log.trim()),
        })
    }
}

impl Iterator for RawFrameReader {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut buf = vec![0u8; self.frame_len()];
        match read_full(&mut self.stdout, &mut buf) {
            Ok(0) => self.finish().err().map(Err),
            Ok(n) if n == buf.len() => {
                RgbImage::from_raw(self.width, self.height, buf).map(Ok)
            }
            Ok(n) => {
                let _ = self.finish();
                Some(Err(PipelineError::SourceUnreadable {
                    path: self.source.clone(),
                    message: format!("truncated frame ({} of {} bytes)", n, self.frame_len()),
                }))
            }
            Err(e) => {
                let _ = self.finish();
                Some(Err(PipelineError::file_operation(&self.source, e)))
            }
        }
    }
}

impl Drop for RawFrameReader {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.child.kill() {
                warn!("Failed to stop ffmpeg decoder: {}", e);
            }
            let _ = self.child.wait();
        }
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
