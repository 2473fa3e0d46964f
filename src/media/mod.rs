// file: src/media/mod.rs
// description: external media tool integrations module exports
// reference: internal module structure

pub mod command;
pub mod noise;
pub mod tools;
pub mod video;

pub use command::{ToolCommand, ToolOutput};
pub use noise::{FfmpegNoiseMixer, NoiseFilter};
pub use tools::resolve_ffmpeg;
pub use video::{FfmpegVideo, FrameStream, VideoCodec};
