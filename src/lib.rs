// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod artifacts;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod sstv;
pub mod utils;

pub use artifacts::{ArtifactScanner, ScannedArtifact, ScopedWrite};
pub use config::{Config, MediaConfig, NoiseConfig, PathsConfig, PipelineConfig, ToolsConfig};
pub use error::{PipelineError, Result};
pub use media::{FfmpegNoiseMixer, FfmpegVideo, NoiseFilter, VideoCodec};
pub use models::{ArtifactKind, FailureRecord, JobResult, SequenceIndex, WorkItem};
pub use pipeline::{
    Collaborators, PipelineOrchestrator, PipelineStage, RunReport, RunStatus, StageReport,
    StageStats,
};
pub use sstv::{Robot36Decoder, Robot36Encoder, SstvDecoder, SstvEncoder, Waveform};
pub use utils::{
    HealthCheck, HealthReport, HealthStatus, OperationTimer, PerformanceMetrics, Validator,
};
