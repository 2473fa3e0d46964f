// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

pub mod decode;
pub mod encode;
pub mod extractor;
pub mod fanout;
mod orchestrator;
mod progress;
pub mod reassembler;
pub mod report;

pub use decode::DecodeStage;
pub use encode::EncodeStage;
pub use extractor::FrameExtractor;
pub use fanout::{Attempt, FanOut, ItemProcessor};
pub use orchestrator::{Collaborators, PipelineOrchestrator, PipelineStage};
pub use progress::{ProgressTracker, StageStats};
pub use reassembler::{AssemblySummary, Reassembler};
pub use report::{RunReport, RunStatus, StageReport};
