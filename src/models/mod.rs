// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod artifact;
pub mod job;

pub use artifact::{ArtifactKind, SequenceIndex};
pub use job::{FailureRecord, JobResult, WorkItem};
