// file: src/artifacts/mod.rs
// description: on-disk artifact directory operations module exports
// reference: internal module structure

pub mod atomic;
pub mod scanner;

pub use atomic::{ScopedWrite, stage_image, write_image_atomic};
pub use scanner::{ArtifactScanner, ScannedArtifact};
