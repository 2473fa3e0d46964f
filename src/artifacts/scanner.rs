// file: src/artifacts/scanner.rs
// description: artifact discovery ordered by parsed sequence index
// reference: https://docs.rs/walkdir

use crate::error::{PipelineError, Result};
use crate::models::{ArtifactKind, SequenceIndex};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedArtifact {
    pub index: SequenceIndex,
    pub path: PathBuf,
}

pub struct ArtifactScanner {
    kind: ArtifactKind,
}

impl ArtifactScanner {
    pub fn new(kind: ArtifactKind) -> Self {
        Self { kind }
    }

    /// All artifacts of this kind directly inside `dir`, sorted by index.
    /// Directory listing order is never trusted.
    pub fn scan(&self, dir: &Path) -> Result<Vec<ScannedArtifact>> {
        if !dir.is_dir() {
            debug!("Artifact directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| {
                PipelineError::Validation(format!("Cannot list {}: {}", dir.display(), e))
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                continue;
            };

            match self.kind.parse(name) {
                Some(index) => artifacts.push(ScannedArtifact {
                    index,
                    path: entry.path().to_path_buf(),
                }),
                None => debug!("Ignoring non-artifact file: {}", entry.path().display()),
            }
        }

        artifacts.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));

        let before = artifacts.len();
        artifacts.dedup_by_key(|a| a.index);
        if artifacts.len() != before {
            warn!(
                "Dropped {} duplicate {} artifacts in {}",
                before - artifacts.len(),
                self.kind,
                dir.display()
            );
        }

        debug!(
            "Found {} {} artifacts in {}",
            artifacts.len(),
            self.kind,
            dir.display()
        );
        Ok(artifacts)
    }

    /// Remove artifacts of this kind left over from a previous run.
    pub fn clear_stale(&self, dir: &Path) -> Result<usize> {
        let stale = self.scan(dir)?;
        for artifact in &stale {
            fs::remove_file(&artifact.path)
                .map_err(|e| PipelineError::file_operation(&artifact.path, e))?;
        }
        if !stale.is_empty() {
            info!(
                "Removed {} stale {} artifacts from {}",
                stale.len(),
                self.kind,
                dir.display()
            );
        }
        Ok(stale.len())
    }
}
