// file: src/models/job.rs
// description: fan-out work items and their typed outcomes
// reference: internal data structures

use crate::models::SequenceIndex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One frame's worth of fan-out work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub index: SequenceIndex,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl WorkItem {
    pub fn new(index: SequenceIndex, input: PathBuf, output: PathBuf) -> Self {
        Self {
            index,
            input,
            output,
        }
    }

    /// Filename of the input, used as the item's label in reports.
    pub fn label(&self) -> String {
        file_label(&self.input)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success {
        index: SequenceIndex,
        output: PathBuf,
    },
    Failure {
        index: SequenceIndex,
        input: PathBuf,
        error: String,
        attempts: u32,
    },
}

impl JobResult {
    pub fn index(&self) -> SequenceIndex {
        match self {
            JobResult::Success { index, .. } | JobResult::Failure { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn failure_record(&self) -> Option<FailureRecord> {
        match self {
            JobResult::Success { .. } => None,
            JobResult::Failure {
                index,
                input,
                error,
                attempts,
            } => Some(FailureRecord {
                index: *index,
                input: input.clone(),
                error: error.clone(),
                attempts: *attempts,
            }),
        }
    }
}

/// Persisted form of a failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub index: SequenceIndex,
    pub input: PathBuf,
    pub error: String,
    pub attempts: u32,
}

pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_label_is_file_name() {
        let item = WorkItem::new(
            SequenceIndex(7),
            PathBuf::from("sstv_audio/frame_000007.wav"),
            PathBuf::from("decoded_images/frame_000007.png"),
        );
        assert_eq!(item.label(), "frame_000007.wav");
    }

    #[test]
    fn test_failure_record_only_for_failures() {
        let ok = JobResult::Success {
            index: SequenceIndex(1),
            output: PathBuf::from("out/frame_000001.wav"),
        };
        assert!(ok.is_success());
        assert!(ok.failure_record().is_none());

        let failed = JobResult::Failure {
            index: SequenceIndex(2),
            input: PathBuf::from("in/frame_000002.png"),
            error: "boom".to_string(),
            attempts: 2,
        };
        let record = failed.failure_record().unwrap();
        assert_eq!(record.index, SequenceIndex(2));
        assert_eq!(record.attempts, 2);
        assert_eq!(failed.index(), SequenceIndex(2));
    }
}
