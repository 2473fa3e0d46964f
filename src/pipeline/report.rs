// file: src/pipeline/report.rs
// description: json run report recording per-stage outcomes and failed items
// reference: https://docs.rs/serde_json

use crate::artifacts::ScopedWrite;
use crate::error::Result;
use crate::models::{FailureRecord, JobResult};
use crate::pipeline::progress::StageStats;
use crate::utils::telemetry::PerformanceMetrics;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stats: StageStats,
    pub metrics: PerformanceMetrics,
    pub failures: Vec<FailureRecord>,
}

impl StageReport {
    pub fn new(stats: StageStats, metrics: PerformanceMetrics) -> Self {
        Self {
            stats,
            metrics,
            failures: Vec::new(),
        }
    }

    pub fn with_failures(mut self, failures: Vec<FailureRecord>) -> Self {
        self.failures = failures;
        self
    }

    pub fn from_results(
        stats: StageStats,
        metrics: PerformanceMetrics,
        results: &[JobResult],
    ) -> Self {
        let failures = results.iter().filter_map(JobResult::failure_record).collect();
        Self::new(stats, metrics).with_failures(failures)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub input_video: PathBuf,
    pub output_video: Option<PathBuf>,
    pub error: Option<String>,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn new(input_video: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            status: RunStatus::Running,
            input_video: input_video.to_path_buf(),
            output_video: None,
            error: None,
            stages: Vec::new(),
        }
    }

    pub fn push_stage(&mut self, stage: StageReport) {
        self.stages.push(stage);
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stats.stage == name)
    }

    pub fn total_failures(&self) -> usize {
        self.stages.iter().map(|s| s.failures.len()).sum()
    }

    pub fn finish(&mut self, error: Option<String>) {
        self.finished_at = Some(Utc::now().to_rfc3339());
        self.status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.error = error;
    }

    pub fn write(&self, dest: &Path) -> Result<PathBuf> {
        let mut scoped = ScopedWrite::new(dest)?;
        {
            let mut writer = BufWriter::new(scoped.file_mut());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        let path = scoped.commit()?;
        info!("Run report written to {}", path.display());
        Ok(path)
    }
}
