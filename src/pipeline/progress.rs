// file: src/pipeline/progress.rs
// description: per-stage progress bars and completion statistics for fan-out stages
// reference: uses indicatif for progress bars and tracks per-item outcomes

use crate::models::JobResult;
use crate::utils::logging::format_item;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl StageStats {
    pub fn new(stage: &str, total: usize) -> Self {
        Self {
            stage: stage.to_string(),
            total,
            ..Self::default()
        }
    }

    pub fn items_per_second(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.succeeded + self.failed) as f64 * 1000.0 / self.duration_ms as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.succeeded + self.failed;
        if total == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / total as f64) * 100.0
    }
}

/// Tracks one fan-out stage. Per-item report lines are printed through the
/// bar; with the bar hidden they go to the log instead.
pub struct ProgressTracker {
    multi: MultiProgress,
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    stage: String,
    total: usize,
    visible: bool,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(stage: &str, total: usize, visible: bool) -> Self {
        Self::with_color(stage, total, visible, true)
    }

    /// A tracker that never draws, for tests and scripted runs.
    pub fn hidden(stage: &str, total: usize) -> Self {
        Self::with_color(stage, total, false, false)
    }

    pub fn with_color(stage: &str, total: usize, visible: bool, colored: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);

        let main_bar = create_progress_bar(&multi, total as u64, colored);
        main_bar.set_message(stage.to_string());
        let detail_bar = create_detail_bar(&multi);

        Self {
            multi,
            main_bar,
            detail_bar,
            stage: stage.to_string(),
            total,
            visible,
            completed: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count one finished item and emit its `[i/total]` line, through the
    /// bar when visible and through the log otherwise. Returns the line.
    pub fn record(&self, result: &JobResult, label: &str) -> String {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;

        let (error, attempts) = match result {
            JobResult::Success { .. } => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
                (None, 1)
            }
            JobResult::Failure {
                error, attempts, ..
            } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                (Some(error.as_str()), *attempts)
            }
        };

        let line = format_item(done, self.total, label, error);
        if self.visible {
            let _ = self.multi.println(&line);
        } else if error.is_none() {
            info!("{} {}", self.stage, line);
        } else {
            warn!("{} {} (attempts: {})", self.stage, line, attempts);
        }

        self.main_bar.inc(1);
        self.update_detail_bar();
        line
    }

    pub fn finish(&self) {
        self.main_bar
            .finish_with_message(format!("{} complete", self.stage));
        self.detail_bar.finish_and_clear();
    }

    pub fn get_stats(&self) -> StageStats {
        StageStats {
            stage: self.stage.clone(),
            total: self.total,
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            duration_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }

    fn update_detail_bar(&self) {
        let succeeded = self.succeeded.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);

        self.detail_bar
            .set_message(format!("Succeeded: {} | Failed: {}", succeeded, failed));
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_progress_bar(multi: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi.add(ProgressBar::new(total));
    let (template, chars) = if colored {
        (
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            "█▓▒░",
        )
    } else {
        (
            "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}",
            "=>-",
        )
    };

    let style = ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(chars);
    bar.set_style(style);
    bar
}

fn create_detail_bar(multi: &MultiProgress) -> ProgressBar {
    let bar = multi.add(ProgressBar::new(0));
    let style = ProgressStyle::default_bar()
        .template("{msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}
