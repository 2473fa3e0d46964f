// file: src/media/tools.rs
// description: external tool discovery and availability reporting
// reference: https://docs.rs/which

use crate::config::ToolsConfig;
use crate::error::{PipelineError, Result};
use crate::utils::telemetry::HealthCheck;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

pub const FFMPEG: &str = "ffmpeg";

/// Resolve ffmpeg: an existing configured path wins, otherwise `PATH`.
pub fn resolve_ffmpeg(tools: &ToolsConfig) -> Result<PathBuf> {
    if let Some(custom) = tools.ffmpeg_path.as_deref() {
        if custom.exists() {
            return Ok(custom.to_path_buf());
        }
        warn!(
            "Configured ffmpeg path {} does not exist, searching PATH",
            custom.display()
        );
    }

    which::which(FFMPEG).map_err(|_| {
        PipelineError::tool(FFMPEG, "not found; is it installed and in PATH?")
    })
}

/// First line of `ffmpeg -version`.
pub fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
}

pub fn check_ffmpeg(tools: &ToolsConfig) -> HealthCheck {
    let start = Instant::now();
    match resolve_ffmpeg(tools) {
        Ok(path) => match detect_version(&path) {
            Some(version) => {
                debug!("Found {} at {}", version, path.display());
                HealthCheck::healthy(FFMPEG, start.elapsed()).with_message(format!(
                    "{} ({})",
                    version,
                    path.display()
                ))
            }
            None => HealthCheck::degraded(
                FFMPEG,
                format!("{} found but -version failed", path.display()),
                start.elapsed(),
            ),
        },
        Err(e) => HealthCheck::unhealthy(FFMPEG, e.to_string(), start.elapsed()),
    }
}
