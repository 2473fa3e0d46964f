// file: src/utils/validation.rs
// description: pre-flight checks for pipeline inputs and output locations
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use std::fs;
use std::path::Path;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "m4v", "mpg", "mpeg"];

pub struct Validator;

impl Validator {
    /// The source must be an existing, non-empty regular file.
    pub fn validate_input_video(path: &Path) -> Result<()> {
        let meta = fs::metadata(path).map_err(|e| PipelineError::SourceUnreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if !meta.is_file() {
            return Err(PipelineError::SourceUnreadable {
                path: path.to_path_buf(),
                message: "not a regular file".to_string(),
            });
        }

        if meta.len() == 0 {
            return Err(PipelineError::SourceUnreadable {
                path: path.to_path_buf(),
                message: "file is empty".to_string(),
            });
        }

        Ok(())
    }

    /// Output video must name a file with a known container extension.
    pub fn validate_output_video(path: &Path) -> Result<()> {
        if path.is_dir() {
            return Err(PipelineError::Validation(format!(
                "Output path is a directory: {}",
                path.display()
            )));
        }

        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
        {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            _ => Err(PipelineError::Validation(format!(
                "Output video needs a container extension ({}): {}",
                VIDEO_EXTENSIONS.join(", "),
                path.display()
            ))),
        }
    }

    pub fn validate_worker_count(name: &str, workers: usize) -> Result<()> {
        if workers == 0 {
            return Err(PipelineError::Config(format!(
                "{} must be greater than 0",
                name
            )));
        }

        if workers > 1024 {
            return Err(PipelineError::Config(format!(
                "{} too large (max 1024)",
                name
            )));
        }

        Ok(())
    }
}
