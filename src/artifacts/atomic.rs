// file: src/artifacts/atomic.rs
// description: scoped writes that publish artifacts by atomic rename
// reference: https://docs.rs/tempfile

use crate::error::{PipelineError, Result};
use image::{ImageFormat, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A file being written beside its destination under a hidden temporary
/// name. Nothing is visible at the destination until [`ScopedWrite::commit`];
/// dropping without committing removes the temporary file.
#[derive(Debug)]
pub struct ScopedWrite {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl ScopedWrite {
    pub fn new(dest: impl Into<PathBuf>) -> Result<Self> {
        let dest = dest.into();
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::file_operation(&dir, e))?;

        let stem = dest
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        // keep the real extension last so external tools can infer the format
        let suffix = dest
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{stem}."))
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(|e| PipelineError::file_operation(&dir, e))?;

        Ok(Self { temp, dest })
    }

    /// Temporary path to hand to external tools.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn file_mut(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    /// Atomically move the finished file to its destination, replacing any
    /// previous artifact there. Refuses to publish an empty file.
    pub fn commit(self) -> Result<PathBuf> {
        let len = std::fs::metadata(self.temp.path())
            .map_err(|e| PipelineError::file_operation(self.temp.path(), e))?
            .len();
        if len == 0 {
            return Err(PipelineError::Validation(format!(
                "refusing to publish empty file at {}",
                self.dest.display()
            )));
        }

        let dest = self.dest;
        self.temp
            .persist(&dest)
            .map_err(|e| PipelineError::file_operation(&dest, e.error))?;
        Ok(dest)
    }
}

/// Encode `image` beside `dest` in the format implied by its extension,
/// leaving the commit to the caller.
pub fn stage_image(dest: &Path, image: &RgbImage) -> Result<ScopedWrite> {
    let format = ImageFormat::from_path(dest)?;
    let mut scoped = ScopedWrite::new(dest)?;
    {
        let mut writer = BufWriter::new(scoped.file_mut());
        image.write_to(&mut writer, format)?;
        writer.flush()?;
    }
    Ok(scoped)
}

/// Encode `image` in the format implied by `dest`'s extension and publish it.
pub fn write_image_atomic(dest: &Path, image: &RgbImage) -> Result<PathBuf> {
    stage_image(dest, image)?.commit()
}
