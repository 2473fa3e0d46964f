// file: src/models/artifact.rs
// description: sequence index and on-disk artifact naming shared by every stage
// reference: https://docs.rs/regex

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Zero-padding width of the index in artifact filenames.
pub const INDEX_WIDTH: usize = 6;

lazy_static! {
    static ref ARTIFACT_NAME: Regex =
        Regex::new(r"^frame_(\d+)\.([A-Za-z0-9]+)$").expect("ARTIFACT_NAME regex is valid");
}

/// Position of a frame in the source video. The only ordering key used
/// between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceIndex(pub u64);

impl SequenceIndex {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn file_stem(self) -> String {
        format!("frame_{:0width$}", self.0, width = INDEX_WIDTH)
    }

    /// Parse the index out of a `frame_<digits>.<ext>` filename.
    pub fn from_file_name(name: &str) -> Option<(Self, &str)> {
        let captures = ARTIFACT_NAME.captures(name)?;
        let index = captures.get(1)?.as_str().parse::<u64>().ok()?;
        let extension = captures.get(2)?.as_str();
        Some((Self(index), extension))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::from_file_name(name).map(|(index, _)| index)
    }
}

impl fmt::Display for SequenceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// The three per-frame artifact families the pipeline keeps on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Frame,
    Waveform,
    Decoded,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Frame | ArtifactKind::Decoded => "png",
            ArtifactKind::Waveform => "wav",
        }
    }

    pub fn file_name(self, index: SequenceIndex) -> String {
        format!("{}.{}", index.file_stem(), self.extension())
    }

    pub fn path_in(self, dir: &Path, index: SequenceIndex) -> PathBuf {
        dir.join(self.file_name(index))
    }

    /// Index of `name` if it is an artifact of this kind.
    pub fn parse(self, name: &str) -> Option<SequenceIndex> {
        match SequenceIndex::from_file_name(name) {
            Some((index, ext)) if ext.eq_ignore_ascii_case(self.extension()) => Some(index),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::Frame => "frame",
            ArtifactKind::Waveform => "waveform",
            ArtifactKind::Decoded => "decoded frame",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_names_are_zero_padded() {
        assert_eq!(ArtifactKind::Frame.file_name(SequenceIndex(0)), "frame_000000.png");
        assert_eq!(ArtifactKind::Waveform.file_name(SequenceIndex(42)), "frame_000042.wav");
    }

    #[test]
    fn test_lexicographic_matches_numeric_order() {
        let mut names: Vec<String> = (0..1200u64)
            .map(|i| ArtifactKind::Frame.file_name(SequenceIndex(i)))
            .collect();
        let numeric = names.clone();
        names.sort();
        assert_eq!(names, numeric);
    }

    #[test]
    fn test_parse_round_trip_and_wide_indices() {
        assert_eq!(
            SequenceIndex::from_file_name("frame_000010.png"),
            Some((SequenceIndex(10), "png"))
        );
        assert_eq!(
            ArtifactKind::Decoded.parse("frame_1234567.png"),
            Some(SequenceIndex(1_234_567))
        );
        assert_eq!(ArtifactKind::Decoded.parse("frame_10"), None);
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert_eq!(ArtifactKind::Waveform.parse("frame_000001.png"), None);
        assert_eq!(ArtifactKind::Frame.parse(".frame_000001.tmpX1y2.png"), None);
        assert_eq!(ArtifactKind::Frame.parse("notes.txt"), None);
        assert_eq!(ArtifactKind::Frame.parse("frame_-1.png"), None);
    }

    #[test]
    fn test_numeric_ordering_beats_string_ordering() {
        let mut indices = vec![
            SequenceIndex::from_path(Path::new("d/frame_10.png")).unwrap(),
            SequenceIndex::from_path(Path::new("d/frame_9.png")).unwrap(),
        ];
        indices.sort();
        assert_eq!(indices, vec![SequenceIndex(9), SequenceIndex(10)]);
    }
}
