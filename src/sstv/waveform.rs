// file: src/sstv/waveform.rs
// description: in-memory mono waveform with PCM WAV input and output
// reference: https://docs.rs/hound

use crate::artifacts::ScopedWrite;
use crate::error::{PipelineError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Mono audio normalized to [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub samples: Vec<f32>,
}

impl Waveform {
    pub fn new(sample_rate: u32, bit_depth: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            bit_depth,
            samples,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Read a WAV file, keeping only the first channel.
    pub fn read_wav(path: &Path) -> Result<Self> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = full_scale(spec.bits_per_sample);
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let samples = interleaved.into_iter().step_by(channels).collect();

        Ok(Self {
            sample_rate: spec.sample_rate,
            bit_depth: spec.bits_per_sample,
            samples,
        })
    }

    /// Write as integer PCM at `bit_depth` through a scoped write.
    pub fn write_wav(&self, dest: &Path) -> Result<PathBuf> {
        self.stage_wav(dest)?.commit()
    }

    /// Write the WAV beside `dest` without publishing it.
    pub fn stage_wav(&self, dest: &Path) -> Result<ScopedWrite> {
        let mut scoped = ScopedWrite::new(dest)?;
        self.write_wav_to(scoped.file_mut())?;
        Ok(scoped)
    }

    pub(crate) fn write_wav_to(&self, file: &mut std::fs::File) -> Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: SampleFormat::Int,
        };
        let scale = full_scale(self.bit_depth);

        let mut writer = WavWriter::new(BufWriter::new(file), spec)?;
        for &sample in &self.samples {
            let value = (sample.clamp(-1.0, 1.0) * scale).round();
            match self.bit_depth {
                8 => writer.write_sample(value as i8)?,
                16 => writer.write_sample(value as i16)?,
                24 | 32 => writer.write_sample(value as i32)?,
                other => {
                    return Err(PipelineError::Validation(format!(
                        "unsupported bit depth {other}"
                    )));
                }
            }
        }
        writer.finalize()?;
        Ok(())
    }
}

fn full_scale(bits: u16) -> f32 {
    let bits = bits.clamp(2, 32) as i32;
    (2f64.powi(bits - 1) - 1.0) as f32
}
