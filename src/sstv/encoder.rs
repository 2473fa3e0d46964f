// file: src/sstv/encoder.rs
// description: Robot36 waveform synthesis from RGB images
// reference: phase-continuous FM tone generation with VIS header

use crate::error::Result;
use crate::sstv::mode::{VIS_BIT_MS, VIS_BREAK_MS, VIS_LEADER_MS};
use crate::sstv::{
    FREQ_BLACK, FREQ_SYNC, FREQ_VIS_BIT0, FREQ_VIS_BIT1, FREQ_VIS_START, FREQ_WHITE, ROBOT36,
    SstvEncoder, SstvMode, Waveform, byte_to_freq, rgb_to_ycbcr,
};
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::f64::consts::TAU;
use tracing::debug;

const DEFAULT_AMPLITUDE: f32 = 0.8;

pub struct Robot36Encoder {
    mode: SstvMode,
    sample_rate: u32,
    bit_depth: u16,
    amplitude: f32,
}

impl Robot36Encoder {
    pub fn new(sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            mode: ROBOT36,
            sample_rate,
            bit_depth,
            amplitude: DEFAULT_AMPLITUDE,
        }
    }

    pub fn mode(&self) -> &SstvMode {
        &self.mode
    }

    fn write_header(&self, tones: &mut ToneWriter) {
        tones.tone(FREQ_VIS_START, VIS_LEADER_MS);
        tones.tone(FREQ_SYNC, VIS_BREAK_MS);
        tones.tone(FREQ_VIS_START, VIS_LEADER_MS);
        tones.tone(FREQ_SYNC, VIS_BIT_MS);
        for bit in self.mode.vis_bits() {
            let freq = if bit { FREQ_VIS_BIT1 } else { FREQ_VIS_BIT0 };
            tones.tone(freq, VIS_BIT_MS);
        }
        tones.tone(FREQ_SYNC, VIS_BIT_MS);
    }

    fn write_lines(&self, image: &RgbImage, tones: &mut ToneWriter) {
        let mode = &self.mode;
        let y_pixel_ms = mode.y_scan_ms / mode.width as f64;
        let c_pixel_ms = mode.c_scan_ms / mode.width as f64;

        for line in 0..mode.height {
            let ycbcr: Vec<(u8, u8, u8)> = (0..mode.width)
                .map(|x| {
                    let [r, g, b] = image.get_pixel(x, line).0;
                    rgb_to_ycbcr(r, g, b)
                })
                .collect();

            tones.tone(FREQ_SYNC, mode.sync_ms);
            tones.tone(FREQ_BLACK, mode.sync_porch_ms);
            for &(y, _, _) in &ycbcr {
                tones.tone(byte_to_freq(y), y_pixel_ms);
            }

            // even lines carry Cr, odd lines Cb; the gap tone says which
            let even = line % 2 == 0;
            let gap_freq = if even { FREQ_BLACK } else { FREQ_WHITE };
            tones.tone(gap_freq, mode.inter_channel_gap_ms);
            tones.tone(FREQ_VIS_START, mode.porch_ms);
            for &(_, cb, cr) in &ycbcr {
                let chroma = if even { cr } else { cb };
                tones.tone(byte_to_freq(chroma), c_pixel_ms);
            }
        }
    }
}

impl SstvEncoder for Robot36Encoder {
    fn synthesize(&self, image: &RgbImage) -> Result<Waveform> {
        let (width, height) = (self.mode.width, self.mode.height);
        let resized;
        let image = if image.dimensions() == (width, height) {
            image
        } else {
            debug!(
                "Resizing {}x{} image to {}x{} for {}",
                image.width(),
                image.height(),
                width,
                height,
                self.mode.name
            );
            resized = imageops::resize(image, width, height, FilterType::Triangle);
            &resized
        };

        let mut tones = ToneWriter::new(self.sample_rate, self.amplitude);
        self.write_header(&mut tones);
        self.write_lines(image, &mut tones);

        Ok(Waveform::new(self.sample_rate, self.bit_depth, tones.finish()))
    }
}

/// Emits sine tones back to back without phase jumps, placing each tone
/// boundary at the nearest sample to its exact start time.
struct ToneWriter {
    sample_rate: f64,
    amplitude: f32,
    phase: f64,
    elapsed_ms: f64,
    samples: Vec<f32>,
}

impl ToneWriter {
    fn new(sample_rate: u32, amplitude: f32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            amplitude,
            phase: 0.0,
            elapsed_ms: 0.0,
            samples: Vec::new(),
        }
    }

    fn tone(&mut self, freq: f32, duration_ms: f64) {
        self.elapsed_ms += duration_ms;
        let target = (self.elapsed_ms * self.sample_rate / 1000.0).round() as usize;
        let step = TAU * freq as f64 / self.sample_rate;

        while self.samples.len() < target {
            self.phase = (self.phase + step) % TAU;
            self.samples.push(self.phase.sin() as f32 * self.amplitude);
        }
    }

    fn finish(self) -> Vec<f32> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstv::mode::VIS_BITS_TOTAL;

    fn header_ms() -> f64 {
        2.0 * VIS_LEADER_MS + VIS_BREAK_MS + VIS_BITS_TOTAL as f64 * VIS_BIT_MS
    }

    #[test]
    fn test_waveform_length_matches_mode_timing() {
        let encoder = Robot36Encoder::new(8_000, 16);
        let image = RgbImage::from_pixel(320, 240, image::Rgb([90, 90, 90]));
        let waveform = encoder.synthesize(&image).unwrap();

        let expected = ((header_ms() + ROBOT36.image_ms()) * 8.0).round() as usize;
        assert_eq!(waveform.samples.len(), expected);
        assert_eq!(waveform.sample_rate, 8_000);
        assert_eq!(waveform.bit_depth, 16);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let encoder = Robot36Encoder::new(8_000, 16);
        let image = RgbImage::from_fn(320, 240, |x, y| image::Rgb([x as u8, y as u8, 7]));
        assert_eq!(
            encoder.synthesize(&image).unwrap(),
            encoder.synthesize(&image).unwrap()
        );
    }

    #[test]
    fn test_off_size_images_are_resized() {
        let encoder = Robot36Encoder::new(8_000, 16);
        let small = RgbImage::from_pixel(32, 24, image::Rgb([0, 0, 0]));
        let full = RgbImage::from_pixel(320, 240, image::Rgb([0, 0, 0]));
        assert_eq!(
            encoder.synthesize(&small).unwrap().samples.len(),
            encoder.synthesize(&full).unwrap().samples.len()
        );
    }

    #[test]
    fn test_amplitude_stays_within_full_scale() {
        let encoder = Robot36Encoder::new(8_000, 16);
        let image = RgbImage::from_pixel(320, 240, image::Rgb([255, 255, 255]));
        let waveform = encoder.synthesize(&image).unwrap();
        assert!(waveform.samples.iter().all(|s| s.abs() <= DEFAULT_AMPLITUDE + 1e-6));
    }
}
