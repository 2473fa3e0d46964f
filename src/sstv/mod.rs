// file: src/sstv/mod.rs
// description: SSTV waveform codec traits, shared tone constants and exports
// reference: Robot36 color mode, VIS header framing

pub mod decoder;
pub mod demod;
pub mod encoder;
pub mod mode;
pub mod waveform;

pub use decoder::Robot36Decoder;
pub use encoder::Robot36Encoder;
pub use mode::{ROBOT36, SstvMode};
pub use waveform::Waveform;

use crate::error::Result;
use image::RgbImage;

pub const FREQ_VIS_BIT1: f32 = 1100.0;
pub const FREQ_SYNC: f32 = 1200.0;
pub const FREQ_VIS_BIT0: f32 = 1300.0;
pub const FREQ_BLACK: f32 = 1500.0;
pub const FREQ_VIS_START: f32 = 1900.0;
pub const FREQ_WHITE: f32 = 2300.0;
pub const FREQ_RANGE: f32 = FREQ_WHITE - FREQ_BLACK;

/// Turns an image into a clean SSTV waveform. Sample rate and bit depth
/// are fixed when the encoder is built.
pub trait SstvEncoder: Send + Sync {
    fn synthesize(&self, image: &RgbImage) -> Result<Waveform>;
}

/// Recovers an image from a (possibly noisy) waveform, or reports
/// [`crate::PipelineError::NoSignal`].
pub trait SstvDecoder: Send + Sync {
    fn decode(&self, waveform: &Waveform) -> Result<RgbImage>;
}

pub fn byte_to_freq(value: u8) -> f32 {
    FREQ_BLACK + FREQ_RANGE * value as f32 / 255.0
}

pub fn freq_to_byte(freq: f32) -> u8 {
    (((freq - FREQ_BLACK) / FREQ_RANGE) * 255.0)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Full-range (JFIF) RGB to YCbCr.
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    (clamp_byte(y), clamp_byte(cb), clamp_byte(cr))
}

pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let (y, cb, cr) = (y as f32, cb as f32 - 128.0, cr as f32 - 128.0);
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    (clamp_byte(r), clamp_byte(g), clamp_byte(b))
}

fn clamp_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
