// file: src/sstv/decoder.rs
// description: Robot36 signal recovery from a waveform
// reference: VIS header detection, per-line sync search, YCbCr line pairs

use crate::error::{PipelineError, Result};
use crate::sstv::demod::{frequency_track, prefix_sums, smooth};
use crate::sstv::mode::{VIS_BIT_MS, VIS_BITS_TOTAL};
use crate::sstv::{
    FREQ_SYNC, FREQ_VIS_START, ROBOT36, SstvDecoder, SstvMode, Waveform, freq_to_byte,
    ycbcr_to_rgb,
};
use image::{Rgb, RgbImage};
use tracing::{debug, warn};

/// A leader tone must last at least this long to count.
const MIN_LEADER_MS: f64 = 150.0;
/// The run after the second leader (start bit onward) sits in the sync band.
const MIN_VIS_RUN_MS: f64 = 20.0;
const MAX_TRANSITION_MS: f64 = 5.0;
const LEADER_TOLERANCE_HZ: f32 = 150.0;
const SYNC_TOLERANCE_HZ: f32 = 150.0;
/// How far a line's sync pulse may sit from its nominal position.
const SYNC_SEARCH_MS: f64 = 1.5;
/// A line counts as synced when this share of its pulse is in the sync band.
const SYNC_MATCH_RATIO: f64 = 0.5;
/// Fewer synced lines than this share means there is no usable signal.
const MIN_SYNCED_LINES_RATIO: f64 = 0.5;
const CLASSIFY_SMOOTHING_MS: f64 = 2.0;

pub struct Robot36Decoder {
    mode: SstvMode,
}

impl Robot36Decoder {
    pub fn new() -> Self {
        Self { mode: ROBOT36 }
    }
}

impl Default for Robot36Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SstvDecoder for Robot36Decoder {
    fn decode(&self, waveform: &Waveform) -> Result<RgbImage> {
        if waveform.is_empty() || waveform.sample_rate == 0 {
            return Err(PipelineError::NoSignal("waveform is empty".to_string()));
        }

        let track = Track::new(waveform);
        let start_bit = track.find_vis_start().ok_or_else(|| {
            PipelineError::NoSignal("no VIS header found".to_string())
        })?;

        let vis_code = track.read_vis_code(start_bit)?;
        if vis_code != self.mode.vis_code {
            return Err(PipelineError::UnsupportedMode(vis_code));
        }

        let image_start = start_bit + track.samples_for(VIS_BITS_TOTAL as f64 * VIS_BIT_MS);
        track.read_image(&self.mode, image_start)
    }
}

struct Track {
    sample_rate: f64,
    raw: Vec<f32>,
    prefix: Vec<f64>,
    smoothed: Vec<f32>,
}

impl Track {
    fn new(waveform: &Waveform) -> Self {
        let raw = frequency_track(&waveform.samples, waveform.sample_rate);
        let prefix = prefix_sums(&raw);
        let sample_rate = waveform.sample_rate as f64;
        let window = (CLASSIFY_SMOOTHING_MS * sample_rate / 1000.0).round() as usize;
        let smoothed = smooth(&raw, window);
        Self {
            sample_rate,
            raw,
            prefix,
            smoothed,
        }
    }

    fn samples_for(&self, ms: f64) -> usize {
        (ms * self.sample_rate / 1000.0).round() as usize
    }

    fn len(&self) -> usize {
        self.raw.len()
    }

    fn mean(&self, start: usize, end: usize) -> Option<f32> {
        let end = end.min(self.len());
        if start >= end {
            return None;
        }
        Some(((self.prefix[end] - self.prefix[start]) / (end - start) as f64) as f32)
    }

    /// Mean frequency over `[start_ms, start_ms + len_ms)` after `origin`,
    /// always covering at least one sample.
    fn mean_ms(&self, origin: usize, start_ms: f64, len_ms: f64) -> Option<f32> {
        let start = origin + (start_ms * self.sample_rate / 1000.0).floor() as usize;
        let end = origin + ((start_ms + len_ms) * self.sample_rate / 1000.0).ceil() as usize;
        self.mean(start, end.max(start + 1))
    }

    /// Sample where the VIS start bit begins: the end of a long leader tone
    /// followed by a sustained run in the sync band.
    fn find_vis_start(&self) -> Option<usize> {
        let min_leader = self.samples_for(MIN_LEADER_MS);
        let min_vis = self.samples_for(MIN_VIS_RUN_MS);
        let max_transition = self.samples_for(MAX_TRANSITION_MS);
        let is_leader = |f: f32| (f - FREQ_VIS_START).abs() < LEADER_TOLERANCE_HZ;
        let is_sync_band = |f: f32| (f - FREQ_SYNC).abs() < SYNC_TOLERANCE_HZ;

        let mut n = 0;
        while n < self.smoothed.len() {
            if !is_leader(self.smoothed[n]) {
                n += 1;
                continue;
            }
            let leader_start = n;
            while n < self.smoothed.len() && is_leader(self.smoothed[n]) {
                n += 1;
            }
            if n - leader_start < min_leader {
                continue;
            }

            // the smoothed track needs a moment to swing between bands
            let mut band_start = n;
            while band_start < self.smoothed.len()
                && band_start - n < max_transition
                && !is_sync_band(self.smoothed[band_start])
            {
                band_start += 1;
            }
            let mut m = band_start;
            while m < self.smoothed.len() && is_sync_band(self.smoothed[m]) {
                m += 1;
            }
            if m - band_start >= min_vis {
                let vis_start = (n + band_start) / 2;
                debug!(
                    "VIS start bit at {:.3}s",
                    vis_start as f64 / self.sample_rate
                );
                return Some(vis_start);
            }
        }
        None
    }

    fn read_vis_code(&self, start_bit: usize) -> Result<u8> {
        let mut code = 0u8;
        let mut ones = 0;
        for bit in 0..8u32 {
            // sample the middle two thirds of each 30 ms bit
            let offset = VIS_BIT_MS * (1 + bit) as f64 + VIS_BIT_MS / 6.0;
            let freq = self
                .mean_ms(start_bit, offset, VIS_BIT_MS * 2.0 / 3.0)
                .ok_or_else(|| PipelineError::NoSignal("VIS header truncated".to_string()))?;
            let is_one = freq < FREQ_SYNC;
            if is_one {
                ones += 1;
                if bit < 7 {
                    code |= 1 << bit;
                }
            }
        }
        if ones % 2 != 0 {
            return Err(PipelineError::NoSignal(format!(
                "VIS parity check failed (code {code:#04x})"
            )));
        }
        Ok(code)
    }

    /// Offset of the best sync pulse within the search window around
    /// `nominal`, with the share of the pulse found in the sync band.
    fn locate_sync(&self, nominal: usize, sync_len: usize, search: usize) -> (usize, f64) {
        let lo = nominal.saturating_sub(search);
        let hi = nominal + search;
        let mut best = (nominal, 0.0);
        for start in lo..=hi {
            let end = start + sync_len;
            if end > self.len() {
                break;
            }
            let in_band = self.smoothed[start..end]
                .iter()
                .filter(|f| (**f - FREQ_SYNC).abs() < SYNC_TOLERANCE_HZ)
                .count() as f64
                / sync_len as f64;
            let closer = start.abs_diff(nominal) < best.0.abs_diff(nominal);
            if in_band > best.1 || (in_band == best.1 && closer) {
                best = (start, in_band);
            }
        }
        best
    }

    fn read_image(&self, mode: &SstvMode, image_start: usize) -> Result<RgbImage> {
        let line_len = mode.line_ms() * self.sample_rate / 1000.0;
        let sync_len = self.samples_for(mode.sync_ms).max(1);
        let search = self.samples_for(SYNC_SEARCH_MS);

        let available = self.len().saturating_sub(image_start) as f64 / line_len;
        let lines = (available.floor() as u32).min(mode.height);
        if lines == 0 {
            return Err(PipelineError::NoSignal(
                "waveform ends before the first image line".to_string(),
            ));
        }

        let width = mode.width as usize;
        let y_pixel_ms = mode.y_scan_ms / mode.width as f64;
        let c_pixel_ms = mode.c_scan_ms / mode.width as f64;

        let mut luma = vec![vec![0u8; width]; mode.height as usize];
        let mut cr = vec![vec![128u8; width]; mode.height as usize];
        let mut cb = vec![vec![128u8; width]; mode.height as usize];
        let mut synced = 0u32;

        for line in 0..lines {
            let nominal = image_start + (line as f64 * line_len).round() as usize;
            let (origin, score) = self.locate_sync(nominal, sync_len, search);
            if score >= SYNC_MATCH_RATIO {
                synced += 1;
            }

            let row = line as usize;
            for x in 0..width {
                let start = mode.y_start_ms() + x as f64 * y_pixel_ms;
                if let Some(freq) = self.mean_ms(origin, start, y_pixel_ms) {
                    luma[row][x] = freq_to_byte(freq);
                }
            }

            let gap = self
                .mean_ms(origin, mode.gap_start_ms(), mode.inter_channel_gap_ms)
                .unwrap_or(0.0);
            let carries_cr = gap < FREQ_VIS_START;
            let chroma = if carries_cr { &mut cr } else { &mut cb };
            for x in 0..width {
                let start = mode.c_start_ms() + x as f64 * c_pixel_ms;
                if let Some(freq) = self.mean_ms(origin, start, c_pixel_ms) {
                    chroma[row][x] = freq_to_byte(freq);
                }
            }
            // chroma is sent on alternate lines; share it with the partner line
            let partner = row ^ 1;
            if partner < mode.height as usize {
                chroma[partner] = chroma[row].clone();
            }
        }

        if (synced as f64) < lines as f64 * MIN_SYNCED_LINES_RATIO {
            return Err(PipelineError::NoSignal(format!(
                "only {synced} of {lines} lines carried a sync pulse"
            )));
        }
        if lines < mode.height {
            warn!(
                "Waveform truncated: decoded {} of {} lines",
                lines, mode.height
            );
        }

        let image = RgbImage::from_fn(mode.width, mode.height, |x, y| {
            let (row, col) = (y as usize, x as usize);
            let (r, g, b) = ycbcr_to_rgb(luma[row][col], cb[row][col], cr[row][col]);
            Rgb([r, g, b])
        });
        Ok(image)
    }
}
