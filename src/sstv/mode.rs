// file: src/sstv/mode.rs
// description: SSTV mode timing table and VIS header layout
// reference: Robot36 color mode timing

/// Line timing of a YCbCr SSTV mode, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SstvMode {
    pub name: &'static str,
    pub vis_code: u8,
    pub width: u32,
    pub height: u32,
    pub sync_ms: f64,
    pub sync_porch_ms: f64,
    pub y_scan_ms: f64,
    pub inter_channel_gap_ms: f64,
    pub porch_ms: f64,
    pub c_scan_ms: f64,
}

pub const ROBOT36: SstvMode = SstvMode {
    name: "Robot36",
    vis_code: 0x08,
    width: 320,
    height: 240,
    sync_ms: 9.0,
    sync_porch_ms: 3.0,
    y_scan_ms: 88.0,
    inter_channel_gap_ms: 4.5,
    porch_ms: 1.5,
    c_scan_ms: 44.0,
};

pub const VIS_LEADER_MS: f64 = 300.0;
pub const VIS_BREAK_MS: f64 = 10.0;
pub const VIS_BIT_MS: f64 = 30.0;
/// Start bit, seven data bits, parity bit, stop bit.
pub const VIS_BITS_TOTAL: u32 = 10;

impl SstvMode {
    pub fn line_ms(&self) -> f64 {
        self.sync_ms
            + self.sync_porch_ms
            + self.y_scan_ms
            + self.inter_channel_gap_ms
            + self.porch_ms
            + self.c_scan_ms
    }

    pub fn y_start_ms(&self) -> f64 {
        self.sync_ms + self.sync_porch_ms
    }

    pub fn gap_start_ms(&self) -> f64 {
        self.y_start_ms() + self.y_scan_ms
    }

    pub fn c_start_ms(&self) -> f64 {
        self.gap_start_ms() + self.inter_channel_gap_ms + self.porch_ms
    }

    pub fn image_ms(&self) -> f64 {
        self.line_ms() * self.height as f64
    }

    /// VIS data bits, least significant first, followed by even parity.
    pub fn vis_bits(&self) -> [bool; 8] {
        let mut bits = [false; 8];
        for (i, bit) in bits.iter_mut().take(7).enumerate() {
            *bit = (self.vis_code >> i) & 1 == 1;
        }
        bits[7] = self.vis_code.count_ones() % 2 == 1;
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robot36_transmits_in_36_seconds() {
        assert_eq!(ROBOT36.line_ms(), 150.0);
        assert_eq!(ROBOT36.image_ms(), 36_000.0);
        assert_eq!(ROBOT36.c_start_ms(), 106.0);
    }

    #[test]
    fn test_vis_bits_have_even_parity() {
        let bits = ROBOT36.vis_bits();
        assert_eq!(bits, [false, false, false, true, false, false, false, true]);
        assert_eq!(bits.iter().filter(|b| **b).count() % 2, 0);
    }
}
