//! EDID parsing.
//!
//! Backends report the EDID as the upper-case hexadecimal string the
//! display server handed them; this module decodes the 128-byte base
//! block. Extension blocks (and the mode lines) are not decoded.

use anyhow::{Result, bail};

/// The fixed 8-byte pattern every EDID starts with.
const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// Relative voltage levels for analogue input, indexed by bits 6–5 of
/// the video input definition byte.
const WHITE_LEVELS: [f64; 4] = [0.7, 0.714, 1.0, 0.7];
const SYNC_LEVELS: [f64; 4] = [-0.3, -0.286, -0.4, 0.0];

/// Parsed EDID data.
///
/// Fields that the EDID marks as not specified are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Edid {
    /// Three-letter manufacturer id.
    pub manufacturer_id: String,
    pub manufacturer_product_code: u16,
    pub serial_number: u32,
    /// Week of manufacture; `None` when the year field holds the model
    /// year instead. Interpretation is inconsistent between
    /// manufacturers.
    pub manufacture_week: Option<u8>,
    pub manufacture_year: Option<u16>,
    pub model_year: Option<u16>,
    pub edid_version: (u8, u8),
    pub digital_input: bool,
    /// Whether the monitor is VESA DFP 1.x TMDS CRGB compatible
    /// (digital input only).
    pub vesa_dfp_1x_tmds_crgb_compatible: Option<bool>,
    /// Voltage level for white relative to blank (analogue input only).
    pub relative_white_level: Option<f64>,
    pub relative_sync_level: Option<f64>,
    pub blank_to_black: Option<bool>,
    pub separate_sync_supported: Option<bool>,
    pub composite_sync_supported: Option<bool>,
    pub sync_on_green_supported: Option<bool>,
    pub vsync_pulse_serrated: Option<bool>,
    /// Viewport width in millimetres; `None` when the EDID gives zero.
    pub width_mm: Option<u32>,
    pub height_mm: Option<u32>,
    /// The monitor's gamma; `None` when the field is 0xFF (stored in
    /// an extension).
    pub display_gamma: Option<f64>,
    pub dpms_standby_supported: bool,
    pub dpms_suspend_supported: bool,
    pub dpms_active_off_supported: bool,
    pub digital_rgb_444_supported: bool,
    pub digital_ycrcb_444_supported: bool,
    pub digital_ycrcb_422_supported: bool,
    pub analogue_grey_mono_display: bool,
    pub analogue_rgb_display: bool,
    pub analogue_non_rgb_display: bool,
    pub srgb: bool,
    pub preferred_timing_mode: bool,
    pub gtf_supported: bool,
    /// CIE xy chromaticities of the primaries and the white point.
    pub red_chroma: (f64, f64),
    pub green_chroma: (f64, f64),
    pub blue_chroma: (f64, f64),
    pub white_chroma: (f64, f64),
}

impl Edid {
    /// Parse an EDID from its upper-case hexadecimal representation.
    ///
    /// Fails with a malformed-EDID diagnostic when the string is not
    /// hexadecimal, shorter than one block, missing the magic header,
    /// or when the first block's checksum is broken.
    pub fn parse(edid: &str) -> Result<Edid> {
        if edid.len() % 2 == 1 {
            bail!("malformed EDID: odd hexadecimal length");
        }
        let bytes: Vec<u8> = (0..edid.len() / 2)
            .map(|i| {
                u8::from_str_radix(&edid[i * 2..i * 2 + 2], 16)
                    .map_err(|_| anyhow::anyhow!("malformed EDID: not hexadecimal"))
            })
            .collect::<Result<_>>()?;
        Self::parse_bytes(&bytes)
    }

    /// Parse an EDID from raw bytes.
    pub fn parse_bytes(edid: &[u8]) -> Result<Edid> {
        if edid.len() < 128 {
            bail!("malformed EDID: shorter than one block");
        }
        if edid[..8] != EDID_HEADER {
            bail!("malformed EDID: bad magic header");
        }
        let checksum: u32 = edid[..128].iter().map(|&b| b as u32).sum();
        if checksum % 256 != 0 {
            bail!("malformed EDID: bad checksum");
        }

        let mut parsed = Edid {
            manufacturer_id: {
                let letters = [
                    (edid[8] >> 2) & 0x1F,
                    (edid[8] & 3) << 3 | edid[9] >> 5,
                    edid[9] & 0x1F,
                ];
                letters.iter().map(|&c| (b'@' + c) as char).collect()
            },
            manufacturer_product_code: edid[10] as u16 | (edid[11] as u16) << 8,
            serial_number: edid[12] as u32
                | (edid[13] as u32) << 8
                | (edid[14] as u32) << 16
                | (edid[15] as u32) << 24,
            edid_version: (edid[18], edid[19]),
            ..Edid::default()
        };

        if edid[16] == 255 {
            parsed.model_year = Some(1990 + edid[17] as u16);
        } else {
            parsed.manufacture_week = Some(edid[16]);
            parsed.manufacture_year = Some(1990 + edid[17] as u16);
        }

        parsed.digital_input = edid[20] & 0x80 == 0x80;
        if parsed.digital_input {
            parsed.vesa_dfp_1x_tmds_crgb_compatible = Some(edid[20] & 1 == 1);
        } else {
            let level = ((edid[20] >> 5) & 3) as usize;
            parsed.relative_white_level = Some(WHITE_LEVELS[level]);
            parsed.relative_sync_level = Some(SYNC_LEVELS[level]);
            parsed.blank_to_black = Some(edid[20] & 16 == 16);
            parsed.separate_sync_supported = Some(edid[20] & 8 == 8);
            parsed.composite_sync_supported = Some(edid[20] & 4 == 4);
            parsed.sync_on_green_supported = Some(edid[20] & 2 == 2);
            parsed.vsync_pulse_serrated = Some(edid[20] & 1 == 1);
        }

        if edid[21] != 0 && edid[22] != 0 {
            parsed.width_mm = Some(edid[21] as u32 * 10);
            parsed.height_mm = Some(edid[22] as u32 * 10);
        }
        if edid[23] != 0xFF {
            parsed.display_gamma = Some(edid[23] as f64 / 100.0 + 1.0);
        }

        parsed.dpms_standby_supported = edid[24] & 128 == 128;
        parsed.dpms_suspend_supported = edid[24] & 64 == 64;
        parsed.dpms_active_off_supported = edid[24] & 32 == 32;
        if parsed.digital_input {
            parsed.digital_rgb_444_supported = true;
            parsed.digital_ycrcb_444_supported = edid[24] & 8 == 8;
            parsed.digital_ycrcb_422_supported = edid[24] & 16 == 16;
        } else {
            let display_type = (edid[24] >> 3) & 3;
            parsed.analogue_grey_mono_display = display_type == 0;
            parsed.analogue_rgb_display = display_type == 1;
            parsed.analogue_non_rgb_display = display_type == 2;
        }
        parsed.srgb = edid[24] & 4 == 4;
        parsed.preferred_timing_mode = edid[24] & 2 == 2;
        parsed.gtf_supported = edid[24] & 1 == 1;

        let chroma10 = |high: u8, low: u8| (((high as u32) << 2 | low as u32) as f64) / 1024.0;
        parsed.red_chroma = (
            chroma10(edid[27], (edid[25] >> 6) & 3),
            chroma10(edid[28], (edid[25] >> 4) & 3),
        );
        parsed.green_chroma = (
            chroma10(edid[29], (edid[25] >> 2) & 3),
            chroma10(edid[30], edid[25] & 3),
        );
        parsed.blue_chroma = (
            chroma10(edid[31], (edid[26] >> 6) & 3),
            chroma10(edid[32], (edid[26] >> 4) & 3),
        );
        parsed.white_chroma = (
            chroma10(edid[33], (edid[26] >> 2) & 3),
            chroma10(edid[34], edid[26] & 3),
        );

        Ok(parsed)
    }
}
