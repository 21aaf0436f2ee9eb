//! ICC profile parsing for VCGT and MLUT calibration tags.
//!
//! Only the calibration data is decoded: the `mLUT` tag (three 256-stop
//! 16-bit tables) and the `vcgt` tag, either as a variable-precision
//! table or as per-channel gamma/min/max parameters. The result is an
//! [`IccAdjustment`] that can be applied to a `RampEngine` any number
//! of times.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::curve::{Channels, RampEngine};
use crate::interpolation::linear_resize;

const MLUT_TAG: u32 = 0x6d4c_5554; // 'mLUT'
const VCGT_TAG: u32 = 0x7663_6774; // 'vcgt'

/// The size of the ICC profile header that precedes the tag table.
const HEADER_SIZE: usize = 128;

/// A vcgt tag whose size is exactly this holds a (3, 256, 2) table
/// whatever its own header claims.
const VCGT_FIXED_TABLE_SIZE: u32 = 1584;

/// A parsed calibration: how to transform the working curves.
#[derive(Clone, Debug, PartialEq)]
pub enum IccAdjustment {
    /// Lookup tables, one per channel, stops in [0, 1]; applied by
    /// nearest-neighbour remapping.
    Table {
        red: Vec<f64>,
        green: Vec<f64>,
        blue: Vec<f64>,
    },
    /// Per-channel gamma, black point and white point.
    Parametric {
        gamma: (f64, f64, f64),
        min: (f64, f64, f64),
        max: (f64, f64, f64),
    },
}

impl IccAdjustment {
    /// Apply the calibration to the working curves.
    pub fn apply(&self, engine: &mut RampEngine) {
        match self {
            IccAdjustment::Table { red, green, blue } => engine.remap(red, green, blue),
            IccAdjustment::Parametric { gamma, min, max } => {
                engine.gamma(Channels::new(gamma.0, gamma.1, gamma.2));
                engine.rgb_limits(Channels::new(
                    (min.0, max.0),
                    (min.1, max.1),
                    (min.2, max.2),
                ));
            }
        }
    }

    /// The calibration's lookup tables, synthesising them for the
    /// parametric form. Used by the interpolation combinator.
    fn tables(&self, size: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        match self {
            IccAdjustment::Table { red, green, blue } => (
                linear_resize(red, size),
                linear_resize(green, size),
                linear_resize(blue, size),
            ),
            IccAdjustment::Parametric { gamma, min, max } => {
                let make = |gamma: f64, min: f64, max: f64| -> Vec<f64> {
                    (0..size)
                        .map(|i| {
                            let v = (i as f64 / (size - 1) as f64).powf(1.0 / gamma);
                            v * (max - min) + min
                        })
                        .collect()
                };
                (
                    make(gamma.0, min.0, max.0),
                    make(gamma.1, min.1, max.1),
                    make(gamma.2, min.2, max.2),
                )
            }
        }
    }
}

/// Load an ICC profile from a file.
pub fn load_icc(pathname: &Path) -> Result<IccAdjustment> {
    let content = std::fs::read(pathname)
        .with_context(|| format!("cannot read ICC profile {}", pathname.display()))?;
    parse_icc(&content).with_context(|| format!("in ICC profile {}", pathname.display()))
}

struct Reader<'a> {
    content: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn skip(&mut self, n: usize) -> Result<()> {
        if self.content.len() - self.position < n {
            bail!("premature end of ICC profile");
        }
        self.position += n;
        Ok(())
    }

    fn seek(&mut self, offset: usize) -> Result<()> {
        if offset < self.position {
            bail!("unsupported ICC profile file");
        }
        self.skip(offset - self.position)
    }

    /// Big-endian unsigned integer of `n` bytes, n ≤ 8.
    fn uint(&mut self, n: usize) -> Result<u64> {
        if self.content.len() - self.position < n {
            bail!("premature end of ICC profile");
        }
        let mut value = 0u64;
        for &byte in &self.content[self.position..self.position + n] {
            value = value << 8 | byte as u64;
        }
        self.position += n;
        Ok(value)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(self.uint(2)? as u16)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(self.uint(4)? as u32)
    }
}

/// Parse an ICC profile from raw data.
pub fn parse_icc(content: &[u8]) -> Result<IccAdjustment> {
    let mut reader = Reader { content, position: 0 };
    reader.skip(HEADER_SIZE)?;

    let n_tags = reader.u32()?;
    for _ in 0..n_tags {
        let tag_name = reader.u32()?;
        let tag_offset = reader.u32()? as usize;
        let tag_size = reader.u32()?;

        if tag_name == MLUT_TAG {
            reader.seek(tag_offset)?;
            let mut read_table = || -> Result<Vec<f64>> {
                (0..256)
                    .map(|_| Ok(reader.u16()? as f64 / 65535.0))
                    .collect()
            };
            let red = read_table()?;
            let green = read_table()?;
            let blue = read_table()?;
            return Ok(IccAdjustment::Table { red, green, blue });
        }

        if tag_name == VCGT_TAG {
            reader.seek(tag_offset)?;
            if reader.u32()? != VCGT_TAG {
                break;
            }
            reader.skip(4)?;
            let gamma_type = reader.u32()?;
            if gamma_type == 0 {
                let mut n_channels = reader.u16()? as usize;
                let mut n_entries = reader.u16()? as usize;
                let mut entry_size = reader.u16()? as usize;
                if tag_size == VCGT_FIXED_TABLE_SIZE {
                    n_channels = 3;
                    n_entries = 256;
                    entry_size = 2;
                }
                if n_channels != 3 {
                    // Assuming sRGB; anything else is unsupported
                    break;
                }
                let divisor = (256f64).powi(entry_size as i32) - 1.0;
                let mut read_table = || -> Result<Vec<f64>> {
                    (0..n_entries)
                        .map(|_| Ok(reader.uint(entry_size)? as f64 / divisor))
                        .collect()
                };
                let red = read_table()?;
                let green = read_table()?;
                let blue = read_table()?;
                return Ok(IccAdjustment::Table { red, green, blue });
            } else if gamma_type == 1 {
                let mut value = || -> Result<f64> { Ok(reader.u32()? as f64 / 65535.0) };
                let (r_gamma, r_min, r_max) = (value()?, value()?, value()?);
                let (g_gamma, g_min, g_max) = (value()?, value()?, value()?);
                let (b_gamma, b_min, b_max) = (value()?, value()?, value()?);
                return Ok(IccAdjustment::Parametric {
                    gamma: (r_gamma, g_gamma, b_gamma),
                    min: (r_min, g_min, b_min),
                    max: (r_max, g_max, b_max),
                });
            }
            break;
        }
    }
    bail!("unsupported ICC profile file");
}

/// Blend a sequence of calibrations into one time-varying adjustment.
///
/// `timepoint` selects between profile `⌊t⌋` and profile `⌊t⌋ + 1`
/// (modulo the profile count) with weight `t − ⌊t⌋`; `alpha` fades the
/// blend towards the identity mapping. With two profiles, `timepoint`
/// is simply the dayness level.
pub struct IccInterpolation {
    profiles: Vec<IccAdjustment>,
    /// Table resolution of the blend.
    pub resolution: usize,
}

impl IccInterpolation {
    pub fn new(profiles: Vec<IccAdjustment>) -> IccInterpolation {
        IccInterpolation { profiles, resolution: 256 }
    }

    /// Apply the blend at `timepoint` with weight `alpha` to the
    /// working curves.
    pub fn apply(&self, engine: &mut RampEngine, timepoint: f64, alpha: f64) {
        if self.profiles.is_empty() {
            return;
        }
        let count = self.profiles.len();
        let index = (timepoint.floor() as isize).rem_euclid(count as isize) as usize;
        let first = &self.profiles[index];
        let second = &self.profiles[(index + 1) % count];
        let weight = timepoint.rem_euclid(1.0);

        if std::ptr::eq(first, second) && alpha == 1.0 {
            first.apply(engine);
            return;
        }

        let n = self.resolution;
        let (r0, g0, b0) = first.tables(n);
        let (r1, g1, b1) = second.tables(n);
        let last = (n - 1) as f64;
        let blend = |i: usize, v0: f64, v1: f64| -> f64 {
            (v0 * (1.0 - weight) + v1 * weight) * alpha + i as f64 * (1.0 - alpha) / last
        };
        let red: Vec<f64> = (0..n).map(|i| blend(i, r0[i], r1[i])).collect();
        let green: Vec<f64> = (0..n).map(|i| blend(i, g0[i], g1[i])).collect();
        let blue: Vec<f64> = (0..n).map(|i| blend(i, b0[i], b1[i])).collect();
        engine.remap(&red, &green, &blue);
    }
}
