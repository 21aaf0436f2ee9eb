//! Colour-temperature based whitepoint calculation.
//!
//! A whitepoint algorithm maps a blackbody temperature in kelvins to an
//! sRGB triple. Four families are provided: the CIE illuminant series D
//! rational approximation (`series_d`), a closed-form approximation
//! (`simple_whitepoint`), interpolation over the CIE 1931/1964 colour
//! matching function tables (`cmf_2deg`/`cmf_10deg`), and interpolation
//! over the table the program redshift ships (`redshift`).
//!
//! The lookup tables are text files (one row of space-separated doubles
//! per 100 K step) loaded from the data directory and cached for the
//! lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Context, Result, bail};

use crate::colour::{ciexyy_to_srgb, linear_to_standard, standard_to_linear};
use crate::constants::{DATADIR_ENV, DATADIR_LOCAL, DATADIR_SYSTEM};

// ═══ Named Colour Temperatures ═══
// None of these (except the D series) are exact or guaranteed to even be
// approximate values.

pub const K_MATCH_FLAME: f64 = 1700.0;
pub const K_CANDLE_FLAME: f64 = 1850.0;
pub const K_CANDLELIGHT: f64 = K_CANDLE_FLAME;
pub const K_SUNSET: f64 = 1850.0;
pub const K_SUNRISE: f64 = K_SUNSET;
pub const K_HIGH_PRESSURE_SODIUM: f64 = 2100.0;
pub const K_STANDARD_INCANDESCENT: f64 = 2500.0;
pub const K_INCANDESCENT: f64 = K_STANDARD_INCANDESCENT;
pub const K_EXTRA_SOFT: f64 = 2700.0;
pub const K_INCANDESCENT_LAMP: f64 = (2700.0 + 3300.0) / 2.0;
pub const K_EARLY_SUNRISE: f64 = (2800.0 + 3200.0) / 2.0;
pub const K_LATE_SUNSET: f64 = K_EARLY_SUNRISE;
pub const K_WARM_WHITE: f64 = 3000.0;
pub const K_HALOGEN_LIGHT: f64 = 3000.0;
pub const K_TUNGSTEN_LIGHT: f64 = 3200.0;
pub const K_HOUSEHOLD_LIGHT_BULB: f64 = K_TUNGSTEN_LIGHT;
pub const K_LIGHT_BULB: f64 = K_HOUSEHOLD_LIGHT_BULB;
pub const K_STUDIO_LAMP: f64 = K_TUNGSTEN_LIGHT;
pub const K_STUDIO_CP_LIGHT: f64 = 3350.0;
pub const K_SOFT: f64 = 3700.0;
pub const K_MOONLIGHT: f64 = (4100.0 + 4150.0) / 2.0;
pub const K_COOL_WHITE: f64 = 4200.0;
pub const K_ELECTRONIC_FLASH_BULB: f64 = 4500.0;
pub const K_FLASH_BULB: f64 = K_ELECTRONIC_FLASH_BULB;
pub const K_D50: f64 = 5000.0;
pub const K_NOON_DAYLIGHT: f64 = 5000.0;
pub const K_DIRECT_SUN: f64 = K_NOON_DAYLIGHT;
pub const K_HORIZON_DAYLIGHT: f64 = 5000.0;
pub const K_D55: f64 = 5500.0;
pub const K_MODERATELY_SOFT: f64 = 5500.0;
pub const K_CLEAR_MID_DAY: f64 = 5600.0;
pub const K_VERTICAL_DAYLIGHT: f64 = (5500.0 + 6000.0) / 2.0;
pub const K_ELECTRONIC_FLASH: f64 = (5500.0 + 6000.0) / 2.0;
pub const K_XENON_SHORT_ARC_LAMP: f64 = 6200.0;
pub const K_DAYLIGHT: f64 = 6500.0;
pub const K_OVERCAST_DAY: f64 = 6500.0;
pub const K_D65: f64 = 6500.0;
pub const K_NEUTRAL: f64 = K_D65;
pub const K_WHITE: f64 = K_NEUTRAL;
pub const K_SHARP: f64 = 7000.0;
pub const K_D75: f64 = 7500.0;
pub const K_BLUE_FILTER: f64 = 8000.0;
pub const K_NORTH_LIGHT: f64 = 10000.0;
pub const K_BLUE_SKY: f64 = K_NORTH_LIGHT;
pub const K_EXTRA_SHARP: f64 = 10000.0;
pub const K_SKYLIGHT: f64 = (9000.0 + 15000.0) / 2.0;
pub const K_OUTDOOR_SHADE: f64 = K_SKYLIGHT;
pub const K_CLEAR_BLUE_POLEWARD_SKY: f64 = (15000.0 + 27000.0) / 2.0;

/// Resolve a colour temperature given either as kelvins or as a name
/// from the fixed table, e.g. `"d65"`, `"candle flame"`, `"north-light"`.
pub fn kelvins(temperature: &str) -> Result<f64> {
    if let Ok(value) = temperature.trim().parse::<f64>() {
        return Ok(value);
    }
    let name = temperature
        .trim()
        .replace(['.', '-', ' '], "_")
        .to_uppercase();
    let value = match name.as_str() {
        "MATCH_FLAME" => K_MATCH_FLAME,
        "CANDLE_FLAME" => K_CANDLE_FLAME,
        "CANDLELIGHT" => K_CANDLELIGHT,
        "SUNSET" => K_SUNSET,
        "SUNRISE" => K_SUNRISE,
        "HIGH_PRESSURE_SODIUM" => K_HIGH_PRESSURE_SODIUM,
        "STANDARD_INCANDESCENT" => K_STANDARD_INCANDESCENT,
        "INCANDESCENT" => K_INCANDESCENT,
        "EXTRA_SOFT" => K_EXTRA_SOFT,
        "INCANDESCENT_LAMP" => K_INCANDESCENT_LAMP,
        "EARLY_SUNRISE" => K_EARLY_SUNRISE,
        "LATE_SUNSET" => K_LATE_SUNSET,
        "WARM_WHITE" => K_WARM_WHITE,
        "HALOGEN_LIGHT" => K_HALOGEN_LIGHT,
        "TUNGSTEN_LIGHT" => K_TUNGSTEN_LIGHT,
        "HOUSEHOLD_LIGHT_BULB" => K_HOUSEHOLD_LIGHT_BULB,
        "LIGHT_BULB" => K_LIGHT_BULB,
        "STUDIO_LAMP" => K_STUDIO_LAMP,
        "STUDIO_CP_LIGHT" => K_STUDIO_CP_LIGHT,
        "SOFT" => K_SOFT,
        "MOONLIGHT" => K_MOONLIGHT,
        "COOL_WHITE" => K_COOL_WHITE,
        "ELECTRONIC_FLASH_BULB" => K_ELECTRONIC_FLASH_BULB,
        "FLASH_BULB" => K_FLASH_BULB,
        "D50" => K_D50,
        "NOON_DAYLIGHT" => K_NOON_DAYLIGHT,
        "DIRECT_SUN" => K_DIRECT_SUN,
        "HORIZON_DAYLIGHT" => K_HORIZON_DAYLIGHT,
        "D55" => K_D55,
        "MODERATELY_SOFT" => K_MODERATELY_SOFT,
        "CLEAR_MID_DAY" => K_CLEAR_MID_DAY,
        "VERTICAL_DAYLIGHT" => K_VERTICAL_DAYLIGHT,
        "ELECTRONIC_FLASH" => K_ELECTRONIC_FLASH,
        "XENON_SHORT_ARC_LAMP" => K_XENON_SHORT_ARC_LAMP,
        "DAYLIGHT" => K_DAYLIGHT,
        "OVERCAST_DAY" => K_OVERCAST_DAY,
        "D65" => K_D65,
        "NEUTRAL" => K_NEUTRAL,
        "WHITE" => K_WHITE,
        "SHARP" => K_SHARP,
        "D75" => K_D75,
        "BLUE_FILTER" => K_BLUE_FILTER,
        "NORTH_LIGHT" => K_NORTH_LIGHT,
        "BLUE_SKY" => K_BLUE_SKY,
        "EXTRA_SHARP" => K_EXTRA_SHARP,
        "SKYLIGHT" => K_SKYLIGHT,
        "OUTDOOR_SHADE" => K_OUTDOOR_SHADE,
        "CLEAR_BLUE_POLEWARD_SKY" => K_CLEAR_BLUE_POLEWARD_SKY,
        _ => bail!("unknown colour temperature name: {}", temperature),
    };
    Ok(value)
}

/// Calculate the whitepoint for a blackbody temperature from the CIE
/// illuminant series D rational approximation.
///
/// Using `divide_by_maximum(series_d(t))` as the algorithm is better
/// than just `series_d`.
///
/// Defined for temperatures inside [4000, 25000] K.
pub fn series_d(temperature: f64) -> (f64, f64, f64) {
    // Coefficients for the x component of the CIE xyY chromaticity,
    // as a cubic rational in 1/T.
    let ks: [f64; 4] = if temperature > 7000.0 {
        [0.237040, 0.24748, 1.9018, -2.0064]
    } else {
        [0.244063, 0.09911, 2.9678, -4.6070]
    };
    let mut x = 0.0;
    for (d, k) in ks.iter().enumerate() {
        x += k * 10f64.powi(d as i32 * 3) / temperature.powi(d as i32);
    }
    let y = 2.870 * x - 3.000 * x * x - 0.275;
    ciexyy_to_srgb(x, y, 1.0)
}

/// Calculate the whitepoint for a blackbody temperature using a simple
/// closed-form algorithm. Not guaranteed for values outside
/// [1000, 40000] K.
pub fn simple_whitepoint(temperature: f64) -> (f64, f64, f64) {
    let temp = temperature / 100.0;
    let mut r = 1.0;
    let mut g = 1.0;
    let mut b = 1.0;
    if temp > 66.0 {
        r = 1.292936186 * (temp - 60.0).powf(-0.1332047592);
        g = 1.129890861 * (temp - 60.0).powf(-0.0755148492);
    } else {
        g = 0.390081579 * temp.ln() - 0.631841444;
        if temp < 66.0 {
            b = if temp <= 19.0 {
                0.0
            } else {
                0.543206789 * (temp - 10.0).ln() - 1.196254089
            };
        }
    }
    (r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
}

/// Calculate the whitepoint for a blackbody temperature from the raw
/// CIE 1931 2° colour matching function data with interpolation.
///
/// The temperature is clipped to [1000, 40000] K.
/// `clip_whitepoint(divide_by_maximum(cmf_2deg(t)))` is the recommended
/// composition if really low temperatures will be used.
pub fn cmf_2deg(temperature: f64) -> Result<(f64, f64, f64)> {
    let lut = blackbody_lut("2deg")?;
    Ok(cmf_xdeg(temperature, &lut, 1000.0, 40000.0, 100.0))
}

/// Calculate the whitepoint for a blackbody temperature from the raw
/// CIE 1964 10° colour matching function data with interpolation.
///
/// The temperature is clipped to [1000, 40000] K.
pub fn cmf_10deg(temperature: f64) -> Result<(f64, f64, f64)> {
    let lut = blackbody_lut("10deg")?;
    Ok(cmf_xdeg(temperature, &lut, 1000.0, 40000.0, 100.0))
}

/// Interpolate a whitepoint from rows of CIE xy chromaticity pairs
/// indexed by temperature at a fixed step.
fn cmf_xdeg(temperature: f64, lut: &[Vec<f64>], temp_min: f64, temp_max: f64, temp_step: f64) -> (f64, f64, f64) {
    let temp = temperature.clamp(temp_min, temp_max) - temp_min;
    let index = (temp / temp_step).floor() as usize;
    let (x, y) = if temp % temp_step == 0.0 {
        (lut[index][0], lut[index][1])
    } else {
        let floor = &lut[index];
        let ceiling = &lut[(index + 1).min(lut.len() - 1)];
        let w = (temp % temp_step) / temp_step;
        (
            floor[0] * (1.0 - w) + ceiling[0] * w,
            floor[1] * (1.0 - w) + ceiling[1] * w,
        )
    };
    ciexyy_to_srgb(x, y, 1.0)
}

/// Calculate the whitepoint for a blackbody temperature using the same
/// table as the program redshift.
///
/// With `old_version` the table of redshift ≤ 1.8 is used and the
/// temperature is clipped to [1000, 10000]; otherwise the clip range is
/// [1000, 25100]. `linear_interpolation` interpolates the two
/// surrounding rows in linear RGB instead of sRGB.
pub fn redshift(temperature: f64, old_version: bool, linear_interpolation: bool) -> Result<(f64, f64, f64)> {
    let lut = blackbody_lut(if old_version { "redshift_old" } else { "redshift" })?;
    let max = if old_version { 10000.0 } else { 25100.0 };
    let temp = temperature.clamp(1000.0, max) - 1000.0;
    let index = (temp / 100.0).floor() as usize;
    if temp % 100.0 == 0.0 {
        let row = &lut[index];
        return Ok((row[0], row[1], row[2]));
    }
    let row1 = &lut[index];
    let row2 = &lut[(index + 1).min(lut.len() - 1)];
    let w = (temp % 100.0) / 100.0;
    let (mut rgb1, mut rgb2) = ((row1[0], row1[1], row1[2]), (row2[0], row2[1], row2[2]));
    if linear_interpolation {
        rgb1 = standard_to_linear(rgb1.0, rgb1.1, rgb1.2);
        rgb2 = standard_to_linear(rgb2.0, rgb2.1, rgb2.2);
    }
    let mut rgb = (
        rgb1.0 * (1.0 - w) + rgb2.0 * w,
        rgb1.1 * (1.0 - w) + rgb2.1 * w,
        rgb1.2 * (1.0 - w) + rgb2.2 * w,
    );
    if linear_interpolation {
        rgb = linear_to_standard(rgb.0, rgb.1, rgb.2);
    }
    Ok(rgb)
}

/// Divide all colour components by the most prominent one, so the
/// largest component becomes 1. A zero triple is returned unchanged.
pub fn divide_by_maximum(rgb: (f64, f64, f64)) -> (f64, f64, f64) {
    let m = rgb.0.abs().max(rgb.1.abs()).max(rgb.2.abs());
    if m == 0.0 {
        rgb
    } else {
        (rgb.0 / m, rgb.1 / m, rgb.2 / m)
    }
}

/// Clip all colour components to fit inside [0, 1].
pub fn clip_whitepoint(rgb: (f64, f64, f64)) -> (f64, f64, f64) {
    (
        rgb.0.clamp(0.0, 1.0),
        rgb.1.clamp(0.0, 1.0),
        rgb.2.clamp(0.0, 1.0),
    )
}

// ═══ Lookup Table Loading ═══

type Lut = Arc<Vec<Vec<f64>>>;

fn lut_cache() -> &'static Mutex<HashMap<PathBuf, Lut>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, Lut>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The directory the blackbody lookup tables are loaded from.
pub fn datadir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATADIR_ENV) {
        return PathBuf::from(dir);
    }
    let system = PathBuf::from(DATADIR_SYSTEM);
    if system.is_dir() {
        return system;
    }
    PathBuf::from(DATADIR_LOCAL)
}

/// Load a blackbody lookup table by filename, caching it for the
/// lifetime of the process.
pub fn blackbody_lut(filename: &str) -> Result<Lut> {
    let path = datadir().join(filename);
    let mut cache = lut_cache().lock().expect("blackbody LUT cache poisoned");
    if let Some(lut) = cache.get(&path) {
        return Ok(lut.clone());
    }
    let lut = Arc::new(load_lut(&path)?);
    cache.insert(path, lut.clone());
    Ok(lut)
}

/// Parse a line-oriented table of space-separated doubles.
pub fn load_lut(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read lookup table {}", path.display()))?;
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let row: Vec<f64> = line
            .split(' ')
            .filter(|cell| !cell.is_empty())
            .map(|cell| {
                cell.parse::<f64>().with_context(|| {
                    format!("bad value {:?} on line {} of {}", cell, lineno + 1, path.display())
                })
            })
            .collect::<Result<_>>()?;
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("empty lookup table {}", path.display());
    }
    Ok(rows)
}
