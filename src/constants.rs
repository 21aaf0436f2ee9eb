//! Application constants and default values for blueshift.
//!
//! This module contains the configuration defaults, validation limits,
//! and operational constants used throughout the application.

// ═══ Working Curve Dimensions ═══
// The working curves hold ENCODING_SIZE stops in [0, 1]; OUTPUT_SIZE
// governs final quantization when a backend needs integer ramps.

pub const ENCODING_SIZE: usize = 1 << 8; // 256 stops
pub const OUTPUT_SIZE: usize = 1 << 16; // 65536 levels

// ═══ Scheduler Defaults ═══
// These values are used when the configuration does not specify them

pub const DEFAULT_WAIT_PERIOD: f64 = 60.0; // seconds between periodic refreshes
pub const DEFAULT_FADEIN_TIME: f64 = 2.0; // seconds
pub const DEFAULT_FADEOUT_TIME: f64 = 2.0; // seconds
pub const DEFAULT_FADEIN_STEPS: u32 = 40;
pub const DEFAULT_FADEOUT_STEPS: u32 = 40;

// Ad-hoc one-shot fade (no configuration file involved)
pub const ADHOC_FADE_STEP: f64 = 0.05;
pub const ADHOC_FADE_SLEEP_MS: u64 = 100;

// ═══ Day/Night Defaults ═══

pub const NEUTRAL_TEMPERATURE: f64 = 6500.0; // Kelvin, D65
pub const DEFAULT_ADHOC_DAY_TEMP: f64 = 3500.0; // Kelvin
pub const DEFAULT_ADHOC_NIGHT_TEMP: f64 = 5500.0; // Kelvin

// ═══ Validation Limits ═══
// These limits keep user inputs within ranges the whitepoint tables cover

pub const MINIMUM_TEMP: f64 = 1000.0;
pub const MAXIMUM_TEMP: f64 = 40000.0;
pub const MINIMUM_LATITUDE: f64 = -90.0;
pub const MAXIMUM_LATITUDE: f64 = 90.0;
pub const MINIMUM_LONGITUDE: f64 = -180.0;
pub const MAXIMUM_LONGITUDE: f64 = 180.0;

// ═══ Solar Constants ═══

pub const SOLAR_ELEVATION_SUNSET_SUNRISE: f64 = 0.0;
pub const SOLAR_ELEVATION_CIVIL_DUSK_DAWN: f64 = -6.0;
pub const SOLAR_ELEVATION_NAUTICAL_DUSK_DAWN: f64 = -12.0;
pub const SOLAR_ELEVATION_ASTRONOMICAL_DUSK_DAWN: f64 = -18.0;

// Default visibility band for `sun()`: 100 % night at or below LOW,
// 100 % day at or above HIGH.
pub const DEFAULT_SUN_LOW: f64 = -6.0;
pub const DEFAULT_SUN_HIGH: f64 = 3.0;

// ═══ Cooperative Gamma ═══

pub const DEFAULT_COOPERATIVE_PRIORITY: i64 = 1 << 59;
pub const DEFAULT_COOPERATIVE_RULE: &str = "standard";

// ═══ Data Files ═══
// Text lookup tables shipped with the program; see blackbody.rs

pub const DATADIR_ENV: &str = "BLUESHIFT_DATADIR";
pub const DATADIR_SYSTEM: &str = "/usr/share/blueshift";
pub const DATADIR_LOCAL: &str = "res";

// ═══ Exit Codes ═══

pub const EXIT_FAILURE: i32 = 1;
