//! Configuration loading and validation.
//!
//! The configuration file `blueshiftrc` is searched in this order:
//! `$XDG_CONFIG_HOME/blueshift/blueshiftrc`,
//! `$HOME/.config/blueshift/blueshiftrc`, `$HOME/.blueshiftrc`, the
//! same two under the real (password-database) home directory, then
//! `/etc/blueshiftrc`.
//!
//! The file is declarative TOML: a location, day and night settings,
//! fade timing, and output selection. [`RcScript`] adapts a loaded
//! configuration to the scheduler's `ConfigScript` capability and
//! re-reads the file on reload requests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::adhoc::{AdhocSettings, DayNight};
use crate::blackbody::kelvins;
use crate::constants::{
    MAXIMUM_LATITUDE, MAXIMUM_LONGITUDE, MAXIMUM_TEMP, MINIMUM_LATITUDE, MINIMUM_LONGITUDE,
    MINIMUM_TEMP, NEUTRAL_TEMPERATURE,
};
use crate::logger::Log;
use crate::transition::{AdjustmentContext, ConfigScript, Moment, SchedulerSettings};

/// A colour temperature: kelvins, or a name from the fixed table
/// (`"d65"`, `"candle flame"`, ...).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TemperatureSpec {
    Kelvins(f64),
    Name(String),
}

impl TemperatureSpec {
    pub fn resolve(&self) -> Result<f64> {
        match self {
            TemperatureSpec::Kelvins(value) => Ok(*value),
            TemperatureSpec::Name(name) => kelvins(name),
        }
    }
}

/// A per-channel setting: one value for all channels, or `[r, g, b]`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChannelSpec {
    Uniform(f64),
    PerChannel([f64; 3]),
}

impl ChannelSpec {
    fn values(&self) -> Vec<f64> {
        match self {
            ChannelSpec::Uniform(value) => vec![*value],
            ChannelSpec::PerChannel(values) => values.to_vec(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
}

/// The adjustments of one side of the day/night cycle.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SideConfig {
    pub temperature: Option<TemperatureSpec>,
    /// sRGB brightness.
    pub brightness: Option<ChannelSpec>,
    /// CIE xyY luminosity scale.
    pub cie_brightness: Option<ChannelSpec>,
    pub gamma: Option<ChannelSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FadeConfig {
    pub fadein_time: Option<f64>,
    pub fadeout_time: Option<f64>,
    pub fadein_steps: Option<u32>,
    pub fadeout_steps: Option<u32>,
    pub wait_period: Option<f64>,
    pub reset_on_error: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Adjustment method name (`randr`, `vidmode`, `drm`, `w32gdi`,
    /// `quartz`, `dummy`); detected from the environment when absent.
    pub method: Option<String>,
    /// Display string for methods that take one.
    pub display: Option<String>,
    /// The output partition (X screen or card) to adjust.
    pub screen: Option<usize>,
    /// CRTC indices to adjust; all when absent.
    pub crtcs: Option<Vec<usize>>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub location: Option<LocationConfig>,
    pub day: Option<SideConfig>,
    pub night: Option<SideConfig>,
    pub fade: Option<FadeConfig>,
    pub output: Option<OutputConfig>,
}

impl Config {
    /// Parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("cannot parse configuration file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(location) = &self.location {
            if !(MINIMUM_LATITUDE..=MAXIMUM_LATITUDE).contains(&location.latitude) {
                bail!("latitude {} is outside [-90, 90]", location.latitude);
            }
            if !(MINIMUM_LONGITUDE..=MAXIMUM_LONGITUDE).contains(&location.longitude) {
                bail!("longitude {} is outside [-180, 180]", location.longitude);
            }
        }
        for side in [&self.day, &self.night].into_iter().flatten() {
            if let Some(spec) = &side.temperature {
                let temperature = spec.resolve()?;
                if !(MINIMUM_TEMP..=MAXIMUM_TEMP).contains(&temperature) {
                    bail!(
                        "temperature {} K is outside [{}, {}]",
                        temperature,
                        MINIMUM_TEMP,
                        MAXIMUM_TEMP
                    );
                }
            }
            for spec in [&side.brightness, &side.cie_brightness, &side.gamma]
                .into_iter()
                .flatten()
            {
                for value in spec.values() {
                    if !value.is_finite() || value <= 0.0 {
                        bail!("channel values must be positive, got {}", value);
                    }
                }
            }
        }
        if let Some(fade) = &self.fade {
            for time in [fade.fadein_time, fade.fadeout_time, fade.wait_period]
                .into_iter()
                .flatten()
            {
                if !time.is_finite() || time < 0.0 {
                    bail!("fade times must be non-negative, got {}", time);
                }
            }
        }
        if let Some(output) = &self.output {
            if let Some(method) = &output.method {
                crate::backend::BackendType::from_name(method)?;
            }
        }
        Ok(())
    }

    /// The day/night pairs in the form the ramp pipeline consumes.
    pub fn to_adhoc_settings(&self) -> Result<AdhocSettings> {
        let mut settings = AdhocSettings::default();
        settings.location = self
            .location
            .as_ref()
            .map(|location| (location.latitude, location.longitude));

        let side = |side: &Option<SideConfig>| side.clone().unwrap_or_default();
        let (day, night) = (side(&self.day), side(&self.night));

        let pair = |day: &Option<ChannelSpec>, night: &Option<ChannelSpec>, default: f64| {
            let day = day.as_ref().map(ChannelSpec::values).unwrap_or_else(|| vec![default]);
            let mut night = night.as_ref().map(ChannelSpec::values).unwrap_or_else(|| vec![default]);
            // Align arities so the pair can be zipped
            let arity = day.len().max(night.len());
            let widen = |mut v: Vec<f64>| {
                if v.len() < arity {
                    v = vec![v[0]; arity];
                }
                v
            };
            night = widen(night);
            DayNight { day: widen(day), night }
        };

        settings.gammas = pair(&day.gamma, &night.gamma, 1.0);
        settings.rgb_brightnesses = pair(&day.brightness, &night.brightness, 1.0);
        settings.cie_brightnesses = pair(&day.cie_brightness, &night.cie_brightness, 1.0);

        let temperature = |side: &SideConfig| -> Result<f64> {
            side.temperature
                .as_ref()
                .map(TemperatureSpec::resolve)
                .unwrap_or(Ok(NEUTRAL_TEMPERATURE))
        };
        settings.rgb_temperatures = DayNight {
            day: vec![temperature(&day)?],
            night: vec![temperature(&night)?],
        };
        settings.cie_temperatures = DayNight::uniform(NEUTRAL_TEMPERATURE);

        settings.continuous = settings.location.is_some()
            || settings.gammas.day != settings.gammas.night
            || settings.rgb_brightnesses.day != settings.rgb_brightnesses.night
            || settings.cie_brightnesses.day != settings.cie_brightnesses.night
            || settings.rgb_temperatures.day != settings.rgb_temperatures.night;
        Ok(settings)
    }

    /// Fade timing for the scheduler.
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        let mut settings = SchedulerSettings::default();
        if let Some(fade) = &self.fade {
            if let Some(time) = fade.fadein_time {
                settings.fadein_time = if time == 0.0 { None } else { Some(time) };
            }
            if let Some(time) = fade.fadeout_time {
                settings.fadeout_time = if time == 0.0 { None } else { Some(time) };
            }
            if let Some(steps) = fade.fadein_steps {
                settings.fadein_steps = steps;
            }
            if let Some(steps) = fade.fadeout_steps {
                settings.fadeout_steps = steps;
            }
            if let Some(period) = fade.wait_period {
                settings.wait_period = period;
            }
            if let Some(reset) = fade.reset_on_error {
                settings.reset_on_error = reset;
            }
        }
        settings
    }

    /// Log the interesting parts of the configuration.
    pub fn log_config(&self, path: &Path) {
        Log::log_block_start(&format!("Loaded configuration from {}", path.display()));
        match &self.location {
            Some(location) => Log::log_indented(&format!(
                "Location: {:.4}, {:.4}",
                location.latitude, location.longitude
            )),
            None => Log::log_indented("Location: none (time-of-day fallback)"),
        }
        let describe = |label: &str, side: &Option<SideConfig>| {
            let side = side.clone().unwrap_or_default();
            let temperature = side
                .temperature
                .as_ref()
                .and_then(|spec| spec.resolve().ok())
                .unwrap_or(NEUTRAL_TEMPERATURE);
            Log::log_indented(&format!("{}: {} K", label, temperature));
        };
        describe("Day", &self.day);
        describe("Night", &self.night);
    }
}

/// The configuration file search path, in precedence order.
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        candidates.push(PathBuf::from(xdg).join("blueshift").join("blueshiftrc"));
    }
    if let Ok(home) = std::env::var("HOME") {
        let home = PathBuf::from(home);
        candidates.push(home.join(".config").join("blueshift").join("blueshiftrc"));
        candidates.push(home.join(".blueshiftrc"));
    }
    if let Some(home) = real_home() {
        candidates.push(home.join(".config").join("blueshift").join("blueshiftrc"));
        candidates.push(home.join(".blueshiftrc"));
    }
    candidates.push(PathBuf::from("/etc/blueshiftrc"));
    candidates
}

/// Find the configuration file to use.
pub fn find_config_file() -> Option<PathBuf> {
    config_file_candidates().into_iter().find(|path| path.exists())
}

/// The real user's home directory from the password database; unlike
/// `$HOME` it cannot be overridden.
fn real_home() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        unsafe {
            let uid = libc::getuid();
            let mut pwd: libc::passwd = std::mem::zeroed();
            let mut buffer = vec![0i8; 4096];
            let mut result: *mut libc::passwd = std::ptr::null_mut();
            let rc = libc::getpwuid_r(
                uid,
                &mut pwd,
                buffer.as_mut_ptr() as *mut libc::c_char,
                buffer.len(),
                &mut result,
            );
            if rc == 0 && !result.is_null() && !pwd.pw_dir.is_null() {
                let dir = std::ffi::CStr::from_ptr(pwd.pw_dir);
                if let Ok(dir) = dir.to_str() {
                    return Some(PathBuf::from(dir));
                }
            }
        }
        dirs::home_dir()
    }
    #[cfg(not(unix))]
    {
        dirs::home_dir()
    }
}

/// A loaded configuration file acting as the scheduler's
/// configuration script.
pub struct RcScript {
    path: PathBuf,
    settings: AdhocSettings,
}

impl RcScript {
    pub fn new(path: PathBuf) -> Result<RcScript> {
        let config = Config::load(&path)?;
        Self::from_config(path, &config)
    }

    /// Build from an already loaded configuration, avoiding a second
    /// read of the file.
    pub fn from_config(path: PathBuf, config: &Config) -> Result<RcScript> {
        let settings = config.to_adhoc_settings()?;
        Ok(RcScript { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &AdhocSettings {
        &self.settings
    }
}

impl ConfigScript for RcScript {
    fn periodically(
        &mut self,
        ctx: &mut AdjustmentContext<'_>,
        moment: &Moment,
        fade: Option<f64>,
    ) -> Result<()> {
        self.settings.periodically(ctx, moment, fade)
    }

    fn reload(&mut self) -> Result<()> {
        let config = Config::load(&self.path)?;
        self.settings = config.to_adhoc_settings()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [location]
            latitude = 59.3293
            longitude = 18.0686

            [day]
            temperature = 6500
            brightness = 1.0
            gamma = [1.0, 1.0, 1.1]

            [night]
            temperature = "candle flame"
            brightness = 0.8

            [fade]
            fadein_time = 4.0
            fadein_steps = 80

            [output]
            method = "dummy"
            crtcs = [0, 1]
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        let night_temp = config.night.as_ref().unwrap().temperature.as_ref().unwrap();
        assert_eq!(night_temp.resolve().unwrap(), 1850.0);
        let settings = config.to_adhoc_settings().unwrap();
        assert!(settings.continuous);
        assert_eq!(settings.rgb_temperatures.night, vec![1850.0]);
        assert_eq!(settings.gammas.day, vec![1.0, 1.0, 1.1]);
        // Uniform night gamma widened to match the day arity
        assert_eq!(settings.gammas.night, vec![1.0, 1.0, 1.0]);
        let scheduler = config.scheduler_settings();
        assert_eq!(scheduler.fadein_time, Some(4.0));
        assert_eq!(scheduler.fadein_steps, 80);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config: Config = toml::from_str("[location]\nlatitude = 91.0\nlongitude = 0.0").unwrap();
        assert!(config.validate().is_err());
        let config: Config = toml::from_str("[day]\ntemperature = 100").unwrap();
        assert!(config.validate().is_err());
        let config: Config = toml::from_str("[output]\nmethod = \"wayland\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("[day]\ntemprature = 5000").is_err());
    }

    #[test]
    fn test_empty_config_is_one_shot_neutral() {
        let config: Config = toml::from_str("").unwrap();
        let settings = config.to_adhoc_settings().unwrap();
        assert!(!settings.continuous);
        assert_eq!(settings.rgb_temperatures.day, vec![NEUTRAL_TEMPERATURE]);
    }

    #[test]
    fn test_candidates_end_with_etc() {
        let candidates = config_file_candidates();
        assert_eq!(candidates.last().unwrap(), &PathBuf::from("/etc/blueshiftrc"));
    }
}
