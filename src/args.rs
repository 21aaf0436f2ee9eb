//! Command-line argument parsing.
//!
//! The option set is hand-parsed: the `++brightness`/`++temperature`
//! long options (the CIE xyY variants of their `--` siblings) do not
//! fit any derive-style parser. Day/night options may be given twice;
//! the first use is the day value, the second the night value.

use crate::blackbody::kelvins;
use crate::logger::Log;

use anyhow::{Context, Result, bail};

use crate::adhoc::{AdhocSettings, DayNight};
use crate::constants::{DEFAULT_ADHOC_DAY_TEMP, DEFAULT_ADHOC_NIGHT_TEMP, NEUTRAL_TEMPERATURE};

/// Represents the parsed command-line arguments and their intended
/// actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon or the ad-hoc pipeline with these settings.
    Run(Box<Options>),
    /// Display help information and exit.
    ShowHelp,
    /// Display copyright information and exit.
    ShowCopying,
    /// Display non-warranty information and exit.
    ShowWarranty,
    /// Display version information and exit.
    ShowVersion,
    /// A usage error was diagnosed; exit with failure.
    UsageError,
}

/// The raw option values, before ad-hoc defaulting.
#[derive(Debug, Default, PartialEq)]
pub struct Options {
    pub config_file: Option<String>,
    pub panicgate: bool,
    pub reset: bool,
    pub location: Option<String>,
    pub gammas: Vec<String>,
    pub rgb_brightnesses: Vec<String>,
    pub cie_brightnesses: Vec<String>,
    pub rgb_temperatures: Vec<String>,
    pub cie_temperatures: Vec<String>,
    pub outputs: Vec<String>,
}

impl Options {
    /// Whether any ad-hoc option was used.
    pub fn used_adhoc(&self) -> bool {
        self.reset
            || self.location.is_some()
            || !self.gammas.is_empty()
            || !self.rgb_brightnesses.is_empty()
            || !self.cie_brightnesses.is_empty()
            || !self.rgb_temperatures.is_empty()
            || !self.cie_temperatures.is_empty()
            || !self.outputs.is_empty()
    }

    /// The selected CRTC indices, flattened from comma-separated and
    /// repeated uses.
    pub fn output_indices(&self) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        for value in &self.outputs {
            for part in value.split(',') {
                indices.push(
                    part.trim()
                        .parse::<usize>()
                        .with_context(|| format!("bad CRTC index: {}", part))?,
                );
            }
        }
        Ok(indices)
    }

    /// The geographic location, as `LAT:LON`.
    pub fn parsed_location(&self) -> Result<Option<(f64, f64)>> {
        let Some(value) = &self.location else {
            return Ok(None);
        };
        let (latitude, longitude) = value
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("location must be LAT:LON, got {}", value))?;
        let latitude: f64 = latitude.trim().parse().context("bad latitude")?;
        let longitude: f64 = longitude.trim().parse().context("bad longitude")?;
        Ok(Some((latitude, longitude)))
    }

    /// Resolve the ad-hoc settings: fill day/night pairs, duplicate
    /// single uses, and apply the defaults for unspecified options.
    pub fn to_adhoc_settings(&self) -> Result<AdhocSettings> {
        // Continuous mode is decided from what the user actually gave:
        // any option used twice, or a known location
        let continuous = [
            &self.gammas,
            &self.rgb_brightnesses,
            &self.cie_brightnesses,
            &self.rgb_temperatures,
            &self.cie_temperatures,
        ]
        .iter()
        .any(|values| values.len() == 2)
            || self.location.is_some();

        let channel_values = |value: &str| -> Result<Vec<f64>> {
            let values: Vec<f64> = value
                .split(':')
                .map(|part| part.trim().parse::<f64>().with_context(|| format!("bad value: {}", part)))
                .collect::<Result<_>>()?;
            if values.len() != 1 && values.len() != 3 {
                bail!("expected RGB or R:G:B, got {}", value);
            }
            Ok(values)
        };
        let pair = |values: &[String], default: f64| -> Result<DayNight> {
            Ok(match values {
                [] => DayNight::uniform(default),
                [both] => {
                    let both = channel_values(both)?;
                    DayNight { day: both.clone(), night: both }
                }
                [day, night] => {
                    let day = channel_values(day)?;
                    let night = channel_values(night)?;
                    if day.len() != night.len() {
                        bail!("day and night values must have the same number of channels");
                    }
                    DayNight { day, night }
                }
                _ => bail!("an option was used more than twice"),
            })
        };
        let temperature_pair = |values: &[String], defaults: (f64, f64)| -> Result<DayNight> {
            Ok(match values {
                [] => DayNight { day: vec![defaults.0], night: vec![defaults.1] },
                [both] => {
                    let both = kelvins(both)?;
                    DayNight { day: vec![both], night: vec![both] }
                }
                [day, night] => DayNight { day: vec![kelvins(day)?], night: vec![kelvins(night)?] },
                _ => bail!("an option was used more than twice"),
            })
        };

        let mut settings = AdhocSettings {
            location: self.parsed_location()?,
            gammas: pair(&self.gammas, 1.0)?,
            rgb_brightnesses: pair(&self.rgb_brightnesses, 1.0)?,
            cie_brightnesses: pair(&self.cie_brightnesses, 1.0)?,
            continuous,
            reset: self.reset,
            ..AdhocSettings::default()
        };
        // When no temperature is given at all, the sRGB pair defaults
        // to the day/night preset and the CIE pair stays neutral;
        // otherwise the unspecified family is neutral
        if self.rgb_temperatures.is_empty() && self.cie_temperatures.is_empty() {
            settings.rgb_temperatures = DayNight {
                day: vec![DEFAULT_ADHOC_DAY_TEMP],
                night: vec![DEFAULT_ADHOC_NIGHT_TEMP],
            };
            settings.cie_temperatures = DayNight::uniform(NEUTRAL_TEMPERATURE);
        } else {
            settings.rgb_temperatures =
                temperature_pair(&self.rgb_temperatures, (NEUTRAL_TEMPERATURE, NEUTRAL_TEMPERATURE))?;
            settings.cie_temperatures =
                temperature_pair(&self.cie_temperatures, (NEUTRAL_TEMPERATURE, NEUTRAL_TEMPERATURE))?;
        }
        Ok(settings)
    }
}

/// Result of parsing the command line.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Options::default();
        let mut show_help = false;
        let mut show_copying = false;
        let mut show_warranty = false;
        let mut show_version = false;
        let mut errors = false;

        let mut iter = args.into_iter().skip(1);

        while let Some(arg) = iter.next() {
            let arg = arg.as_ref().to_string();
            // Split --flag=value forms
            let (flag, mut inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg.clone(), None),
            };
            let mut value = |iter: &mut dyn Iterator<Item = S>| -> Option<String> {
                inline.take().or_else(|| iter.next().map(|v| v.as_ref().to_string()))
            };
            match flag.as_str() {
                "--help" | "-h" | "-?" => show_help = true,
                "--copying" | "--copyright" | "-C" => show_copying = true,
                "--warranty" | "-W" => show_warranty = true,
                "--version" | "-v" => show_version = true,
                "--panicgate" | "--panic-gate" | "-p" => {
                    if options.panicgate {
                        Log::log_error("--panicgate can only be used once");
                        errors = true;
                    }
                    options.panicgate = true;
                }
                "--reset" | "-r" => {
                    if options.reset {
                        Log::log_error("--reset can only be used once");
                        errors = true;
                    }
                    options.reset = true;
                }
                "--configurations" | "-c" => match value(&mut iter) {
                    Some(file) if options.config_file.is_none() => options.config_file = Some(file),
                    Some(_) => {
                        Log::log_error("--configurations can only be used once");
                        errors = true;
                    }
                    None => {
                        Log::log_error("--configurations requires a FILE argument");
                        errors = true;
                    }
                },
                "--location" | "-l" => match value(&mut iter) {
                    Some(location) if options.location.is_none() => {
                        options.location = Some(location)
                    }
                    Some(_) => {
                        Log::log_error("--location can only be used once");
                        errors = true;
                    }
                    None => {
                        Log::log_error("--location requires a LAT:LON argument");
                        errors = true;
                    }
                },
                "--gamma" | "-g" => {
                    push_twice(&mut options.gammas, value(&mut iter), "--gamma", &mut errors)
                }
                "--brightness" | "-b" => push_twice(
                    &mut options.rgb_brightnesses,
                    value(&mut iter),
                    "--brightness",
                    &mut errors,
                ),
                "++brightness" | "+b" => push_twice(
                    &mut options.cie_brightnesses,
                    value(&mut iter),
                    "++brightness",
                    &mut errors,
                ),
                "--temperature" | "-t" => push_twice(
                    &mut options.rgb_temperatures,
                    value(&mut iter),
                    "--temperature",
                    &mut errors,
                ),
                "++temperature" | "+t" => push_twice(
                    &mut options.cie_temperatures,
                    value(&mut iter),
                    "++temperature",
                    &mut errors,
                ),
                "--output" | "--crtc" | "-o" => match value(&mut iter) {
                    Some(output) => options.outputs.push(output),
                    None => {
                        Log::log_error("--output requires a CRTCS argument");
                        errors = true;
                    }
                },
                other => {
                    Log::log_error(&format!("Unknown option: {}", other));
                    errors = true;
                }
            }
        }

        let action = if show_version {
            CliAction::ShowVersion
        } else if show_help {
            CliAction::ShowHelp
        } else if show_copying {
            CliAction::ShowCopying
        } else if show_warranty {
            CliAction::ShowWarranty
        } else if errors {
            CliAction::UsageError
        } else {
            CliAction::Run(Box::new(options))
        };
        ParsedArgs { action }
    }

    /// Convenience method to parse from `std::env::args()`.
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

fn push_twice(values: &mut Vec<String>, value: Option<String>, flag: &str, errors: &mut bool) {
    match value {
        Some(value) if values.len() < 2 => values.push(value),
        Some(_) => {
            Log::log_error(&format!("{} can only be used up to two times", flag));
            *errors = true;
        }
        None => {
            Log::log_error(&format!("{} requires an argument", flag));
            *errors = true;
        }
    }
}

/// Displays version information.
pub fn display_version_info() {
    println!("blueshift {}", env!("CARGO_PKG_VERSION"));
}

/// Displays the help message.
pub fn display_help() {
    Log::log_version();
    Log::log_block_start("Colour temperature controller");
    Log::log_block_start("Usage: blueshift [OPTIONS] ");
    Log::log_block_start("Options:");
    Log::log_indented("-c, --configurations FILE   Select configuration file");
    Log::log_indented("-p, --panicgate             Skip transition into initial settings");
    Log::log_indented("-g, --gamma RGB|R:G:B       Set gamma correction");
    Log::log_indented("-b, --brightness RGB|R:G:B  Set brightness using sRGB");
    Log::log_indented("+b, ++brightness Y          Set brightness using CIE xyY");
    Log::log_indented("-t, --temperature TEMP      Set colour temperature");
    Log::log_indented("+t, ++temperature TEMP      Set colour temperature using CIE xyY");
    Log::log_indented("-l, --location LAT:LON      Select your GPS location");
    Log::log_indented("-r, --reset                 Reset to default settings");
    Log::log_indented("-o, --output CRTCS          Select CRTCs to apply changes to");
    Log::log_indented("-h, --help                  Print this help information");
    Log::log_indented("-C, --copying               Print copyright information");
    Log::log_indented("-W, --warranty              Print non-warranty information");
    Log::log_indented("-v, --version               Print program name and version");
    Log::log_pipe();
    Log::log_indented("Day/night options can be used twice: day value, then night value.");
    Log::log_end();
}

/// Displays copyright information.
pub fn display_copying() {
    println!("Copyright © the blueshift contributors.");
    println!();
    println!("This program is free software: you can redistribute it and/or modify");
    println!("it under the terms of the GNU Affero General Public License as published by");
    println!("the Free Software Foundation, either version 3 of the License, or");
    println!("(at your option) any later version.");
}

/// Displays non-warranty information.
pub fn display_warranty() {
    println!("This program is distributed in the hope that it will be useful,");
    println!("but WITHOUT ANY WARRANTY; without even the implied warranty of");
    println!("MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the");
    println!("GNU Affero General Public License for more details.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_options(args: &[&str]) -> Options {
        match ParsedArgs::parse(args.iter().copied()).action {
            CliAction::Run(options) => *options,
            other => panic!("expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_no_args() {
        let options = run_options(&["blueshift"]);
        assert_eq!(options, Options::default());
        assert!(!options.used_adhoc());
    }

    #[test]
    fn test_parse_help_takes_precedence() {
        let parsed = ParsedArgs::parse(["blueshift", "--help", "--reset"]);
        assert_eq!(parsed.action, CliAction::ShowHelp);
        let parsed = ParsedArgs::parse(["blueshift", "--version", "--help"]);
        assert_eq!(parsed.action, CliAction::ShowVersion);
    }

    #[test]
    fn test_parse_unknown_flag() {
        let parsed = ParsedArgs::parse(["blueshift", "--unknown"]);
        assert_eq!(parsed.action, CliAction::UsageError);
    }

    #[test]
    fn test_parse_day_night_pairs() {
        let options = run_options(&[
            "blueshift",
            "--temperature",
            "5500",
            "--temperature",
            "3500",
            "-g",
            "1.1:1.0:0.9",
        ]);
        assert_eq!(options.rgb_temperatures, vec!["5500", "3500"]);
        assert_eq!(options.gammas, vec!["1.1:1.0:0.9"]);
        assert!(options.used_adhoc());
        let settings = options.to_adhoc_settings().unwrap();
        assert!(settings.continuous);
        assert_eq!(settings.rgb_temperatures.day, vec![5500.0]);
        assert_eq!(settings.rgb_temperatures.night, vec![3500.0]);
        assert_eq!(settings.gammas.day, vec![1.1, 1.0, 0.9]);
        assert_eq!(settings.gammas.night, vec![1.1, 1.0, 0.9]);
    }

    #[test]
    fn test_parse_plus_options() {
        let options = run_options(&["blueshift", "++temperature", "5000", "+b", "0.9"]);
        assert_eq!(options.cie_temperatures, vec!["5000"]);
        assert_eq!(options.cie_brightnesses, vec!["0.9"]);
        let settings = options.to_adhoc_settings().unwrap();
        assert_eq!(settings.cie_temperatures.day, vec![5000.0]);
        // Specifying only the CIE family leaves the sRGB family neutral
        assert_eq!(settings.rgb_temperatures.day, vec![NEUTRAL_TEMPERATURE]);
    }

    #[test]
    fn test_parse_third_use_fails() {
        let parsed = ParsedArgs::parse(["blueshift", "-t", "1", "-t", "2", "-t", "3"]);
        assert_eq!(parsed.action, CliAction::UsageError);
    }

    #[test]
    fn test_parse_location_and_outputs() {
        let options = run_options(&[
            "blueshift",
            "--location",
            "59.3:18.1",
            "-o",
            "0,2",
            "--output",
            "3",
        ]);
        assert_eq!(options.parsed_location().unwrap(), Some((59.3, 18.1)));
        assert_eq!(options.output_indices().unwrap(), vec![0, 2, 3]);
        let settings = options.to_adhoc_settings().unwrap();
        assert!(settings.continuous);
        assert_eq!(settings.location, Some((59.3, 18.1)));
    }

    #[test]
    fn test_parse_equals_form() {
        let options = run_options(&["blueshift", "--temperature=4500", "--location=0:0"]);
        assert_eq!(options.rgb_temperatures, vec!["4500"]);
        assert_eq!(options.location.as_deref(), Some("0:0"));
    }

    #[test]
    fn test_named_temperature() {
        let options = run_options(&["blueshift", "-t", "candle flame"]);
        let settings = options.to_adhoc_settings().unwrap();
        assert_eq!(settings.rgb_temperatures.day, vec![1850.0]);
    }

    #[test]
    fn test_default_temperatures_when_unspecified() {
        let options = run_options(&["blueshift", "--location", "0:0"]);
        let settings = options.to_adhoc_settings().unwrap();
        assert_eq!(settings.rgb_temperatures.day, vec![DEFAULT_ADHOC_DAY_TEMP]);
        assert_eq!(settings.rgb_temperatures.night, vec![DEFAULT_ADHOC_NIGHT_TEMP]);
    }

    #[test]
    fn test_missing_value_is_error() {
        let parsed = ParsedArgs::parse(["blueshift", "--temperature"]);
        assert_eq!(parsed.action, CliAction::UsageError);
    }
}
