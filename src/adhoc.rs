//! Ad-hoc mode: command-line day/night settings without a
//! configuration file.
//!
//! Each setting is a (day, night) pair; the applied value interpolates
//! between them by the Sun's visibility (or a crude time-of-day
//! fallback when no location is known), and towards the clean state by
//! the transition progress. Continuous mode runs the full scheduler;
//! one-shot mode fades in once and exits.

use anyhow::Result;

use crate::blackbody::{clip_whitepoint, cmf_10deg, divide_by_maximum};
use crate::constants::{
    ADHOC_FADE_SLEEP_MS, ADHOC_FADE_STEP, DEFAULT_ADHOC_DAY_TEMP, DEFAULT_ADHOC_NIGHT_TEMP,
    NEUTRAL_TEMPERATURE,
};
use crate::curve::{Channels, RampEngine};
use crate::output::MonitorController;
use crate::solar::sun;
use crate::transition::{AdjustmentContext, ConfigScript, Moment, SchedulerFlags};

/// A per-setting (day, night) pair. Each side holds one value for all
/// channels or three per-channel values.
#[derive(Clone, Debug, PartialEq)]
pub struct DayNight {
    pub day: Vec<f64>,
    pub night: Vec<f64>,
}

impl DayNight {
    pub fn uniform(value: f64) -> DayNight {
        DayNight { day: vec![value], night: vec![value] }
    }
}

/// The parsed ad-hoc settings.
#[derive(Clone, Debug)]
pub struct AdhocSettings {
    pub location: Option<(f64, f64)>,
    pub gammas: DayNight,
    pub rgb_brightnesses: DayNight,
    pub cie_brightnesses: DayNight,
    pub rgb_temperatures: DayNight,
    pub cie_temperatures: DayNight,
    /// Whether any setting distinguishes day from night (or a
    /// location is known), so the adjustments must track time.
    pub continuous: bool,
    /// Apply identity instead of the settings.
    pub reset: bool,
}

impl Default for AdhocSettings {
    fn default() -> Self {
        AdhocSettings {
            location: None,
            gammas: DayNight::uniform(1.0),
            rgb_brightnesses: DayNight::uniform(1.0),
            cie_brightnesses: DayNight::uniform(1.0),
            rgb_temperatures: DayNight {
                day: vec![DEFAULT_ADHOC_DAY_TEMP],
                night: vec![DEFAULT_ADHOC_NIGHT_TEMP],
            },
            cie_temperatures: DayNight::uniform(NEUTRAL_TEMPERATURE),
            continuous: false,
            reset: false,
        }
    }
}

/// The crude location-free dayness: 100 % day at exactly 12:00,
/// 100 % night at exactly 22:00, linear in between (wrapping through
/// the night).
pub fn time_of_day_dayness(hour: u32, minute: u32, second: u32) -> f64 {
    let hh = hour as f64;
    let mm = minute as f64 + second as f64 / 60.0;
    if (12.0..=22.0).contains(&hh) {
        1.0 - (hh - 12.0) / (22.0 - 12.0) - mm / 60.0
    } else {
        (hh + if hh <= 12.0 { 10.0 } else { 0.0 } - 22.0) / 14.0 + mm / 60.0
    }
}

impl AdhocSettings {
    /// The degree to which it is day, in [0, 1].
    fn dayness(&self, moment: &Moment) -> f64 {
        match self.location {
            Some((latitude, longitude)) => sun(latitude, longitude),
            None => {
                if self.continuous {
                    time_of_day_dayness(moment.hour, moment.minute, moment.second)
                } else {
                    // Not tracking time: assume day
                    1.0
                }
            }
        }
    }

    /// Interpolate a pair: between day and night by `dayness`, and
    /// from the adjusted value towards `default` by `pureness`.
    fn interpolate(&self, default: f64, pair: &DayNight, dayness: f64, pureness: f64) -> Vec<f64> {
        pair.day
            .iter()
            .zip(&pair.night)
            .map(|(&day, &night)| {
                default * pureness + (day * dayness + night * (1.0 - dayness)) * (1.0 - pureness)
            })
            .collect()
    }

    /// Recompute the working curves and push them to the monitors.
    ///
    /// `pureness` is the transitioning progress: 1 at the clean state,
    /// 0 at the fully adjusted state.
    pub fn apply(
        &self,
        engine: &mut RampEngine,
        controller: &mut MonitorController,
        dayness: f64,
        pureness: f64,
    ) -> Result<()> {
        engine.start_over();
        let mut algorithm =
            |t: f64| -> Result<(f64, f64, f64)> { Ok(clip_whitepoint(divide_by_maximum(cmf_10deg(t)?))) };

        let rgb_temp = self.interpolate(NEUTRAL_TEMPERATURE, &self.rgb_temperatures, dayness, pureness);
        engine.rgb_temperature(rgb_temp[0], &mut algorithm)?;
        let cie_temp = self.interpolate(NEUTRAL_TEMPERATURE, &self.cie_temperatures, dayness, pureness);
        engine.cie_temperature(cie_temp[0], &mut algorithm)?;

        engine.rgb_brightness(channels(&self.interpolate(1.0, &self.rgb_brightnesses, dayness, pureness)));
        engine.cie_brightness(channels(&self.interpolate(1.0, &self.cie_brightnesses, dayness, pureness)));

        // Clip before gamma, otherwise negative stops would go complex
        engine.clip(Channels::uniform(true));
        engine.gamma(channels(&self.interpolate(1.0, &self.gammas, dayness, pureness)));
        engine.clip(Channels::uniform(true));

        controller.apply(engine)
    }

    /// One-shot mode: fade in (unless gated), apply the final state,
    /// and return.
    pub fn run_once(
        &self,
        engine: &mut RampEngine,
        controller: &mut MonitorController,
        flags: &SchedulerFlags,
    ) -> Result<()> {
        let moment = Moment::now();
        if !flags.panicgate() {
            let mut trans = 0.0;
            while flags.running() && trans < 1.0 {
                let pureness = if self.reset { trans } else { 1.0 - trans };
                self.apply(engine, controller, self.dayness(&moment), pureness)?;
                trans += ADHOC_FADE_STEP;
                flags.sleep(ADHOC_FADE_SLEEP_MS as f64 / 1000.0);
            }
        }
        let pureness = if self.reset { 1.0 } else { 0.0 };
        self.apply(engine, controller, self.dayness(&moment), pureness)
    }
}

impl ConfigScript for AdhocSettings {
    fn periodically(
        &mut self,
        ctx: &mut AdjustmentContext<'_>,
        moment: &Moment,
        fade: Option<f64>,
    ) -> Result<()> {
        let pureness = match fade {
            None => 0.0,
            Some(fade) => 1.0 - fade.abs(),
        };
        let dayness = self.dayness(moment);
        self.apply(ctx.engine, ctx.controller, dayness, pureness)
    }
}

fn channels(values: &[f64]) -> Channels<f64> {
    match values {
        [v] => Channels::uniform(*v),
        [r, g, b] => Channels::new(*r, *g, *b),
        _ => Channels::uniform(1.0),
    }
}
