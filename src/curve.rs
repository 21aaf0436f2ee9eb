//! The ramp engine: working colour curves and their operators.
//!
//! A `RampEngine` owns three working curves (red, green, blue), each a
//! sequence of [0, 1] stops over the encoding axis. Every adjustment
//! operator mutates the curves in place; the composition of all
//! operators applied since `start_over` is what eventually gets pushed
//! to the CRTCs.
//!
//! Per-channel parameters follow the overloading rule of the original
//! interface: an elided green defaults to red, an elided blue defaults
//! to green. `Channels::spread` encodes that rule.

use anyhow::Result;

use crate::colour::{
    ciexyy_to_srgb, linear_to_standard1, srgb_to_ciexyy, standard_to_linear1,
};
use crate::constants::{ENCODING_SIZE, NEUTRAL_TEMPERATURE, OUTPUT_SIZE};

/// A per-channel parameter triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Channels<T> {
    pub red: T,
    pub green: T,
    pub blue: T,
}

impl<T: Copy> Channels<T> {
    /// The same parameter for every channel.
    pub fn uniform(value: T) -> Self {
        Channels { red: value, green: value, blue: value }
    }

    /// Elision rule: green defaults to red, blue defaults to green.
    pub fn spread(red: T, green: Option<T>, blue: Option<T>) -> Self {
        let green = green.unwrap_or(red);
        let blue = blue.unwrap_or(green);
        Channels { red, green, blue }
    }

    pub fn new(red: T, green: T, blue: T) -> Self {
        Channels { red, green, blue }
    }
}

/// A whitepoint algorithm: blackbody temperature in kelvins to an sRGB
/// triple. Fallible because the table-driven algorithms read data files.
pub type WhitepointFn<'a> = &'a mut dyn FnMut(f64) -> Result<(f64, f64, f64)>;

/// A snapshot of the working curves, as taken by [`RampEngine::store`].
#[derive(Clone, Debug, PartialEq)]
pub struct CurveState {
    pub red: Vec<f64>,
    pub green: Vec<f64>,
    pub blue: Vec<f64>,
}

/// The working curves plus the process-wide curve settings.
#[derive(Clone, Debug)]
pub struct RampEngine {
    red: Vec<f64>,
    green: Vec<f64>,
    blue: Vec<f64>,
    output_size: usize,
    /// Whether final quantization clips out-of-range stops. Allowing
    /// overflow instead can create visual artifacts.
    pub clip_result: bool,
}

impl Default for RampEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RampEngine {
    /// An engine with the default encoding size (256 stops) and output
    /// size (65536 levels), holding identity curves.
    pub fn new() -> Self {
        Self::with_sizes(ENCODING_SIZE, OUTPUT_SIZE)
    }

    /// An engine with explicit encoding and output sizes.
    pub fn with_sizes(encoding_size: usize, output_size: usize) -> Self {
        assert!(encoding_size >= 2, "curves need at least two stops");
        let mut engine = RampEngine {
            red: vec![0.0; encoding_size],
            green: vec![0.0; encoding_size],
            blue: vec![0.0; encoding_size],
            output_size,
            clip_result: true,
        };
        engine.start_over();
        engine
    }

    /// The number of stops on the encoding axis.
    pub fn encoding_size(&self) -> usize {
        self.red.len()
    }

    /// The number of levels on the output axis.
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn red(&self) -> &[f64] {
        &self.red
    }

    pub fn green(&self) -> &[f64] {
        &self.green
    }

    pub fn blue(&self) -> &[f64] {
        &self.blue
    }

    /// Revert all colour curves to identity mappings.
    pub fn start_over(&mut self) {
        let n = self.red.len() - 1;
        for (i, ((r, g), b)) in self
            .red
            .iter_mut()
            .zip(self.green.iter_mut())
            .zip(self.blue.iter_mut())
            .enumerate()
        {
            let v = i as f64 / n as f64;
            *r = v;
            *g = v;
            *b = v;
        }
    }

    /// Snapshot the current adjustments.
    pub fn store(&self) -> CurveState {
        CurveState {
            red: self.red.clone(),
            green: self.green.clone(),
            blue: self.blue.clone(),
        }
    }

    /// Discard the current adjustments and restore a snapshot.
    ///
    /// The snapshot must have the engine's encoding size.
    pub fn restore(&mut self, state: &CurveState) {
        self.red.copy_from_slice(&state.red);
        self.green.copy_from_slice(&state.green);
        self.blue.copy_from_slice(&state.blue);
    }

    fn channels_mut(&mut self) -> [&mut Vec<f64>; 3] {
        [&mut self.red, &mut self.green, &mut self.blue]
    }

    // ═══ sRGB Operators ═══

    /// Apply brightness correction using sRGB: scale each stop.
    pub fn rgb_brightness(&mut self, levels: Channels<f64>) {
        let params = [levels.red, levels.green, levels.blue];
        for (curve, level) in self.channels_mut().into_iter().zip(params) {
            if level != 1.0 {
                for stop in curve.iter_mut() {
                    *stop *= level;
                }
            }
        }
    }

    /// Apply contrast correction using sRGB: scale around the midpoint.
    pub fn rgb_contrast(&mut self, levels: Channels<f64>) {
        let params = [levels.red, levels.green, levels.blue];
        for (curve, level) in self.channels_mut().into_iter().zip(params) {
            if level != 1.0 {
                for stop in curve.iter_mut() {
                    *stop = (*stop - 0.5) * level + 0.5;
                }
            }
        }
    }

    /// Apply gamma correction: `c ← c^(1/level)`.
    pub fn gamma(&mut self, levels: Channels<f64>) {
        let params = [levels.red, levels.green, levels.blue];
        for (curve, level) in self.channels_mut().into_iter().zip(params) {
            if level != 1.0 {
                for stop in curve.iter_mut() {
                    *stop = stop.powf(1.0 / level);
                }
            }
        }
    }

    /// Apply S-curve correction, intended for fine tuning LCD monitors;
    /// 4.5 is a good value to start testing at. Stops whose sigmoid is
    /// undefined (0, 1 and out-of-range values) are left unchanged.
    pub fn sigmoid(&mut self, levels: Channels<Option<f64>>) {
        let params = [levels.red, levels.green, levels.blue];
        for (curve, level) in self.channels_mut().into_iter().zip(params) {
            if let Some(level) = level {
                for stop in curve.iter_mut() {
                    let v = 0.5 - (1.0 / *stop - 1.0).ln() / level;
                    if v.is_finite() {
                        *stop = v;
                    }
                }
            }
        }
    }

    /// Reverse the colour curves (negative image with gamma preservation).
    pub fn negative(&mut self, flags: Channels<bool>) {
        let params = [flags.red, flags.green, flags.blue];
        for (curve, flag) in self.channels_mut().into_iter().zip(params) {
            if flag {
                curve.reverse();
            }
        }
    }

    /// Invert the colour curves (negative image with gamma inversion),
    /// using sRGB: `c ← 1 − c`.
    pub fn rgb_invert(&mut self, flags: Channels<bool>) {
        let params = [flags.red, flags.green, flags.blue];
        for (curve, flag) in self.channels_mut().into_iter().zip(params) {
            if flag {
                for stop in curve.iter_mut() {
                    *stop = 1.0 - *stop;
                }
            }
        }
    }

    /// Change the black point and the white point, using sRGB.
    pub fn rgb_limits(&mut self, limits: Channels<(f64, f64)>) {
        let params = [limits.red, limits.green, limits.blue];
        for (curve, (min, max)) in self.channels_mut().into_iter().zip(params) {
            if min != 0.0 || max != 1.0 {
                for stop in curve.iter_mut() {
                    *stop = *stop * (max - min) + min;
                }
            }
        }
    }

    /// Convert the selected curves from standard RGB to linear RGB.
    pub fn linearise(&mut self, flags: Channels<bool>) {
        let params = [flags.red, flags.green, flags.blue];
        for (curve, flag) in self.channels_mut().into_iter().zip(params) {
            if flag {
                for stop in curve.iter_mut() {
                    *stop = standard_to_linear1(*stop);
                }
            }
        }
    }

    /// Convert the selected curves from linear RGB to standard RGB.
    pub fn standardise(&mut self, flags: Channels<bool>) {
        let params = [flags.red, flags.green, flags.blue];
        for (curve, flag) in self.channels_mut().into_iter().zip(params) {
            if flag {
                for stop in curve.iter_mut() {
                    *stop = linear_to_standard1(*stop);
                }
            }
        }
    }

    /// Manipulate the selected curves with per-channel mapping
    /// functions; `None` leaves a channel untouched.
    pub fn manipulate(&mut self, functions: Channels<Option<&dyn Fn(f64) -> f64>>) {
        let params = [functions.red, functions.green, functions.blue];
        for (curve, function) in self.channels_mut().into_iter().zip(params) {
            if let Some(f) = function {
                for stop in curve.iter_mut() {
                    *stop = f(*stop);
                }
            }
        }
    }

    /// Clip all stops to [0, 1] on the selected channels.
    pub fn clip(&mut self, flags: Channels<bool>) {
        let params = [flags.red, flags.green, flags.blue];
        for (curve, flag) in self.channels_mut().into_iter().zip(params) {
            if flag {
                for stop in curve.iter_mut() {
                    *stop = stop.clamp(0.0, 1.0);
                }
            }
        }
    }

    /// Clip stops below zero on the selected channels.
    pub fn clip_below(&mut self, flags: Channels<bool>) {
        let params = [flags.red, flags.green, flags.blue];
        for (curve, flag) in self.channels_mut().into_iter().zip(params) {
            if flag {
                for stop in curve.iter_mut() {
                    *stop = stop.max(0.0);
                }
            }
        }
    }

    /// Clip stops above one on the selected channels.
    pub fn clip_above(&mut self, flags: Channels<bool>) {
        let params = [flags.red, flags.green, flags.blue];
        for (curve, flag) in self.channels_mut().into_iter().zip(params) {
            if flag {
                for stop in curve.iter_mut() {
                    *stop = stop.min(1.0);
                }
            }
        }
    }

    // ═══ CIE xyY Operators ═══
    // These decompose each stop triple into chromaticity + luminosity,
    // transform Y, and convert back, so hue is preserved.

    fn cie_per_channel(&mut self, transform: impl Fn(f64) -> [Option<f64>; 3]) {
        for i in 0..self.red.len() {
            let (x, y, cap_y) = srgb_to_ciexyy(self.red[i], self.green[i], self.blue[i]);
            let targets = transform(cap_y);
            if let Some(new_y) = targets[0] {
                self.red[i] = ciexyy_to_srgb(x, y, new_y).0;
            }
            if let Some(new_y) = targets[1] {
                self.green[i] = ciexyy_to_srgb(x, y, new_y).1;
            }
            if let Some(new_y) = targets[2] {
                self.blue[i] = ciexyy_to_srgb(x, y, new_y).2;
            }
        }
    }

    /// Apply brightness correction on the luminosity in CIE xyY.
    pub fn cie_brightness(&mut self, levels: Channels<f64>) {
        if levels.red == 1.0 && levels.green == 1.0 && levels.blue == 1.0 {
            return;
        }
        let params = [levels.red, levels.green, levels.blue];
        self.cie_per_channel(|cap_y| params.map(|level| Some(cap_y * level)));
    }

    /// Apply contrast correction on the luminosity in CIE xyY.
    pub fn cie_contrast(&mut self, levels: Channels<f64>) {
        if levels.red == 1.0 && levels.green == 1.0 && levels.blue == 1.0 {
            return;
        }
        let params = [levels.red, levels.green, levels.blue];
        self.cie_per_channel(|cap_y| params.map(|level| Some((cap_y - 0.5) * level + 0.5)));
    }

    /// Invert the luminosity in CIE xyY on the selected channels.
    pub fn cie_invert(&mut self, flags: Channels<bool>) {
        if !(flags.red || flags.green || flags.blue) {
            return;
        }
        let params = [flags.red, flags.green, flags.blue];
        self.cie_per_channel(|cap_y| params.map(|flag| flag.then_some(1.0 - cap_y)));
    }

    /// Change the black point and white point of the luminosity in
    /// CIE xyY.
    pub fn cie_limits(&mut self, limits: Channels<(f64, f64)>) {
        let params = [limits.red, limits.green, limits.blue];
        if params.iter().all(|&(min, max)| min == 0.0 && max == 1.0) {
            return;
        }
        self.cie_per_channel(|cap_y| params.map(|(min, max)| Some(cap_y * (max - min) + min)));
    }

    /// Manipulate the luminosity in CIE xyY with per-channel mapping
    /// functions; `None` leaves a channel untouched.
    pub fn cie_manipulate(&mut self, functions: Channels<Option<&dyn Fn(f64) -> f64>>) {
        if functions.red.is_none() && functions.green.is_none() && functions.blue.is_none() {
            return;
        }
        let params = [functions.red, functions.green, functions.blue];
        self.cie_per_channel(|cap_y| params.map(|f| f.map(|f| f(cap_y))));
    }

    // ═══ Temperature ═══

    /// Change the colour temperature using an sRGB whitepoint scale.
    /// 6500 K (neutral) short-circuits to a no-op for every algorithm.
    pub fn rgb_temperature(&mut self, temperature: f64, algorithm: WhitepointFn) -> Result<()> {
        if temperature == NEUTRAL_TEMPERATURE {
            return Ok(());
        }
        let (r, g, b) = algorithm(temperature)?;
        self.rgb_brightness(Channels::new(r, g, b));
        Ok(())
    }

    /// Change the colour temperature using a CIE xyY whitepoint scale.
    /// 6500 K (neutral) short-circuits to a no-op for every algorithm.
    pub fn cie_temperature(&mut self, temperature: f64, algorithm: WhitepointFn) -> Result<()> {
        if temperature == NEUTRAL_TEMPERATURE {
            return Ok(());
        }
        let (r, g, b) = algorithm(temperature)?;
        self.cie_brightness(Channels::new(r, g, b));
        Ok(())
    }

    // ═══ Resolution and Quantization ═══

    /// Emulate low colour resolution by nearest-neighbour quantization
    /// on the encoding axis (`*_x`) and the output axis (`*_y`).
    /// `None` means the full resolution of the respective axis.
    pub fn lower_resolution(
        &mut self,
        x_counts: Channels<Option<usize>>,
        y_counts: Channels<Option<usize>>,
    ) {
        let i_size = self.red.len();
        let o_size = self.output_size;
        let xs = [x_counts.red, x_counts.green, x_counts.blue].map(|x| x.unwrap_or(i_size));
        let ys = [y_counts.red, y_counts.green, y_counts.blue].map(|y| y.unwrap_or(o_size));
        for ((curve, x_colours), y_colours) in self.channels_mut().into_iter().zip(xs).zip(ys) {
            if x_colours == i_size && y_colours == o_size {
                continue;
            }
            if x_colours < 2 || y_colours < 2 {
                continue;
            }
            let x_max = (x_colours - 1) as f64;
            let y_max = (y_colours - 1) as f64;
            let i_max = (i_size - 1) as f64;
            let mut out = vec![0.0; i_size];
            for (i, slot) in out.iter_mut().enumerate() {
                let x = (i * x_colours / i_size) as f64;
                let x = (x * i_max / x_max) as usize;
                let y = (curve[x] * y_max + 0.5).floor();
                *slot = y / y_max;
            }
            curve.copy_from_slice(&out);
        }
    }

    /// Remap each stop through a lookup curve by nearest neighbour.
    /// This is the application step of ICC tables and `get_gamma`
    /// readbacks.
    pub fn remap(&mut self, red: &[f64], green: &[f64], blue: &[f64]) {
        for (curve, lut) in self.channels_mut().into_iter().zip([red, green, blue]) {
            if lut.is_empty() {
                continue;
            }
            let last = lut.len() - 1;
            for stop in curve.iter_mut() {
                let y = (*stop * last as f64 + 0.5).floor();
                let y = (y.max(0.0) as usize).min(last);
                *stop = lut[y];
            }
        }
    }

    /// Quantize the working curves to the output axis, honouring
    /// `clip_result`.
    pub fn translate_to_integers(&self) -> (Vec<i64>, Vec<i64>, Vec<i64>) {
        let max = (self.output_size - 1) as i64;
        let translate = |curve: &[f64]| {
            curve
                .iter()
                .map(|&stop| {
                    let value = (stop * max as f64 + 0.5).floor() as i64;
                    if self.clip_result {
                        value.clamp(0, max)
                    } else {
                        value
                    }
                })
                .collect()
        };
        (
            translate(&self.red),
            translate(&self.green),
            translate(&self.blue),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    fn assert_identity(engine: &RampEngine) {
        let id = identity(engine.encoding_size());
        for (channel, curve) in [
            ("red", engine.red()),
            ("green", engine.green()),
            ("blue", engine.blue()),
        ] {
            for (a, b) in curve.iter().zip(&id) {
                assert!((a - b).abs() < 1e-9, "{} curve diverged: {} != {}", channel, a, b);
            }
        }
    }

    #[test]
    fn test_identity_operators_leave_identity() {
        let mut engine = RampEngine::new();
        engine.rgb_brightness(Channels::uniform(1.0));
        engine.cie_brightness(Channels::uniform(1.0));
        engine.rgb_contrast(Channels::uniform(1.0));
        engine.cie_contrast(Channels::uniform(1.0));
        engine.gamma(Channels::uniform(1.0));
        engine.sigmoid(Channels::uniform(None));
        engine.rgb_limits(Channels::uniform((0.0, 1.0)));
        engine.cie_limits(Channels::uniform((0.0, 1.0)));
        engine.negative(Channels::uniform(false));
        engine.rgb_invert(Channels::uniform(false));
        engine.cie_invert(Channels::uniform(false));
        let id: &dyn Fn(f64) -> f64 = &|v| v;
        engine.manipulate(Channels::uniform(Some(id)));
        engine.clip(Channels::uniform(true));
        assert_identity(&engine);
    }

    #[test]
    fn test_spread_rule() {
        let c = Channels::spread(2.0, None, None);
        assert_eq!((c.red, c.green, c.blue), (2.0, 2.0, 2.0));
        let c = Channels::spread(1.0, Some(2.0), None);
        // blue follows green, not red
        assert_eq!((c.red, c.green, c.blue), (1.0, 2.0, 2.0));
    }

    #[test]
    fn test_brightness_scales_stops() {
        let mut engine = RampEngine::new();
        engine.rgb_brightness(Channels::new(0.5, 1.0, 1.0));
        assert!((engine.red()[255] - 0.5).abs() < 1e-12);
        assert!((engine.green()[255] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_contrast_midpoint_fixed() {
        let mut engine = RampEngine::with_sizes(257, 65536);
        engine.rgb_contrast(Channels::uniform(2.0));
        // The midpoint stop sits exactly at 0.5 and must not move
        assert!((engine.red()[128] - 0.5).abs() < 1e-12);
        assert!(engine.red()[0] < 0.0 && engine.red()[256] > 1.0);
    }

    #[test]
    fn test_negative_reverses() {
        let mut engine = RampEngine::new();
        engine.negative(Channels::new(true, false, false));
        assert!((engine.red()[0] - 1.0).abs() < 1e-12);
        assert!(engine.red()[255].abs() < 1e-12);
        assert!(engine.green()[0].abs() < 1e-12);
    }

    #[test]
    fn test_invert() {
        let mut engine = RampEngine::new();
        engine.rgb_invert(Channels::uniform(true));
        assert!((engine.blue()[0] - 1.0).abs() < 1e-12);
        assert!(engine.blue()[255].abs() < 1e-12);
    }

    #[test]
    fn test_gamma_known_value() {
        let mut engine = RampEngine::new();
        engine.gamma(Channels::uniform(2.0));
        // c^(1/2) at the 25 % stop
        let i = 255 / 4;
        let expected = (i as f64 / 255.0).sqrt();
        assert!((engine.red()[i] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_sigmoid_corner_cases_unchanged() {
        let mut engine = RampEngine::new();
        engine.sigmoid(Channels::uniform(Some(4.5)));
        // First and last stop have undefined sigmoid and stay identity
        assert!(engine.red()[0].abs() < 1e-12);
        assert!((engine.red()[255] - 1.0).abs() < 1e-12);
        // An interior stop moved
        assert!((engine.red()[64] - 64.0 / 255.0).abs() > 1e-6);
    }

    #[test]
    fn test_limits_affine() {
        let mut engine = RampEngine::new();
        engine.rgb_limits(Channels::uniform((0.1, 0.9)));
        assert!((engine.red()[0] - 0.1).abs() < 1e-12);
        assert!((engine.red()[255] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_linearise_standardise_round_trip() {
        let mut engine = RampEngine::new();
        engine.linearise(Channels::uniform(true));
        engine.standardise(Channels::uniform(true));
        assert_identity(&engine);
    }

    #[test]
    fn test_temperature_neutral_short_circuits() {
        let mut engine = RampEngine::new();
        let mut alg = |_t: f64| -> Result<(f64, f64, f64)> {
            panic!("algorithm must not be invoked for 6500 K");
        };
        engine.rgb_temperature(6500.0, &mut alg).unwrap();
        engine.cie_temperature(6500.0, &mut alg).unwrap();
        assert_identity(&engine);
    }

    #[test]
    fn test_temperature_applies_whitepoint() {
        let mut engine = RampEngine::new();
        let mut alg = |_t: f64| -> Result<(f64, f64, f64)> { Ok((1.0, 0.8, 0.6)) };
        engine.rgb_temperature(3000.0, &mut alg).unwrap();
        assert!((engine.red()[255] - 1.0).abs() < 1e-12);
        assert!((engine.green()[255] - 0.8).abs() < 1e-12);
        assert!((engine.blue()[255] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_lower_resolution() {
        let mut engine = RampEngine::new();
        engine.lower_resolution(
            Channels::uniform(Some(4)),
            Channels::uniform(None),
        );
        // Four encoding buckets: the curve is a staircase of four values
        let mut distinct: Vec<u64> = engine.red().iter().map(|v| v.to_bits()).collect();
        distinct.dedup();
        assert_eq!(distinct.len(), 4);
    }

    #[test]
    fn test_remap_nearest_neighbour() {
        let mut engine = RampEngine::new();
        let inverted: Vec<f64> = identity(256).into_iter().rev().collect();
        engine.remap(&inverted, &inverted, &inverted);
        assert!((engine.red()[0] - 1.0).abs() < 1e-12);
        assert!(engine.red()[255].abs() < 1e-12);
    }

    #[test]
    fn test_translate_to_integers_clips() {
        let mut engine = RampEngine::new();
        engine.rgb_brightness(Channels::uniform(2.0));
        let (r, _, _) = engine.translate_to_integers();
        assert_eq!(r[255], 65535);
        engine.clip_result = false;
        let (r, _, _) = engine.translate_to_integers();
        assert!(r[255] > 65535);
    }

    #[test]
    fn test_store_restore() {
        let mut engine = RampEngine::new();
        let saved = engine.store();
        engine.rgb_invert(Channels::uniform(true));
        engine.restore(&saved);
        assert_identity(&engine);
    }

    #[test]
    fn test_cie_brightness_scales_luminosity() {
        let mut engine = RampEngine::new();
        engine.cie_brightness(Channels::uniform(0.5));
        // Luminosity halves, so every channel value drops
        assert!(engine.red()[255] < 1.0);
        assert!(engine.red()[128] < 128.0 / 255.0);
        // Greyscale input stays greyscale (hue preserved)
        assert!((engine.red()[128] - engine.green()[128]).abs() < 1e-9);
        assert!((engine.green()[128] - engine.blue()[128]).abs() < 1e-9);
    }
}
