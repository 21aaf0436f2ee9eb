//! Ramp interpolation for coercing curves between sizes.
//!
//! Scaling a ramp up uses one of four methods; scaling down always uses
//! the linear formula, which is well defined in both directions. The
//! cubic and polynomial methods can overshoot between reference stops
//! (haloing); `eliminate_halos` replaces any sub-range that broke local
//! monotonicity with the linear interpolant.

/// Method used to resize gamma ramps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Interpolation {
    /// Piecewise linear.
    Linear,
    /// Cubic Hermite spline with a [0, 1] tension; haloing is
    /// eliminated afterwards.
    Cubic { tension: f64 },
    /// Monotone cubic Hermite spline (Fritsch–Carlson); never halos.
    MonotoneCubic { tension: f64 },
    /// Polynomial (Vandermonde) interpolation, for small ramps only;
    /// haloing is eliminated afterwards.
    Polynomial,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Linear
    }
}

impl Interpolation {
    /// Resize one ramp to `size` stops.
    pub fn resize(&self, ramp: &[f64], size: usize) -> Vec<f64> {
        if ramp.len() == size {
            return ramp.to_vec();
        }
        if size < ramp.len() || ramp.len() < 2 {
            // Decimation (and degenerate inputs) use the linear formula
            return linear_resize(ramp, size);
        }
        match *self {
            Interpolation::Linear => linear_resize(ramp, size),
            Interpolation::Cubic { tension } => {
                let mut out = cubic_resize(ramp, size, tension);
                eliminate_halos(ramp, &mut out);
                out
            }
            Interpolation::MonotoneCubic { tension } => monotone_cubic_resize(ramp, size, tension),
            Interpolation::Polynomial => {
                let mut out = polynomial_resize(ramp, size);
                eliminate_halos(ramp, &mut out);
                out
            }
        }
    }

    /// Resize a ramp triple to per-channel sizes.
    pub fn resize_triple(
        &self,
        red: &[f64],
        green: &[f64],
        blue: &[f64],
        sizes: (usize, usize, usize),
    ) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        (
            self.resize(red, sizes.0),
            self.resize(green, sizes.1),
            self.resize(blue, sizes.2),
        )
    }
}

/// Linearly interpolate a ramp to an arbitrary size.
pub fn linear_resize(ramp: &[f64], size: usize) -> Vec<f64> {
    if ramp.is_empty() || size == 0 {
        return vec![0.0; size];
    }
    if ramp.len() == 1 || size == 1 {
        return vec![ramp[0]; size];
    }
    let orig_max = ramp.len() - 1;
    let out_max = size - 1;
    (0..size)
        .map(|i| {
            let j = i as f64 * orig_max as f64 / out_max as f64;
            let floor = j.floor() as usize;
            let w = j - floor as f64;
            let ceil = (floor + 1).min(orig_max);
            ramp[floor] * (1.0 - w) + ramp[ceil] * w
        })
        .collect()
}

// Hermite basis functions (h00 is implicit in the evaluation form)
fn h10(t: f64) -> f64 {
    t * (1.0 - t) * (1.0 - t)
}
fn h01(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}
fn h11(t: f64) -> f64 {
    t * t * (t - 1.0)
}

/// One-sided difference at the ends, centred difference inside.
fn tangent(values: &[f64], index: usize) -> f64 {
    let last = values.len() - 1;
    if last == 0 {
        0.0
    } else if index == 0 {
        values[1] - values[0]
    } else if index == last {
        values[last] - values[last - 1]
    } else {
        (values[index + 1] - values[index - 1]) / 2.0
    }
}

fn hermite_eval(ramp: &[f64], tangents: &[f64], size: usize, tension: f64) -> Vec<f64> {
    let small_max = ramp.len() - 1;
    let large_max = size - 1;
    let c = 1.0 - tension;
    (0..size)
        .map(|i| {
            let j = i as f64 * small_max as f64 / large_max as f64;
            let floor = j.floor() as usize;
            let w = j - floor as f64;
            let ceil = (floor + 1).min(small_max);
            let pj = ramp[floor];
            let pk = ramp[ceil];
            let mj = c * tangents[floor];
            let mk = c * tangents[ceil];
            pj + h10(w) * mj + h01(w) * (pk - pj) + h11(w) * mk
        })
        .collect()
}

/// Interpolate a ramp with a cubic Hermite spline.
pub fn cubic_resize(ramp: &[f64], size: usize, tension: f64) -> Vec<f64> {
    let tangents: Vec<f64> = (0..ramp.len()).map(|i| tangent(ramp, i)).collect();
    hermite_eval(ramp, &tangents, size, tension)
}

/// Interpolate a ramp with a monotone cubic Hermite spline using the
/// Fritsch–Carlson method. Does not overshoot.
pub fn monotone_cubic_resize(ramp: &[f64], size: usize, tension: f64) -> Vec<f64> {
    let last = ramp.len() - 1;
    // Secant slopes between successive stops
    let ds: Vec<f64> = (0..last).map(|i| ramp[i + 1] - ramp[i]).collect();
    // Initial tangents: averaged secants
    let mut ms: Vec<f64> = (0..=last)
        .map(|i| {
            if i == 0 {
                ds[0]
            } else if i == last {
                ds[last - 1]
            } else {
                (ds[i - 1] + ds[i]) / 2.0
            }
        })
        .collect();
    for i in 0..last {
        if ds[i] == 0.0 {
            // Flat segment: both bracketing tangents must be zero to
            // preserve monotonicity
            ms[i] = 0.0;
            ms[i + 1] = 0.0;
            continue;
        }
        let alpha = ms[i] / ds[i];
        let beta = ms[i + 1] / ds[i];
        if alpha < 0.0 {
            // Local extremum on the left edge
            ms[i] = 0.0;
        } else if beta < 0.0 {
            ms[i + 1] = 0.0;
        } else if alpha * alpha + beta * beta > 9.0 {
            // Restrict the (α, β) vector to a circle of radius 3
            let tau = 3.0 / (alpha * alpha + beta * beta).sqrt();
            ms[i] = tau * alpha * ds[i];
            ms[i + 1] = tau * beta * ds[i];
        }
    }
    hermite_eval(ramp, &ms, size, tension)
}

/// Interpolate a ramp with the polynomial through all its stops,
/// solving the Vandermonde system by Gaussian elimination. Only
/// sensible for small ramps.
pub fn polynomial_resize(ramp: &[f64], size: usize) -> Vec<f64> {
    let n = ramp.len();
    let small_max = (n - 1) as f64;
    // Vandermonde matrix over x_k = k / (n - 1), augmented with y_k
    let mut m: Vec<Vec<f64>> = (0..n)
        .map(|k| {
            let x = k as f64 / small_max;
            let mut row: Vec<f64> = (0..n).map(|i| x.powi(i as i32)).collect();
            row.push(ramp[k]);
            row
        })
        .collect();
    // Forward elimination with partial pivoting
    for k in 0..n {
        let pivot = (k..n)
            .max_by(|&a, &b| m[a][k].abs().total_cmp(&m[b][k].abs()))
            .unwrap_or(k);
        m.swap(k, pivot);
        let pivot_value = m[k][k];
        if pivot_value == 0.0 {
            continue;
        }
        for i in (k + 1)..n {
            let factor = m[i][k] / pivot_value;
            for j in k..=n {
                m[i][j] -= m[k][j] * factor;
            }
        }
    }
    // Back substitution
    let mut coefficients = vec![0.0; n];
    for k in (0..n).rev() {
        let mut acc = m[k][n];
        for j in (k + 1)..n {
            acc -= m[k][j] * coefficients[j];
        }
        coefficients[k] = if m[k][k] == 0.0 { 0.0 } else { acc / m[k][k] };
    }
    let large_max = (size - 1) as f64;
    (0..size)
        .map(|i| {
            let x = i as f64 / large_max;
            // Horner evaluation
            coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
        })
        .collect()
}

/// Eliminate haloing effects in an interpolation.
///
/// For every interval of the small curve: a flat interval must be flat
/// in the interpolation, an increasing interval must increase strictly,
/// a decreasing one decrease strictly. A violating sub-range is
/// replaced with the linear interpolant.
pub fn eliminate_halos(small: &[f64], large: &mut [f64]) {
    let small_max = small.len() - 1;
    let large_max = large.len() - 1;
    let mut linear: Option<Vec<f64>> = None;
    for i in 0..small_max {
        let (y1, y2) = (small[i], small[i + 1]);
        let x1 = i * large_max / small_max;
        let x2 = (i + 1) * large_max / small_max;
        if y2 == y1 {
            // Flat part: force it flat without checking first
            for value in &mut large[x1..=x2] {
                *value = y1;
            }
            continue;
        }
        let big1 = large[x1];
        let big2 = large[x2];
        let monotone = if y2 > y1 {
            big2 > big1 && large[x1..=x2].windows(2).all(|w| w[1] >= w[0])
        } else {
            big2 < big1 && large[x1..=x2].windows(2).all(|w| w[1] <= w[0])
        };
        if !monotone {
            let linear = linear.get_or_insert_with(|| linear_resize(small, large.len()));
            large[x1..=x2].copy_from_slice(&linear[x1..=x2]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    fn assert_identity(ramp: &[f64], eps: f64) {
        let id = identity(ramp.len());
        for (a, b) in ramp.iter().zip(&id) {
            assert!((a - b).abs() < eps, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_linear_identity_preserved() {
        for &(from, to) in &[(16, 256), (256, 65536), (256, 17), (7, 1000)] {
            let out = Interpolation::Linear.resize(&identity(from), to);
            assert_eq!(out.len(), to);
            assert_identity(&out, 1e-9);
        }
    }

    #[test]
    fn test_cubic_identity_preserved() {
        let out = Interpolation::Cubic { tension: 0.0 }.resize(&identity(16), 256);
        assert_identity(&out, 1e-9);
    }

    #[test]
    fn test_monotone_cubic_identity_preserved() {
        let out = Interpolation::MonotoneCubic { tension: 0.0 }.resize(&identity(16), 256);
        assert_identity(&out, 1e-9);
    }

    #[test]
    fn test_polynomial_identity_preserved() {
        let out = Interpolation::Polynomial.resize(&identity(8), 64);
        assert_identity(&out, 1e-6);
    }

    #[test]
    fn test_equal_size_is_copy() {
        let ramp = vec![0.0, 0.3, 0.1, 1.0];
        assert_eq!(Interpolation::Cubic { tension: 0.5 }.resize(&ramp, 4), ramp);
    }

    #[test]
    fn test_monotone_cubic_never_halos() {
        // A steep monotone staircase that makes plain cubic overshoot
        let ramp = vec![0.0, 0.0, 0.05, 0.95, 1.0, 1.0];
        let out = monotone_cubic_resize(&ramp, 256, 0.0);
        for w in out.windows(2) {
            assert!(w[1] >= w[0] - 1e-12, "not monotone: {} then {}", w[0], w[1]);
        }
    }

    #[test]
    fn test_halo_elimination_restores_monotonicity() {
        let ramp = vec![0.0, 0.0, 0.05, 0.95, 1.0, 1.0];
        let out = Interpolation::Cubic { tension: 0.0 }.resize(&ramp, 251);
        for w in out.windows(2) {
            assert!(w[1] >= w[0] - 1e-12, "halo survived: {} then {}", w[0], w[1]);
        }
    }

    #[test]
    fn test_flat_intervals_stay_flat() {
        let ramp = vec![0.2, 0.2, 0.8, 0.8];
        let out = Interpolation::Cubic { tension: 0.0 }.resize(&ramp, 301);
        assert!((out[0] - 0.2).abs() < 1e-12);
        assert!((out[100] - 0.2).abs() < 1e-12);
        assert!((out[200] - 0.8).abs() < 1e-12);
        assert!((out[300] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_decimation_endpoints() {
        let out = Interpolation::MonotoneCubic { tension: 0.0 }.resize(&identity(1000), 16);
        assert_eq!(out.len(), 16);
        assert!(out[0].abs() < 1e-12);
        assert!((out[15] - 1.0).abs() < 1e-12);
    }
}
