//! Colour space conversions and colour comparison.
//!
//! All conversions are pure and round-trip correct to machine epsilon
//! over the sRGB gamut. Channel triples are plain `(f64, f64, f64)`
//! tuples in the order the space defines (r, g, b), (x, y, Y),
//! (X, Y, Z) or (L*, a*, b*).

/// Piecewise threshold below which sRGB encoding is linear.
const SRGB_LINEAR_THRESHOLD: f64 = 0.0031308;
/// Piecewise threshold below which sRGB decoding is linear.
const SRGB_STANDARD_THRESHOLD: f64 = 0.04045;
const SRGB_SLOPE: f64 = 12.92;
const SRGB_OFFSET: f64 = 0.055;
const SRGB_GAMMA: f64 = 2.4;

/// Row-major matrix converting linear RGB to CIE XYZ.
const LINEAR_TO_CIEXYZ: [[f64; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

/// Row-major matrix converting CIE XYZ to linear RGB.
const CIEXYZ_TO_LINEAR: [[f64; 3]; 3] = [
    [3.240450, -1.537140, -0.4985320],
    [-0.969266, 1.876010, 0.0415561],
    [0.0556434, -0.204026, 1.0572300],
];

/// The CIE xyY chromaticity sRGB black maps to.
pub const SRGB_BLACK_POINT: (f64, f64, f64) = (0.312857, 0.328993, 0.0);

/// L*a*b* linearity breakpoint for the `f` helper.
const CIELAB_EPSILON: f64 = 0.00885642;

/// Convert one [0, 1] linear RGB component to [0, 1] sRGB.
pub fn linear_to_standard1(c: f64) -> f64 {
    if c <= SRGB_LINEAR_THRESHOLD {
        SRGB_SLOPE * c
    } else {
        (1.0 + SRGB_OFFSET) * c.powf(1.0 / SRGB_GAMMA) - SRGB_OFFSET
    }
}

/// Convert one [0, 1] sRGB component to [0, 1] linear RGB.
pub fn standard_to_linear1(c: f64) -> f64 {
    if c <= SRGB_STANDARD_THRESHOLD {
        c / SRGB_SLOPE
    } else {
        ((c + SRGB_OFFSET) / (1.0 + SRGB_OFFSET)).powf(SRGB_GAMMA)
    }
}

/// Convert [0, 1] linear RGB to [0, 1] sRGB.
pub fn linear_to_standard(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    (linear_to_standard1(r), linear_to_standard1(g), linear_to_standard1(b))
}

/// Convert [0, 1] sRGB to [0, 1] linear RGB.
pub fn standard_to_linear(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    (standard_to_linear1(r), standard_to_linear1(g), standard_to_linear1(b))
}

/// Convert CIE xyY to CIE XYZ.
///
/// When `y` is zero the projection is degenerate and the Y value is
/// carried through unscaled.
pub fn ciexyy_to_ciexyz(x: f64, y: f64, cap_y: f64) -> (f64, f64, f64) {
    if y == 0.0 {
        (cap_y, cap_y, cap_y)
    } else {
        (cap_y * x / y, cap_y, cap_y * (1.0 - x - y) / y)
    }
}

/// Convert CIE XYZ to CIE xyY. The zero vector maps to (0, 0, 0).
pub fn ciexyz_to_ciexyy(cap_x: f64, cap_y: f64, cap_z: f64) -> (f64, f64, f64) {
    let s = cap_x + cap_y + cap_z;
    if s == 0.0 {
        (0.0, 0.0, 0.0)
    } else {
        (cap_x / s, cap_y / s, cap_y)
    }
}

fn matrix_mul_vector(matrix: &[[f64; 3]; 3], vector: (f64, f64, f64)) -> (f64, f64, f64) {
    let (a, b, c) = vector;
    let row = |r: &[f64; 3]| r[0] * a + r[1] * b + r[2] * c;
    (row(&matrix[0]), row(&matrix[1]), row(&matrix[2]))
}

/// Convert CIE XYZ to [0, 1] linear RGB.
pub fn ciexyz_to_linear(cap_x: f64, cap_y: f64, cap_z: f64) -> (f64, f64, f64) {
    matrix_mul_vector(&CIEXYZ_TO_LINEAR, (cap_x, cap_y, cap_z))
}

/// Convert [0, 1] linear RGB to CIE XYZ.
pub fn linear_to_ciexyz(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    matrix_mul_vector(&LINEAR_TO_CIEXYZ, (r, g, b))
}

/// Convert [0, 1] sRGB to CIE xyY.
///
/// Black has no well-defined chromaticity; it maps to the D65-ish
/// white point chromaticity with zero luminosity.
pub fn srgb_to_ciexyy(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    if r == 0.0 && g == 0.0 && b == 0.0 {
        return SRGB_BLACK_POINT;
    }
    let (lr, lg, lb) = standard_to_linear(r, g, b);
    let (cap_x, cap_y, cap_z) = linear_to_ciexyz(lr, lg, lb);
    ciexyz_to_ciexyy(cap_x, cap_y, cap_z)
}

/// Convert CIE xyY to [0, 1] sRGB.
pub fn ciexyy_to_srgb(x: f64, y: f64, cap_y: f64) -> (f64, f64, f64) {
    let (cap_x, cap_y_, cap_z) = ciexyy_to_ciexyz(x, y, cap_y);
    let (lr, lg, lb) = ciexyz_to_linear(cap_x, cap_y_, cap_z);
    linear_to_standard(lr, lg, lb)
}

fn cielab_f(t: f64) -> f64 {
    if t > CIELAB_EPSILON {
        t.cbrt()
    } else {
        (7.78 + 703.0 / 99900.0) * t + 0.1379310
    }
}

fn cielab_f_inv(t: f64) -> f64 {
    let cube = t * t * t;
    if cube > CIELAB_EPSILON {
        cube
    } else {
        (t - 0.1379310) / (7.78 + 703.0 / 99900.0)
    }
}

/// Convert CIE XYZ to CIE L*a*b*.
pub fn ciexyz_to_cielab(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let x = x / 0.95047;
    let z = z / 1.08883;
    let l = 116.0 * cielab_f(y) - 16.0;
    let a = 500.0 * (cielab_f(x) - cielab_f(y));
    let b = 200.0 * (cielab_f(y) - cielab_f(z));
    (l, a, b)
}

/// Convert CIE L*a*b* to CIE XYZ.
pub fn cielab_to_ciexyz(l: f64, a: f64, b: f64) -> (f64, f64, f64) {
    let y = (l + 16.0) / 116.0;
    let x = a / 500.0 + y;
    let z = y - b / 200.0;
    (
        cielab_f_inv(x) * 0.95047,
        cielab_f_inv(y),
        cielab_f_inv(z) * 1.08883,
    )
}

/// The ΔE*_ab distance between two [0, 1] sRGB colours: the Euclidean
/// distance between them in CIE L*a*b*.
pub fn delta_e(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    let to_lab = |(r, g, bl): (f64, f64, f64)| {
        let (lr, lg, lb) = standard_to_linear(r, g, bl);
        let (x, y, z) = linear_to_ciexyz(lr, lg, lb);
        ciexyz_to_cielab(x, y, z)
    };
    let (l1, a1, b1) = to_lab(a);
    let (l2, a2, b2) = to_lab(b);
    ((l1 - l2).powi(2) + (a1 - a2).powi(2) + (b1 - b2).powi(2)).sqrt()
}
