//! Solar position calculation and prediction.
//!
//! Everything here works in Julian centuries (36525 days since the
//! J2000 epoch) internally; conversion helpers to and from POSIX time
//! and Julian days are provided. Latitudes are degrees northwards from
//! the equator, longitudes degrees eastwards from Greenwich, negative
//! for the opposite direction.

use crate::constants::{DEFAULT_SUN_HIGH, DEFAULT_SUN_LOW};

/// Maximum bisection refinements in a prediction search.
const PREDICTION_MAX_ITERATIONS: u32 = 1000;
/// Default search span, in Julian centuries (~ a year).
const PREDICTION_DEFAULT_SPAN: f64 = 0.01;

// ═══ Time Base ═══

/// Convert a Julian Day timestamp to a POSIX timestamp.
pub fn julian_day_to_epoch(t: f64) -> f64 {
    (t - 2440587.5) * 86400.0
}

/// Convert a POSIX timestamp to a Julian Day timestamp.
pub fn epoch_to_julian_day(t: f64) -> f64 {
    t / 86400.0 + 2440587.5
}

/// Convert a Julian Day timestamp to Julian centuries since J2000.
pub fn julian_day_to_julian_centuries(t: f64) -> f64 {
    (t - 2451545.0) / 36525.0
}

/// Convert Julian centuries since J2000 to a Julian Day timestamp.
pub fn julian_centuries_to_julian_day(t: f64) -> f64 {
    t * 36525.0 + 2451545.0
}

/// Convert a POSIX timestamp to Julian centuries since J2000.
pub fn epoch_to_julian_centuries(t: f64) -> f64 {
    julian_day_to_julian_centuries(epoch_to_julian_day(t))
}

/// Convert Julian centuries since J2000 to a POSIX timestamp.
pub fn julian_centuries_to_epoch(t: f64) -> f64 {
    julian_day_to_epoch(julian_centuries_to_julian_day(t))
}

/// The current POSIX time.
pub fn epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// The current Julian Day time.
pub fn julian_day() -> f64 {
    epoch_to_julian_day(epoch())
}

/// The current Julian centuries time.
pub fn julian_centuries() -> f64 {
    epoch_to_julian_centuries(epoch())
}

// ═══ Solar Geometry ═══

/// The Sun's geometric mean longitude, in radians.
///
/// Normalised to be non-negative even for times before the J2000
/// epoch, where the modulo would otherwise take the sign of `t`.
pub fn sun_geometric_mean_longitude(t: f64) -> f64 {
    ((0.0003032 * t * t + 36000.76983 * t + 280.46646).rem_euclid(360.0)).to_radians()
}

/// The Sun's geometric mean anomaly, in radians.
pub fn sun_geometric_mean_anomaly(t: f64) -> f64 {
    (-0.0001537 * t * t + 35999.05029 * t + 357.52911).to_radians()
}

/// The Earth's orbit eccentricity.
pub fn earth_orbit_eccentricity(t: f64) -> f64 {
    -0.0000001267 * t * t - 0.000042037 * t + 0.016708634
}

/// The Sun's equation of the centre, the difference between the true
/// anomaly and the mean anomaly, in radians.
pub fn sun_equation_of_centre(t: f64) -> f64 {
    let a = sun_geometric_mean_anomaly(t);
    let rc = a.sin() * (-0.000014 * t * t - 0.004817 * t + 1.914602)
        + (2.0 * a).sin() * (-0.000101 * t + 0.019993)
        + (3.0 * a).sin() * 0.000289;
    rc.to_radians()
}

/// The Sun's real longitudinal position, in radians.
pub fn sun_real_longitude(t: f64) -> f64 {
    sun_geometric_mean_longitude(t) + sun_equation_of_centre(t)
}

/// The Sun's apparent longitudinal position, in radians.
pub fn sun_apparent_longitude(t: f64) -> f64 {
    let rc = sun_real_longitude(t).to_degrees() - 0.00569
        - 0.00478 * (-1934.136 * t + 125.04).to_radians().sin();
    rc.to_radians()
}

/// The mean ecliptic obliquity of the Sun's apparent motion without
/// variation correction, in radians.
pub fn mean_ecliptic_obliquity(t: f64) -> f64 {
    let seconds = 0.001813 * t * t * t - 0.00059 * t * t - 46.815 * t + 21.448;
    (23.0 + (26.0 + seconds / 60.0) / 60.0).to_radians()
}

/// The mean ecliptic obliquity with variation correction, in radians.
pub fn corrected_mean_ecliptic_obliquity(t: f64) -> f64 {
    let correction = 0.00256 * (-1934.136 * t + 125.04).to_radians().cos();
    (correction + mean_ecliptic_obliquity(t).to_degrees()).to_radians()
}

/// The Sun's declination, in radians.
pub fn solar_declination(t: f64) -> f64 {
    (corrected_mean_ecliptic_obliquity(t).sin() * sun_apparent_longitude(t).sin()).asin()
}

/// The equation of time: the discrepancy between apparent and mean
/// solar time, in degrees.
pub fn equation_of_time(t: f64) -> f64 {
    let l = sun_geometric_mean_longitude(t);
    let e = earth_orbit_eccentricity(t);
    let m = sun_geometric_mean_anomaly(t);
    let y = (corrected_mean_ecliptic_obliquity(t) / 2.0).tan().powi(2);
    let rc = y * (2.0 * l).sin() + (4.0 * y * (2.0 * l).cos() - 2.0) * e * m.sin()
        - 0.5 * y * y * (4.0 * l).sin()
        - 1.25 * e * e * (2.0 * m).sin();
    4.0 * rc.to_degrees()
}

/// The solar hour angle for a given solar elevation, in radians.
/// Zero elevation maps to a zero hour angle.
pub fn hour_angle_from_elevation(latitude: f64, declination: f64, elevation: f64) -> f64 {
    if elevation == 0.0 {
        return 0.0;
    }
    let rc = (elevation.abs().cos() - latitude.to_radians().sin() * declination.sin())
        / (latitude.to_radians().cos() * declination.cos());
    let rc = rc.acos();
    if (rc < 0.0) == (elevation < 0.0) {
        -rc
    } else {
        rc
    }
}

/// The Sun's elevation for a given solar hour angle, in radians.
pub fn elevation_from_hour_angle(latitude: f64, declination: f64, hour_angle: f64) -> f64 {
    (latitude.to_radians().cos() * hour_angle.cos() * declination.cos()
        + latitude.to_radians().sin() * declination.sin())
    .asin()
}

/// The Sun's elevation as apparent from a geographical position, in
/// radians.
pub fn solar_elevation_from_time(t: f64, latitude: f64, longitude: f64) -> f64 {
    let jd = julian_centuries_to_julian_day(t);
    let day_offset_minutes = (jd - ((jd + 0.5).floor()) - 0.5) * 1440.0;
    let true_solar_minutes = 720.0 - day_offset_minutes - equation_of_time(t);
    let hour_angle = (true_solar_minutes / 4.0 - longitude).to_radians();
    elevation_from_hour_angle(latitude, solar_declination(t), hour_angle)
}

/// The Sun's elevation as apparent from a geographical position, in
/// degrees, at time `t` in Julian centuries.
pub fn solar_elevation_at(latitude: f64, longitude: f64, t: f64) -> f64 {
    solar_elevation_from_time(t, latitude, longitude).to_degrees()
}

/// The Sun's elevation right now, in degrees.
pub fn solar_elevation(latitude: f64, longitude: f64) -> f64 {
    solar_elevation_at(latitude, longitude, julian_centuries())
}

// ═══ Visibility ═══

/// The visibility of the Sun at time `t` in Julian centuries: 0 during
/// the night, 1 during the day, proportionally in between during
/// twilight. `low` is the highest elevation of 100 % night, `high` the
/// lowest elevation of 100 % day, both in degrees.
pub fn sun_at(latitude: f64, longitude: f64, t: f64, low: f64, high: f64) -> f64 {
    let elevation = solar_elevation_at(latitude, longitude, t);
    ((elevation - low) / (high - low)).clamp(0.0, 1.0)
}

/// The visibility of the Sun right now, with the default civil-dusk to
/// low-morning band (−6° to +3°).
pub fn sun(latitude: f64, longitude: f64) -> f64 {
    sun_at(latitude, longitude, julian_centuries(), DEFAULT_SUN_LOW, DEFAULT_SUN_HIGH)
}

// ═══ Prediction Search ═══

/// Search for the time a monotone-enough quantity crosses a target.
///
/// Starting at `t`, walk in steps of `delta` (negative to search the
/// past) until the sign of `f(t) − target` changes, then refine by
/// bisection with tolerance `epsilon`. Gives up once the walk exceeds
/// `span` Julian centuries, returning `None`.
pub fn solar_prediction(
    t: f64,
    delta: f64,
    target: f64,
    epsilon: f64,
    span: f64,
    f: impl Fn(f64) -> f64,
) -> Option<f64> {
    let mut t1 = t;
    let mut v1 = f(t1) - target;
    loop {
        let t2 = t1 + delta;
        if (t2 - t).abs() > span {
            return None;
        }
        let v2 = f(t2) - target;
        if v1 == 0.0 {
            return Some(t1);
        }
        if (v1 < 0.0) != (v2 < 0.0) {
            // Bracketed: bisect
            let (mut lo, mut hi) = (t1, t2);
            let mut v_lo = v1;
            for _ in 0..PREDICTION_MAX_ITERATIONS {
                let mid = (lo + hi) / 2.0;
                let v_mid = f(mid) - target;
                if v_mid.abs() < epsilon {
                    return Some(mid);
                }
                if (v_mid < 0.0) == (v_lo < 0.0) {
                    lo = mid;
                    v_lo = v_mid;
                } else {
                    hi = mid;
                }
            }
            return Some((lo + hi) / 2.0);
        }
        t1 = t2;
        v1 = v2;
    }
}

const EQUINOX_STEP: f64 = PREDICTION_DEFAULT_SPAN / 2000.0;
const PREDICTION_EPSILON: f64 = 0.000001;

/// The time, in Julian centuries, of the next equinox after `t`
/// (the declination's next zero crossing).
pub fn future_equinox(t: f64) -> Option<f64> {
    solar_prediction(t, EQUINOX_STEP, 0.0, PREDICTION_EPSILON, PREDICTION_DEFAULT_SPAN, solar_declination)
}

/// The time, in Julian centuries, of the last equinox before `t`.
pub fn past_equinox(t: f64) -> Option<f64> {
    solar_prediction(t, -EQUINOX_STEP, 0.0, PREDICTION_EPSILON, PREDICTION_DEFAULT_SPAN, solar_declination)
}

/// Central-difference derivative of the declination.
fn declination_derivative(t: f64) -> f64 {
    (solar_declination(t + EQUINOX_STEP) - solar_declination(t - EQUINOX_STEP)) / (2.0 * EQUINOX_STEP)
}

/// The time, in Julian centuries, of the next solstice after `t`
/// (where the declination's derivative crosses zero).
pub fn future_solstice(t: f64) -> Option<f64> {
    solar_prediction(t, EQUINOX_STEP, 0.0, PREDICTION_EPSILON, PREDICTION_DEFAULT_SPAN, declination_derivative)
}

/// The time, in Julian centuries, of the last solstice before `t`.
pub fn past_solstice(t: f64) -> Option<f64> {
    solar_prediction(t, -EQUINOX_STEP, 0.0, PREDICTION_EPSILON, PREDICTION_DEFAULT_SPAN, declination_derivative)
}

/// The step used when walking for elevation events: one minute of
/// Julian-century time.
const ELEVATION_STEP: f64 = 1.0 / (36525.0 * 1440.0);

/// Elevation events recur daily, so their searches span two days
/// rather than a year.
const ELEVATION_SPAN: f64 = 2.0 / 36525.0;

/// The next time after `t` the Sun reaches `elevation` degrees.
pub fn future_elevation(latitude: f64, longitude: f64, elevation: f64, t: f64) -> Option<f64> {
    solar_prediction(t, ELEVATION_STEP * 10.0, elevation, PREDICTION_EPSILON, ELEVATION_SPAN, |t| {
        solar_elevation_at(latitude, longitude, t)
    })
}

/// The last time before `t` the Sun was at `elevation` degrees.
pub fn past_elevation(latitude: f64, longitude: f64, elevation: f64, t: f64) -> Option<f64> {
    solar_prediction(t, -ELEVATION_STEP * 10.0, elevation, PREDICTION_EPSILON, ELEVATION_SPAN, |t| {
        solar_elevation_at(latitude, longitude, t)
    })
}

/// The next time after `t` the Sun's elevation changes at `derivative`
/// degrees per Julian century.
pub fn future_elevation_derivative(latitude: f64, longitude: f64, derivative: f64, t: f64) -> Option<f64> {
    solar_prediction(t, ELEVATION_STEP * 10.0, derivative, PREDICTION_EPSILON, ELEVATION_SPAN, |t| {
        let h = ELEVATION_STEP;
        (solar_elevation_at(latitude, longitude, t + h) - solar_elevation_at(latitude, longitude, t - h)) / (2.0 * h)
    })
}

/// The last time before `t` the Sun's elevation changed at
/// `derivative` degrees per Julian century.
pub fn past_elevation_derivative(latitude: f64, longitude: f64, derivative: f64, t: f64) -> Option<f64> {
    solar_prediction(t, -ELEVATION_STEP * 10.0, derivative, PREDICTION_EPSILON, ELEVATION_SPAN, |t| {
        let h = ELEVATION_STEP;
        (solar_elevation_at(latitude, longitude, t + h) - solar_elevation_at(latitude, longitude, t - h)) / (2.0 * h)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-20 12:00:00 UTC, close to the March equinox
    const EQUINOX_NOON_EPOCH: f64 = 1710936000.0;

    #[test]
    fn test_time_base_round_trips() {
        for &t in &[0.0, 1e9, EQUINOX_NOON_EPOCH] {
            let jc = epoch_to_julian_centuries(t);
            assert!((julian_centuries_to_epoch(jc) - t).abs() < 1e-3);
            let jd = epoch_to_julian_day(t);
            assert!((julian_day_to_epoch(jd) - t).abs() < 1e-3);
        }
    }

    #[test]
    fn test_j2000_epoch() {
        // 2000-01-01 12:00:00 UTC is JD 2451545, i.e. zero centuries
        let jc = epoch_to_julian_centuries(946728000.0);
        assert!(jc.abs() < 1e-9);
    }

    #[test]
    fn test_geometric_mean_longitude_non_negative_before_2000() {
        // 1990-01-01, a negative Julian-century time
        let t = epoch_to_julian_centuries(631152000.0);
        assert!(t < 0.0);
        let l = sun_geometric_mean_longitude(t);
        assert!((0.0..=2.0 * std::f64::consts::PI).contains(&l));
    }

    #[test]
    fn test_equator_equinox_noon_elevation() {
        let t = epoch_to_julian_centuries(EQUINOX_NOON_EPOCH);
        let elevation = solar_elevation_at(0.0, 0.0, t);
        // At local noon on the equator at equinox the Sun is near zenith
        assert!(elevation > 85.0, "elevation was {}", elevation);
    }

    #[test]
    fn test_sun_clamps() {
        let t = epoch_to_julian_centuries(EQUINOX_NOON_EPOCH);
        assert_eq!(sun_at(0.0, 0.0, t, -6.0, 3.0), 1.0);
        // Twelve hours later it is deep night at the same meridian
        let t_night = epoch_to_julian_centuries(EQUINOX_NOON_EPOCH + 43200.0);
        assert_eq!(sun_at(0.0, 0.0, t_night, -6.0, 3.0), 0.0);
    }

    #[test]
    fn test_declination_small_at_equinox() {
        let t = epoch_to_julian_centuries(EQUINOX_NOON_EPOCH);
        assert!(solar_declination(t).to_degrees().abs() < 1.0);
    }

    #[test]
    fn test_equinox_prediction_fixed_point() {
        // Start three months before the March 2024 equinox
        let t = epoch_to_julian_centuries(EQUINOX_NOON_EPOCH - 90.0 * 86400.0);
        let next = future_equinox(t).expect("no equinox found within span");
        assert!(next > t);
        // Searching backwards from slightly after must land on the same
        // crossing
        let back = past_equinox(next + EQUINOX_STEP * 4.0).expect("no equinox behind");
        assert!((back - next).abs() < 1e-4);
        // And it is within two days of the known equinox time
        let days_off = (julian_centuries_to_epoch(next) - EQUINOX_NOON_EPOCH).abs() / 86400.0;
        assert!(days_off < 2.0, "equinox {} days off", days_off);
    }

    #[test]
    fn test_solstice_follows_equinox() {
        let t = epoch_to_julian_centuries(EQUINOX_NOON_EPOCH + 86400.0);
        let solstice = future_solstice(t).expect("no solstice found");
        let equinox = future_equinox(t).expect("no equinox found");
        // June solstice comes before the September equinox
        assert!(solstice < equinox);
        // About 93 days after the March equinox
        let days = (julian_centuries_to_epoch(solstice) - EQUINOX_NOON_EPOCH) / 86400.0;
        assert!((80.0..105.0).contains(&days), "solstice after {} days", days);
    }

    #[test]
    fn test_future_elevation_brackets_sunset() {
        let t = epoch_to_julian_centuries(EQUINOX_NOON_EPOCH);
        let sunset = future_elevation(0.0, 0.0, 0.0, t).expect("no sunset found");
        let hours = (julian_centuries_to_epoch(sunset) - EQUINOX_NOON_EPOCH) / 3600.0;
        assert!((4.0..8.0).contains(&hours), "sunset after {} hours", hours);
    }

    #[test]
    fn test_prediction_gives_up_outside_span() {
        // The Sun never reaches 80 degrees at this latitude; the search
        // must terminate with None rather than walk forever
        let t = epoch_to_julian_centuries(EQUINOX_NOON_EPOCH);
        assert!(future_elevation(60.0, 0.0, 80.0, t).is_none());
    }
}
