//! Tests for the file-backed whitepoint tables, using fixture LUTs in
//! a temporary data directory. The data directory is selected through
//! the environment, so these tests are serialised.

use std::io::Write;
use std::path::Path;

use serial_test::serial;
use tempfile::TempDir;

use blueshift::blackbody::{blackbody_lut, cmf_10deg, divide_by_maximum, load_lut, redshift};
use blueshift::colour::ciexyy_to_srgb;
use blueshift::constants::DATADIR_ENV;

/// Write a CMF-style fixture: rows of `x y` pairs for temperatures
/// 1000 K to 40000 K in 100 K steps, drifting from warm to cool
/// chromaticity.
fn write_cmf_fixture(dir: &Path, name: &str) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    let rows = (40000 - 1000) / 100 + 1;
    for i in 0..rows {
        let t = i as f64 / (rows - 1) as f64;
        let x = 0.65 - 0.40 * t;
        let y = 0.34 + 0.02 * t;
        writeln!(file, "{} {}", x, y).unwrap();
    }
}

/// Write a redshift-style fixture: rows of `r g b` for 1000 K to
/// 25100 K in 100 K steps.
fn write_redshift_fixture(dir: &Path, name: &str, max_kelvin: u32) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    let rows = (max_kelvin - 1000) / 100 + 1;
    for i in 0..rows {
        let t = i as f64 / (rows - 1) as f64;
        writeln!(file, "1.0 {} {}", 0.7 + 0.3 * t, 0.3 + 0.7 * t).unwrap();
    }
}

fn fixture_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_cmf_fixture(dir.path(), "2deg");
    write_cmf_fixture(dir.path(), "10deg");
    write_redshift_fixture(dir.path(), "redshift", 25100);
    write_redshift_fixture(dir.path(), "redshift_old", 10000);
    dir
}

#[test]
#[serial]
fn cmf_boundary_rows_and_clipping() {
    let dir = fixture_dir();
    std::env::set_var(DATADIR_ENV, dir.path());

    // The lowest supported temperature maps to the first row exactly
    let first_row = ciexyy_to_srgb(0.65, 0.34, 1.0);
    let at_minimum = cmf_10deg(1000.0).unwrap();
    assert_eq!(at_minimum, first_row);
    // Below-range temperatures clip to the same row
    assert_eq!(cmf_10deg(999.0).unwrap(), at_minimum);
    assert_eq!(cmf_10deg(0.0).unwrap(), at_minimum);
    // Above-range temperatures clip to the last row
    assert_eq!(cmf_10deg(40000.0).unwrap(), cmf_10deg(99999.0).unwrap());
}

#[test]
#[serial]
fn cmf_interpolates_between_rows() {
    let dir = fixture_dir();
    std::env::set_var(DATADIR_ENV, dir.path());

    let lut = blackbody_lut("10deg").unwrap();
    let (x0, y0) = (lut[0][0], lut[0][1]);
    let (x1, y1) = (lut[1][0], lut[1][1]);
    // Halfway between the 1000 K and 1100 K rows
    let expected = ciexyy_to_srgb((x0 + x1) / 2.0, (y0 + y1) / 2.0, 1.0);
    let actual = cmf_10deg(1050.0).unwrap();
    assert!((actual.0 - expected.0).abs() < 1e-9);
    assert!((actual.1 - expected.1).abs() < 1e-9);
    assert!((actual.2 - expected.2).abs() < 1e-9);
}

#[test]
#[serial]
fn cmf_blue_monotone_after_normalisation() {
    let dir = fixture_dir();
    std::env::set_var(DATADIR_ENV, dir.path());

    let mut last = f64::NEG_INFINITY;
    let mut t = 2000.0;
    while t <= 10000.0 {
        let (_, _, b) = divide_by_maximum(cmf_10deg(t).unwrap());
        assert!(b >= last - 1e-12, "blue decreased at {} K", t);
        last = b;
        t += 100.0;
    }
}

#[test]
#[serial]
fn redshift_tables_and_old_clip_range() {
    let dir = fixture_dir();
    std::env::set_var(DATADIR_ENV, dir.path());

    // Exact row
    let (r, g, b) = redshift(1000.0, false, false).unwrap();
    assert_eq!((r, g, b), (1.0, 0.7, 0.3));
    // The old table clips at 10000 K
    let at_limit = redshift(10000.0, true, false).unwrap();
    assert_eq!(redshift(20000.0, true, false).unwrap(), at_limit);
    // Interpolated values stay between the surrounding rows
    let (_, g, _) = redshift(1050.0, false, false).unwrap();
    let lut = blackbody_lut("redshift").unwrap();
    assert!(g > lut[0][1] && g < lut[1][1]);
    // Linear-RGB interpolation differs from sRGB interpolation in the
    // interior but agrees at the rows
    let srgb = redshift(1050.0, false, false).unwrap();
    let linear = redshift(1050.0, false, true).unwrap();
    assert!((srgb.1 - linear.1).abs() > 1e-9);
    assert_eq!(
        redshift(1100.0, false, false).unwrap(),
        redshift(1100.0, false, true).unwrap()
    );
}

#[test]
#[serial]
fn lut_loader_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken");
    std::fs::write(&path, "0.1 0.2\nnot-a-number 0.3\n").unwrap();
    assert!(load_lut(&path).is_err());
    assert!(load_lut(&dir.path().join("missing")).is_err());
    std::fs::write(&path, "").unwrap();
    assert!(load_lut(&path).is_err());
}
